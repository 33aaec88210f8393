use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, error};

use crate::dom::{Document, NodeId, Selector};

/// An element the scanner wants handed to the hijacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Trigger(NodeId),
    DetailContainer(NodeId),
}

pub(crate) struct Scanner {
    card_trigger: Selector,
    list_trigger: Selector,
    detail_buttons: Selector,
    scanning: Rc<Cell<bool>>,
}

/// Clears the scanning flag when the pass ends, including by unwinding.
pub(crate) struct ScanGuard {
    flag: Rc<Cell<bool>>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

fn resume_button(class: &str) -> Selector {
    Selector::compound()
        .tag("button")
        .attr_eq("is", "paper-icon-button-light")
        .class(class)
        .attr_eq("data-action", "resume")
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub(crate) fn new() -> Self {
        Self {
            card_trigger: resume_button("cardOverlayButton"),
            list_trigger: resume_button("listItemImageButton"),
            detail_buttons: Selector::compound()
                .tag("div")
                .class("mainDetailButtons")
                .class("focuscontainer-x"),
            scanning: Rc::new(Cell::new(false)),
        }
    }

    /// Targets in `root` and below: card triggers, then list triggers, then
    /// detail button bars.
    pub(crate) fn targets_in(&self, doc: &Document, root: NodeId) -> Vec<Target> {
        let nodes = doc.descendants(root);
        let matching = |selector: &Selector| {
            nodes
                .iter()
                .copied()
                .filter(|node| selector.matches(doc, *node))
                .collect::<Vec<_>>()
        };

        let mut targets = Vec::new();
        targets.extend(matching(&self.card_trigger).into_iter().map(Target::Trigger));
        targets.extend(matching(&self.list_trigger).into_iter().map(Target::Trigger));
        targets.extend(
            matching(&self.detail_buttons)
                .into_iter()
                .map(Target::DetailContainer),
        );
        targets
    }

    #[cfg(test)]
    pub(crate) fn is_scanning(&self) -> bool {
        self.scanning.get()
    }

    /// Claim the scanning flag, or `None` if a pass is already running.
    pub(crate) fn begin(&self) -> Option<ScanGuard> {
        if self.scanning.replace(true) {
            return None;
        }
        Some(ScanGuard {
            flag: Rc::clone(&self.scanning),
        })
    }

    /// Visit each root under the scanning flag. A pass requested while
    /// another one runs is dropped, not queued, and `false` is returned.
    /// A root whose visit fails is logged and the remaining roots still run.
    pub(crate) fn run_pass<F>(&self, roots: &[NodeId], mut visit: F) -> bool
    where
        F: FnMut(NodeId) -> Result<()>,
    {
        let Some(_guard) = self.begin() else {
            debug!(roots = roots.len(), "scan already in progress; dropping pass");
            return false;
        };

        for &root in roots {
            if let Err(err) = visit(root) {
                error!(?root, "failed to process scanned node: {err:#}");
            }
        }
        true
    }
}
