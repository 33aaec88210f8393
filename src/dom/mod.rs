mod selector;
mod snapshot;

use std::collections::BTreeMap;

pub(crate) use selector::Selector;
pub(crate) use snapshot::{NodeSpec, load_snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Capture,
    Bubble,
}

/// What a listener installed by this crate does when its element is clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListenerAction {
    /// Resolve the owning item's path and hand it to the external player.
    PlayExternally,
    /// Launch an already-mapped local path.
    LaunchLocal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Listener {
    pub(crate) phase: Phase,
    pub(crate) action: ListenerAction,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum DomError {
    #[error("cannot insert {child} into {parent}: the new child is an ancestor of the parent")]
    HierarchyRequest { parent: String, child: String },
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<Listener>,
}

impl Node {
    fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

/// Arena-backed element tree standing in for the host page.
///
/// Nodes are never freed; a removed subtree is simply detached from the root.
/// Every insertion under the connected tree is recorded so an observer can
/// pick up the top-level added nodes, the way a subtree `childList` mutation
/// observer would.
#[derive(Debug, Clone)]
pub(crate) struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    added: Vec<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node::element("body")],
            root: NodeId(0),
            added: Vec::new(),
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Node::element(tag));
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_child(parent, child, false)
    }

    pub(crate) fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_child(parent, child, true)
    }

    fn insert_child(&mut self, parent: NodeId, child: NodeId, front: bool) -> Result<(), DomError> {
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest {
                parent: self.describe(parent),
                child: self.describe(child),
            });
        }

        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        if front {
            children.insert(0, child);
        } else {
            children.push(child);
        }
        self.nodes[child.0].parent = Some(parent);

        if self.is_connected(parent) {
            self.added.push(child);
        }
        Ok(())
    }

    pub(crate) fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.nodes[node.0].parent.take() else {
            return;
        };
        self.nodes[parent.0].children.retain(|child| *child != node);
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes[id.0].parent;
        }
        false
    }

    pub(crate) fn is_connected(&self, node: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root, node)
    }

    /// Whether `node` is `ancestor` or lies somewhere below it.
    pub(crate) fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.is_inclusive_ancestor(ancestor, node)
    }

    pub(crate) fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub(crate) fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub(crate) fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    pub(crate) fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0].attrs.get(name).map(String::as_str)
    }

    /// Attribute value, treating an empty string like a missing attribute.
    pub(crate) fn non_empty_attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attr(node, name).filter(|value| !value.is_empty())
    }

    pub(crate) fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.nodes[node.0].attrs.contains_key(name)
    }

    pub(crate) fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        self.nodes[node.0]
            .attrs
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub(crate) fn remove_attr(&mut self, node: NodeId, name: &str) {
        self.nodes[node.0].attrs.remove(name);
    }

    pub(crate) fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|name| name == class))
    }

    pub(crate) fn text(&self, node: NodeId) -> &str {
        &self.nodes[node.0].text
    }

    pub(crate) fn set_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0].text = text.to_string();
    }

    pub(crate) fn is_disabled(&self, node: NodeId) -> bool {
        self.has_attr(node, "disabled")
    }

    pub(crate) fn set_disabled(&mut self, node: NodeId, disabled: bool) {
        if disabled {
            self.set_attr(node, "disabled", "");
        } else {
            self.remove_attr(node, "disabled");
        }
    }

    pub(crate) fn listeners(&self, node: NodeId) -> &[Listener] {
        &self.nodes[node.0].listeners
    }

    pub(crate) fn add_listener(&mut self, node: NodeId, listener: Listener) {
        self.nodes[node.0].listeners.push(listener);
    }

    /// Pre-order walk of `node` and everything below it.
    pub(crate) fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub(crate) fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if selector.matches(self, id) {
                return Some(id);
            }
            current = self.nodes[id.0].parent;
        }
        None
    }

    /// Matching descendants of `root`, excluding `root` itself.
    #[cfg(test)]
    pub(crate) fn query_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .skip(1)
            .filter(|id| selector.matches(self, *id))
            .collect()
    }

    pub(crate) fn query(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .skip(1)
            .find(|id| selector.matches(self, *id))
    }

    /// Top-level nodes inserted into the connected tree since the last call.
    pub(crate) fn take_added(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.added)
    }

    /// Short CSS-like label for logs, e.g. `button#play.cardOverlayButton`.
    pub(crate) fn describe(&self, node: NodeId) -> String {
        let mut out = self.tag(node).to_string();
        if let Some(id) = self.non_empty_attr(node, "id") {
            out.push('#');
            out.push_str(id);
        }
        if let Some(classes) = self.attr(node, "class") {
            for class in classes.split_whitespace() {
                out.push('.');
                out.push_str(class);
            }
        }
        if let Some(item_id) = self.non_empty_attr(node, "data-id") {
            out.push_str(&format!("[data-id={item_id}]"));
        }
        out
    }
}
