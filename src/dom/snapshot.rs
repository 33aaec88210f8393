use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{Document, NodeId};

/// Serialized element as sent by the host: `{"tag", "attrs", "text", "children"}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub(crate) struct NodeSpec {
    pub(crate) tag: String,
    #[serde(default)]
    pub(crate) attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) children: Vec<NodeSpec>,
}

impl Document {
    /// Build `shape` as a detached subtree and return its top node.
    pub(crate) fn build(&mut self, shape: &NodeSpec) -> NodeId {
        let node = self.create_element(&shape.tag);
        for (name, value) in &shape.attrs {
            self.set_attr(node, name, value);
        }
        self.set_text(node, &shape.text);
        for child in &shape.children {
            let child = self.build(child);
            // A freshly created child can never be an ancestor of `node`.
            let _ = self.append_child(node, child);
        }
        node
    }

    /// Document whose body carries the attributes and children of `body`.
    pub(crate) fn from_snapshot(body: &NodeSpec) -> Self {
        let mut doc = Self::new();
        let root = doc.root();
        for (name, value) in &body.attrs {
            doc.set_attr(root, name, value);
        }
        doc.set_text(root, &body.text);
        for child in &body.children {
            let child = doc.build(child);
            let _ = doc.append_child(root, child);
        }
        // The initial page is covered by the first full scan, not by mutation records.
        doc.take_added();
        doc
    }
}

pub(crate) fn load_snapshot(path: &Path) -> Result<Document> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read page snapshot {}", path.display()))?;
    let body: NodeSpec = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse page snapshot {}", path.display()))?;
    Ok(Document::from_snapshot(&body))
}
