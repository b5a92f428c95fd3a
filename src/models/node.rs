use serde::{Deserialize, Serialize};

pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Station,
    Junction,
    Platform,
}

/// A station, junction or platform in the section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Maximum number of trains the node can hold at once
    pub capacity: u32,
    /// Station a platform belongs to. Sibling platforms are alternate assignments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(f64, f64)>,
}

impl Node {
    #[must_use]
    pub fn new(id: &str, name: &str, kind: NodeKind, capacity: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            capacity,
            parent: None,
            position: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Trains can be held at stations and platforms, never inside a junction
    #[must_use]
    pub fn is_hold_point(&self) -> bool {
        matches!(self.kind, NodeKind::Station | NodeKind::Platform)
    }

    #[must_use]
    pub fn is_platform(&self) -> bool {
        self.kind == NodeKind::Platform
    }
}
