use serde::{Deserialize, Serialize};
use std::fmt;

use super::node::NodeId;
use super::track::SegmentId;
use super::train::TrainId;

/// Anything with finite capacity that trains contend for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Resource {
    Node(NodeId),
    Segment(SegmentId),
}

impl Resource {
    #[must_use]
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Resource::Node(id) => Some(id),
            Resource::Segment(_) => None,
        }
    }

    #[must_use]
    pub fn segment_id(&self) -> Option<&str> {
        match self {
            Resource::Node(_) => None,
            Resource::Segment(id) => Some(id),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Node(id) => write!(f, "node {id}"),
            Resource::Segment(id) => write!(f, "segment {id}"),
        }
    }
}

/// Identity of a conflict across detector runs: where, and between whom
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictKey {
    pub resource: Resource,
    /// Sorted lexicographically
    pub trains: Vec<TrainId>,
}

impl ConflictKey {
    #[must_use]
    pub fn new(resource: Resource, mut trains: Vec<TrainId>) -> Self {
        trains.sort();
        trains.dedup();
        Self { resource, trains }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_key_normalizes_train_order() {
        let a = ConflictKey::new(
            Resource::Node("j".to_string()),
            vec!["B".to_string(), "A".to_string()],
        );
        let b = ConflictKey::new(
            Resource::Node("j".to_string()),
            vec!["A".to_string(), "B".to_string(), "A".to_string()],
        );
        assert_eq!(a, b);
        assert_eq!(a.trains, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_resource_display() {
        assert_eq!(Resource::Node("j1".to_string()).to_string(), "node j1");
        assert_eq!(Resource::Segment("m1".to_string()).to_string(), "segment m1");
    }

    #[test]
    fn test_nodes_order_before_segments() {
        assert!(Resource::Node("z".to_string()) < Resource::Segment("a".to_string()));
    }
}
