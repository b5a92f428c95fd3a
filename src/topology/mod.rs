//! Static track topology: nodes with capacity and the segments linking them.

mod import;
mod occupancy;
mod routes;

pub use import::TopologyConfig;
pub use occupancy::{Occupancy, ResourceGroup, SharedResources};
pub use routes::{Route, Routes};

use crate::constants::MAX_SEGMENT_LENGTH_KM;
use crate::models::{Node, NodeId, NodeKind, Resource, TrackSegment};
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("duplicate node id `{0}`")]
    DuplicateNode(NodeId),
    #[error("duplicate segment id `{0}`")]
    DuplicateSegment(String),
    #[error("segment `{segment}` references unknown node `{node}`")]
    UnknownNode { segment: String, node: NodeId },
    #[error("segment `{0}` starts and ends at the same node")]
    SelfLoop(String),
    #[error("node `{0}` must have a capacity of at least one train")]
    ZeroCapacity(NodeId),
    #[error("segment `{0}` must have at least one track")]
    NoTracks(String),
    #[error("segment `{segment}` has invalid length {length_km} km")]
    InvalidLength { segment: String, length_km: f64 },
    #[error("node `{node}` has parent `{parent}` which is not a known station")]
    InvalidParent { node: NodeId, parent: NodeId },
    #[error("failed to read topology: {0}")]
    Io(String),
    #[error("failed to parse topology: {0}")]
    Parse(String),
}

/// Read-only track graph. Built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Topology {
    pub(crate) graph: UnGraph<Node, TrackSegment>,
    node_index: HashMap<NodeId, NodeIndex>,
    segment_index: HashMap<String, EdgeIndex>,
}

impl Topology {
    /// Build and validate a topology
    ///
    /// # Errors
    ///
    /// Returns a `TopologyError` if ids collide, a segment references an
    /// unknown node, or a capacity/length is invalid
    pub fn from_parts(nodes: Vec<Node>, segments: Vec<TrackSegment>) -> Result<Self, TopologyError> {
        let mut graph = UnGraph::default();
        let mut node_index = HashMap::new();
        let mut segment_index = HashMap::new();

        for node in &nodes {
            if node.capacity == 0 {
                return Err(TopologyError::ZeroCapacity(node.id.clone()));
            }
        }
        for node in nodes {
            if node_index.contains_key(&node.id) {
                return Err(TopologyError::DuplicateNode(node.id));
            }
            let id = node.id.clone();
            let idx = graph.add_node(node);
            node_index.insert(id, idx);
        }

        // Platforms may only hang off stations
        for idx in graph.node_indices() {
            let node = &graph[idx];
            let Some(parent) = &node.parent else {
                continue;
            };
            let parent_is_station = node_index
                .get(parent)
                .is_some_and(|&p| graph[p].kind == NodeKind::Station);
            if !parent_is_station {
                return Err(TopologyError::InvalidParent {
                    node: node.id.clone(),
                    parent: parent.clone(),
                });
            }
        }

        for segment in segments {
            if segment_index.contains_key(&segment.id) {
                return Err(TopologyError::DuplicateSegment(segment.id));
            }
            if segment.tracks == 0 {
                return Err(TopologyError::NoTracks(segment.id));
            }
            if !(segment.length_km > 0.0 && segment.length_km <= MAX_SEGMENT_LENGTH_KM) {
                return Err(TopologyError::InvalidLength {
                    segment: segment.id,
                    length_km: segment.length_km,
                });
            }
            if segment.from == segment.to {
                return Err(TopologyError::SelfLoop(segment.id));
            }
            let Some(&from) = node_index.get(&segment.from) else {
                return Err(TopologyError::UnknownNode {
                    node: segment.from.clone(),
                    segment: segment.id,
                });
            };
            let Some(&to) = node_index.get(&segment.to) else {
                return Err(TopologyError::UnknownNode {
                    node: segment.to.clone(),
                    segment: segment.id,
                });
            };
            let id = segment.id.clone();
            let edge = graph.add_edge(from, to, segment);
            segment_index.insert(id, edge);
        }

        log::debug!(
            "Loaded topology with {} nodes and {} segments",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            node_index,
            segment_index,
        })
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&idx| &self.graph[idx])
    }

    #[must_use]
    pub fn segment(&self, id: &str) -> Option<&TrackSegment> {
        self.segment_index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    pub fn segments(&self) -> impl Iterator<Item = &TrackSegment> {
        self.graph.edge_weights()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// How many trains a node or segment holds at once
    #[must_use]
    pub fn capacity(&self, resource: &Resource) -> Option<u32> {
        match resource {
            Resource::Node(id) => self.node(id).map(|node| node.capacity),
            Resource::Segment(id) => self.segment(id).map(|segment| segment.tracks),
        }
    }

    /// Human-readable name for recommendation text
    #[must_use]
    pub fn display_name(&self, resource: &Resource) -> String {
        match resource {
            Resource::Node(id) => self.node(id).map_or_else(|| id.clone(), |node| node.name.clone()),
            Resource::Segment(id) => self.segment(id).map_or_else(
                || id.clone(),
                |segment| format!("{} - {}", self.node_name(&segment.from), self.node_name(&segment.to)),
            ),
        }
    }

    #[must_use]
    pub fn node_name(&self, id: &str) -> String {
        self.node(id).map_or_else(|| id.to_string(), |node| node.name.clone())
    }

    /// Sibling platforms of `platform` (same parent station), sorted by id
    #[must_use]
    pub fn alternate_platforms(&self, platform: &str) -> Vec<&Node> {
        let Some(node) = self.node(platform) else {
            return Vec::new();
        };
        let Some(parent) = node.parent.as_deref() else {
            return Vec::new();
        };
        let mut alternates: Vec<&Node> = self
            .nodes()
            .filter(|n| n.is_platform() && n.id != platform && n.parent.as_deref() == Some(parent))
            .collect();
        alternates.sort_by(|a, b| a.id.cmp(&b.id));
        alternates
    }

    pub(crate) fn node_idx(&self, id: &str) -> Option<NodeIndex> {
        self.node_index.get(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SegmentKind;
    use crate::testing;

    #[test]
    fn test_unknown_endpoint_is_rejected() {
        let nodes = vec![Node::new("a", "A", NodeKind::Station, 1)];
        let segments = vec![TrackSegment::new("ab", SegmentKind::Main, "a", "b", 1.0)];
        let result = Topology::from_parts(nodes, segments);
        assert_eq!(
            result.err(),
            Some(TopologyError::UnknownNode {
                segment: "ab".to_string(),
                node: "b".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_node_is_rejected() {
        let nodes = vec![
            Node::new("a", "A", NodeKind::Station, 1),
            Node::new("a", "A again", NodeKind::Junction, 1),
        ];
        let result = Topology::from_parts(nodes, Vec::new());
        assert_eq!(result.err(), Some(TopologyError::DuplicateNode("a".to_string())));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let nodes = vec![Node::new("j", "J", NodeKind::Junction, 0)];
        let result = Topology::from_parts(nodes, Vec::new());
        assert_eq!(result.err(), Some(TopologyError::ZeroCapacity("j".to_string())));
    }

    #[test]
    fn test_invalid_length_and_tracks_are_rejected() {
        let nodes = vec![
            Node::new("a", "A", NodeKind::Station, 1),
            Node::new("b", "B", NodeKind::Station, 1),
        ];
        for length_km in [0.0, 1e12, f64::NAN] {
            let segments = vec![TrackSegment::new("ab", SegmentKind::Main, "a", "b", length_km)];
            assert!(matches!(
                Topology::from_parts(nodes.clone(), segments),
                Err(TopologyError::InvalidLength { .. })
            ));
        }

        let no_tracks = vec![TrackSegment::new("ab", SegmentKind::Main, "a", "b", 1.0).with_tracks(0)];
        assert_eq!(
            Topology::from_parts(nodes.clone(), no_tracks).err(),
            Some(TopologyError::NoTracks("ab".to_string()))
        );

        let self_loop = vec![TrackSegment::new("aa", SegmentKind::Siding, "a", "a", 1.0)];
        assert_eq!(
            Topology::from_parts(nodes, self_loop).err(),
            Some(TopologyError::SelfLoop("aa".to_string()))
        );
    }

    #[test]
    fn test_platform_parent_must_be_station() {
        let nodes = vec![
            Node::new("j", "J", NodeKind::Junction, 1),
            Node::new("p1", "P1", NodeKind::Platform, 1).with_parent("j"),
        ];
        assert!(matches!(
            Topology::from_parts(nodes, Vec::new()),
            Err(TopologyError::InvalidParent { .. })
        ));
    }

    #[test]
    fn test_capacity_lookup() {
        let topology = testing::junction_topology();
        assert_eq!(topology.capacity(&Resource::Node("junction".to_string())), Some(1));
        assert_eq!(topology.capacity(&Resource::Segment("north-junction".to_string())), Some(1));
        assert_eq!(topology.capacity(&Resource::Node("nowhere".to_string())), None);
    }

    #[test]
    fn test_alternate_platforms() {
        let topology = testing::platform_topology();
        let alternates: Vec<&str> = topology
            .alternate_platforms("p1")
            .iter()
            .map(|node| node.id.as_str())
            .collect();
        assert_eq!(alternates, vec!["p2"]);
        assert!(topology.alternate_platforms("throat").is_empty());
    }

    #[test]
    fn test_display_name() {
        let topology = testing::junction_topology();
        assert_eq!(topology.display_name(&Resource::Node("junction".to_string())), "North Junction");
        assert_eq!(
            topology.display_name(&Resource::Segment("north-junction".to_string())),
            "North Station - North Junction"
        );
    }
}
