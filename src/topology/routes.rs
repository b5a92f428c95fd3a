use super::Topology;
use crate::models::{Node, NodeId, SegmentId, TrackSegment};

/// Path through the topology: `segments[i]` links `nodes[i]` and `nodes[i + 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub nodes: Vec<NodeId>,
    pub segments: Vec<SegmentId>,
    pub length_km: f64,
}

/// Extension trait for neighbor and path lookups on `Topology`
pub trait Routes {
    /// Adjacent nodes with the segment reaching each, sorted by node then segment id
    fn neighbors(&self, node: &str) -> Vec<(&Node, &TrackSegment)>;

    /// Shortest route by length between two nodes
    fn route(&self, from: &str, to: &str) -> Option<Route>;

    /// Shortest segment directly linking two nodes
    fn segment_between(&self, a: &str, b: &str) -> Option<&TrackSegment>;
}

impl Routes for Topology {
    fn neighbors(&self, node: &str) -> Vec<(&Node, &TrackSegment)> {
        let Some(idx) = self.node_idx(node) else {
            return Vec::new();
        };
        let mut neighbors: Vec<(&Node, &TrackSegment)> = self
            .graph
            .edges(idx)
            .filter_map(|edge| {
                let segment = edge.weight();
                let other = segment.other_end(node)?;
                self.node(other).map(|n| (n, segment))
            })
            .collect();
        neighbors.sort_by(|(a, sa), (b, sb)| a.id.cmp(&b.id).then_with(|| sa.id.cmp(&sb.id)));
        neighbors
    }

    fn route(&self, from: &str, to: &str) -> Option<Route> {
        let start = self.node_idx(from)?;
        let goal = self.node_idx(to)?;

        if start == goal {
            return Some(Route {
                nodes: vec![from.to_string()],
                segments: Vec::new(),
                length_km: 0.0,
            });
        }

        let (length_km, path) = petgraph::algo::astar(
            &self.graph,
            start,
            |idx| idx == goal,
            |edge| edge.weight().length_km,
            |_| 0.0,
        )?;

        let nodes: Vec<NodeId> = path.iter().map(|&idx| self.graph[idx].id.clone()).collect();
        let mut segments = Vec::with_capacity(nodes.len().saturating_sub(1));
        for pair in nodes.windows(2) {
            let segment = self.segment_between(&pair[0], &pair[1])?;
            segments.push(segment.id.clone());
        }

        Some(Route {
            nodes,
            segments,
            length_km,
        })
    }

    fn segment_between(&self, a: &str, b: &str) -> Option<&TrackSegment> {
        let idx = self.node_idx(a)?;
        self.graph
            .edges(idx)
            .map(|edge| edge.weight())
            .filter(|segment| segment.other_end(a) == Some(b))
            .min_by(|x, y| {
                x.length_km
                    .total_cmp(&y.length_km)
                    .then_with(|| x.id.cmp(&y.id))
            })
    }
}
