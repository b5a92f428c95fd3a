use serde::{Deserialize, Serialize};

use super::node::NodeId;

pub type SegmentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Main,
    Siding,
    JunctionLink,
}

/// Geographic waypoint, carried through untouched for the map collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
}

fn default_tracks() -> u32 {
    1
}

/// A stretch of line between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub id: SegmentId,
    pub kind: SegmentKind,
    pub from: NodeId,
    pub to: NodeId,
    pub length_km: f64,
    /// Parallel tracks, i.e. how many trains the segment carries at once
    #[serde(default = "default_tracks")]
    pub tracks: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Waypoint>,
}

impl TrackSegment {
    #[must_use]
    pub fn new(id: &str, kind: SegmentKind, from: &str, to: &str, length_km: f64) -> Self {
        Self {
            id: id.to_string(),
            kind,
            from: from.to_string(),
            to: to.to_string(),
            length_km,
            tracks: 1,
            path: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tracks(mut self, tracks: u32) -> Self {
        self.tracks = tracks;
        self
    }

    #[must_use]
    pub fn is_main_line(&self) -> bool {
        self.kind == SegmentKind::Main
    }

    /// The endpoint opposite `node`, if `node` is an endpoint
    #[must_use]
    pub fn other_end(&self, node: &str) -> Option<&str> {
        if self.from == node {
            Some(&self.to)
        } else if self.to == node {
            Some(&self.from)
        } else {
            None
        }
    }

    #[must_use]
    pub fn connects(&self, node: &str) -> bool {
        self.from == node || self.to == node
    }
}
