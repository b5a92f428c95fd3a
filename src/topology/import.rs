//! Loading a topology from its JSON description.

use super::{Topology, TopologyError};
use crate::models::{Node, TrackSegment};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk shape of a section: its nodes and the segments between them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub nodes: Vec<Node>,
    pub segments: Vec<TrackSegment>,
}

impl TopologyConfig {
    /// Validate and build the graph
    ///
    /// # Errors
    ///
    /// Returns a `TopologyError` if the description is inconsistent
    pub fn build(self) -> Result<Topology, TopologyError> {
        if let Some(name) = &self.name {
            log::info!("Building topology for section {name}");
        }
        Topology::from_parts(self.nodes, self.segments)
    }
}

impl Topology {
    /// Parse and validate a topology from JSON
    ///
    /// # Errors
    ///
    /// Returns a `TopologyError` if the JSON is malformed or inconsistent
    pub fn from_json(json: &str) -> Result<Self, TopologyError> {
        let config: TopologyConfig =
            serde_json::from_str(json).map_err(|e| TopologyError::Parse(e.to_string()))?;
        config.build()
    }

    /// Load a topology from a JSON file
    ///
    /// # Errors
    ///
    /// Returns a `TopologyError` if the file cannot be read or is invalid
    pub fn from_file(path: &Path) -> Result<Self, TopologyError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| TopologyError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}
