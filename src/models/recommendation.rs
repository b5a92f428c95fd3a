use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::NodeId;
use super::resource::ConflictKey;
use super::train::TrainId;
use crate::settings::SeverityBands;

pub type RecommendationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityClass {
    /// Map a conflict severity (0-100) onto a class using fixed bands
    #[must_use]
    pub fn from_severity(severity: f64, bands: &SeverityBands) -> Self {
        if severity >= bands.critical {
            PriorityClass::Critical
        } else if severity >= bands.high {
            PriorityClass::High
        } else if severity >= bands.medium {
            PriorityClass::Medium
        } else {
            PriorityClass::Low
        }
    }
}

/// What the controller is asked to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecommendationKind {
    Hold { at: NodeId, until: NaiveDateTime },
    Release { at: NodeId },
    PlatformAssignment { from: NodeId, to: NodeId },
    SpeedAdjustment { from_kmh: f64, to_kmh: f64 },
}

impl RecommendationKind {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            RecommendationKind::Hold { .. } => "hold",
            RecommendationKind::Release { .. } => "release",
            RecommendationKind::PlatformAssignment { .. } => "platform_assignment",
            RecommendationKind::SpeedAdjustment { .. } => "speed_adjustment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatedImpact {
    pub delay_reduction_minutes: f64,
    pub throughput_improvement_percent: f64,
}

/// A proposed remedy for one conflict. Never mutated once issued; whether it
/// was accepted or overridden lives in the action ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RecommendationId,
    pub train_id: TrainId,
    #[serde(flatten)]
    pub kind: RecommendationKind,
    pub description: String,
    pub rationale: String,
    pub priority: PriorityClass,
    pub estimated_impact: EstimatedImpact,
    pub created_at: NaiveDateTime,
    /// Conflict this remedies; releases have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictKey>,
    pub severity: f64,
}

impl Recommendation {
    /// Whether two recommendations ask for the same thing, ignoring ids and
    /// wording. A longer hold or a different target speed is a new remedy.
    #[must_use]
    pub fn same_remedy(&self, other: &Recommendation) -> bool {
        self.train_id == other.train_id && self.kind == other.kind && self.conflict == other.conflict
    }
}
