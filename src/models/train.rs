use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::track::SegmentId;

pub type TrainId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainKind {
    Express,
    Freight,
    Local,
}

impl TrainKind {
    /// Speed assumed when a stopped train resumes
    #[must_use]
    pub fn nominal_speed_kmh(self) -> f64 {
        match self {
            TrainKind::Express => 120.0,
            TrainKind::Local => 80.0,
            TrainKind::Freight => 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainStatus {
    OnTime,
    Delayed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "at", rename_all = "snake_case")]
pub enum TrainPosition {
    /// Standing in or passing through a node
    Node { node: NodeId },
    /// Running on a segment toward one of its endpoints
    Segment {
        segment: SegmentId,
        toward: NodeId,
        remaining_km: f64,
    },
}

/// The train may not depart `at` before `until`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldOrder {
    pub at: NodeId,
    pub until: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    pub id: TrainId,
    pub kind: TrainKind,
    pub position: TrainPosition,
    pub destination: NodeId,
    pub eta: NaiveDateTime,
    /// Minutes behind schedule; negative when early
    pub delay_minutes: f64,
    pub speed_kmh: f64,
    /// 1-10, higher preempts lower
    pub priority: u8,
    pub status: TrainStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold: Option<HoldOrder>,
}

impl Train {
    /// Speed used for projections: the reported speed, or the nominal speed of
    /// the train kind when the train is standing
    #[must_use]
    pub fn effective_speed_kmh(&self) -> f64 {
        if self.speed_kmh > 0.0 {
            self.speed_kmh
        } else {
            self.kind.nominal_speed_kmh()
        }
    }

    /// Node the train is standing at, if any
    #[must_use]
    pub fn current_node(&self) -> Option<&str> {
        match &self.position {
            TrainPosition::Node { node } => Some(node),
            TrainPosition::Segment { .. } => None,
        }
    }

    /// Hold order that still restricts departure at `as_of`
    #[must_use]
    pub fn active_hold(&self, as_of: NaiveDateTime) -> Option<&HoldOrder> {
        self.hold.as_ref().filter(|hold| hold.until > as_of)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.status == TrainStatus::Stopped
    }

    /// Status implied by the current delay and hold, used after the core changes a train
    #[must_use]
    pub fn derived_status(&self, as_of: NaiveDateTime, on_time_threshold_minutes: f64) -> TrainStatus {
        let held_here = self
            .active_hold(as_of)
            .is_some_and(|hold| self.current_node() == Some(hold.at.as_str()));
        if held_here {
            TrainStatus::Stopped
        } else if self.delay_minutes > on_time_threshold_minutes {
            TrainStatus::Delayed
        } else {
            TrainStatus::OnTime
        }
    }
}
