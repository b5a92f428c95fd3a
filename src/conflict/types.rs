//! Core types for conflict detection.

use crate::constants::{MAX_PRIORITY, MIN_PRIORITY, SEVERITY_PRIORITY_WEIGHT, SEVERITY_URGENCY_WEIGHT};
use crate::models::{ConflictKey, Resource, TrainId};
use crate::time::{duration_minutes, minutes_between, round1};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One train's part in a conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictMember {
    pub train_id: TrainId,
    pub priority: u8,
    /// Projected occupancy of the contested resource
    pub enter: NaiveDateTime,
    pub exit: NaiveDateTime,
}

/// A resource projected to hold more trains than it has room for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub resource: Resource,
    /// Every train active during the overload, sorted by train id
    pub members: Vec<ConflictMember>,
    pub capacity: u32,
    pub peak: u32,
    pub window_start: NaiveDateTime,
    pub window_end: NaiveDateTime,
    pub priority_delta: u8,
    /// 0-100
    pub severity: f64,
}

impl Conflict {
    #[must_use]
    pub fn key(&self) -> ConflictKey {
        ConflictKey::new(
            self.resource.clone(),
            self.members.iter().map(|m| m.train_id.clone()).collect(),
        )
    }

    pub fn train_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.train_id.as_str())
    }

    /// Length of the overload window in minutes
    #[must_use]
    pub fn overlap_minutes(&self) -> f64 {
        minutes_between(self.window_start, self.window_end)
    }
}

/// Severity from the priority spread and how soon the overload begins.
///
/// Both terms are normalised to 0..1: the delta against the widest possible
/// spread, urgency as the share of the horizon still ahead of the overload.
#[must_use]
pub fn severity(priority_delta: u8, window_start: NaiveDateTime, as_of: NaiveDateTime, horizon: Duration) -> f64 {
    let spread = f64::from(MAX_PRIORITY - MIN_PRIORITY);
    let priority_term = f64::from(priority_delta) / spread;

    let horizon_minutes = duration_minutes(horizon);
    let urgency = if horizon_minutes > 0.0 {
        1.0 - (minutes_between(as_of, window_start) / horizon_minutes).clamp(0.0, 1.0)
    } else {
        1.0
    };

    round1(100.0 * (SEVERITY_PRIORITY_WEIGHT * priority_term + SEVERITY_URGENCY_WEIGHT * urgency))
}
