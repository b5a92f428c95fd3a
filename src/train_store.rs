//! Live train state, fed by telemetry and read through immutable snapshots.

use crate::constants::{MAX_PRIORITY, MAX_SPEED_KMH, MIN_MOVING_SPEED_KMH, MIN_PRIORITY, THROUGHPUT_WINDOW_MINUTES};
use crate::models::{Train, TrainId, TrainKind, TrainPosition};
use crate::topology::{Routes, Topology};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    #[error("train id must not be empty")]
    EmptyId,
    #[error("train `{train}` has priority {priority}, expected {MIN_PRIORITY}-{MAX_PRIORITY}")]
    PriorityOutOfRange { train: TrainId, priority: u8 },
    #[error("train `{train}` reports invalid speed {speed_kmh} km/h, expected 0 or {MIN_MOVING_SPEED_KMH}-{MAX_SPEED_KMH}")]
    InvalidSpeed { train: TrainId, speed_kmh: f64 },
    #[error("train `{train}` reports a non-finite delay")]
    InvalidDelay { train: TrainId },
    #[error("train `{train}` references unknown node `{node}`")]
    UnknownNode { train: TrainId, node: String },
    #[error("train `{train}` references unknown segment `{segment}`")]
    UnknownSegment { train: TrainId, segment: String },
    #[error("train `{train}` heads toward `{toward}` which is not an end of segment `{segment}`")]
    WrongDirection {
        train: TrainId,
        segment: String,
        toward: String,
    },
    #[error("train `{train}` has {remaining_km} km left on a {length_km} km segment")]
    RemainingOutOfRange {
        train: TrainId,
        remaining_km: f64,
        length_km: f64,
    },
    #[error("train `{train}` cannot reach destination `{destination}`")]
    Unreachable { train: TrainId, destination: String },
}

/// A train that reached its destination, kept for throughput
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub train_id: TrainId,
    pub kind: TrainKind,
    pub arrived_at: NaiveDateTime,
    pub delay_minutes: f64,
}

/// Immutable view of the store at one instant.
///
/// Cloning is cheap: trains and completions are shared until a fork mutates
/// them, at which point only the fork pays for a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSnapshot {
    as_of: NaiveDateTime,
    trains: Arc<BTreeMap<TrainId, Train>>,
    completions: Arc<Vec<Completion>>,
}

impl TrainSnapshot {
    #[must_use]
    pub fn new(as_of: NaiveDateTime, trains: Vec<Train>) -> Self {
        Self {
            as_of,
            trains: Arc::new(trains.into_iter().map(|t| (t.id.clone(), t)).collect()),
            completions: Arc::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Train> {
        self.trains.get(id)
    }

    /// Trains ordered by id
    pub fn trains(&self) -> impl Iterator<Item = &Train> {
        self.trains.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    #[must_use]
    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    pub(crate) fn set_as_of(&mut self, as_of: NaiveDateTime) {
        self.as_of = as_of;
    }

    pub(crate) fn trains_mut(&mut self) -> &mut BTreeMap<TrainId, Train> {
        Arc::make_mut(&mut self.trains)
    }

    pub(crate) fn completions_mut(&mut self) -> &mut Vec<Completion> {
        Arc::make_mut(&mut self.completions)
    }
}

#[derive(Debug)]
struct StoreState {
    as_of: NaiveDateTime,
    trains: Arc<BTreeMap<TrainId, Train>>,
    completions: Arc<Vec<Completion>>,
}

/// The single authoritative train list
#[derive(Debug)]
pub struct TrainStore {
    topology: Arc<Topology>,
    state: RwLock<StoreState>,
}

impl TrainStore {
    #[must_use]
    pub fn new(topology: Arc<Topology>, as_of: NaiveDateTime) -> Self {
        Self {
            topology,
            state: RwLock::new(StoreState {
                as_of,
                trains: Arc::new(BTreeMap::new()),
                completions: Arc::new(Vec::new()),
            }),
        }
    }

    /// Insert or replace a train after validating it against the topology
    ///
    /// # Errors
    ///
    /// Returns a `TelemetryError` describing the first malformed field
    pub fn upsert(&self, train: Train) -> Result<(), TelemetryError> {
        if let Err(e) = validate(&train, &self.topology) {
            log::warn!("Rejected telemetry: {e}");
            return Err(e);
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut state.trains).insert(train.id.clone(), train);
        Ok(())
    }

    /// Drop a train that left the section without arriving
    pub fn remove(&self, id: &str) -> Option<Train> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let removed = Arc::make_mut(&mut state.trains).remove(id);
        if removed.is_some() {
            log::debug!("Train {id} left the section");
        }
        removed
    }

    /// Record an arrival: the train is removed and counted towards throughput
    pub fn complete(&self, id: &str, at: NaiveDateTime) -> Option<Completion> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let train = Arc::make_mut(&mut state.trains).remove(id)?;
        let completion = Completion {
            train_id: train.id,
            kind: train.kind,
            arrived_at: at,
            delay_minutes: train.delay_minutes,
        };
        Arc::make_mut(&mut state.completions).push(completion.clone());
        log::debug!("Train {id} arrived at {at}");
        Some(completion)
    }

    /// Move the store clock forward; earlier times are ignored
    pub fn advance_clock(&self, now: NaiveDateTime) -> NaiveDateTime {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if now < state.as_of {
            log::debug!("Ignoring clock step back from {} to {now}", state.as_of);
            return state.as_of;
        }
        state.as_of = now;

        let cutoff = now - Duration::minutes(THROUGHPUT_WINDOW_MINUTES);
        if state.completions.iter().any(|c| c.arrived_at < cutoff) {
            Arc::make_mut(&mut state.completions).retain(|c| c.arrived_at >= cutoff);
        }
        now
    }

    /// Run `update` on the live trains under the write lock. Outstanding
    /// snapshots keep the previous list.
    pub(crate) fn update<R>(&self, update: impl FnOnce(NaiveDateTime, &mut BTreeMap<TrainId, Train>) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let as_of = state.as_of;
        update(as_of, Arc::make_mut(&mut state.trains))
    }

    #[must_use]
    pub fn snapshot(&self) -> TrainSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        TrainSnapshot {
            as_of: state.as_of,
            trains: Arc::clone(&state.trains),
            completions: Arc::clone(&state.completions),
        }
    }

    #[must_use]
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }
}

fn validate(train: &Train, topology: &Topology) -> Result<(), TelemetryError> {
    if train.id.trim().is_empty() {
        return Err(TelemetryError::EmptyId);
    }
    let id = || train.id.clone();

    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&train.priority) {
        return Err(TelemetryError::PriorityOutOfRange {
            train: id(),
            priority: train.priority,
        });
    }
    // Stopped, or moving within the range projections can time
    let speed = train.speed_kmh;
    if !(speed == 0.0 || (MIN_MOVING_SPEED_KMH..=MAX_SPEED_KMH).contains(&speed)) {
        return Err(TelemetryError::InvalidSpeed {
            train: id(),
            speed_kmh: train.speed_kmh,
        });
    }
    if !train.delay_minutes.is_finite() {
        return Err(TelemetryError::InvalidDelay { train: id() });
    }

    let known_node = |node: &str| {
        if topology.node(node).is_some() {
            Ok(())
        } else {
            Err(TelemetryError::UnknownNode {
                train: id(),
                node: node.to_string(),
            })
        }
    };

    let start = match &train.position {
        TrainPosition::Node { node } => {
            known_node(node)?;
            node.as_str()
        }
        TrainPosition::Segment {
            segment,
            toward,
            remaining_km,
        } => {
            let Some(track) = topology.segment(segment) else {
                return Err(TelemetryError::UnknownSegment {
                    train: id(),
                    segment: segment.clone(),
                });
            };
            if !track.connects(toward) {
                return Err(TelemetryError::WrongDirection {
                    train: id(),
                    segment: segment.clone(),
                    toward: toward.clone(),
                });
            }
            if !(remaining_km.is_finite() && *remaining_km >= 0.0 && *remaining_km <= track.length_km) {
                return Err(TelemetryError::RemainingOutOfRange {
                    train: id(),
                    remaining_km: *remaining_km,
                    length_km: track.length_km,
                });
            }
            toward.as_str()
        }
    };

    known_node(&train.destination)?;
    if topology.route(start, &train.destination).is_none() {
        return Err(TelemetryError::Unreachable {
            train: id(),
            destination: train.destination.clone(),
        });
    }
    if let Some(hold) = &train.hold {
        known_node(&hold.at)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, at};

    fn store() -> TrainStore {
        TrainStore::new(Arc::new(testing::junction_topology()), at(8, 0))
    }

    #[test]
    fn test_upsert_replaces() {
        let store = store();
        store.upsert(testing::train_at("A", 9, "north", "east")).expect("valid train");
        let mut moved = testing::train_at("A", 9, "junction", "east");
        moved.delay_minutes = 2.0;
        store.upsert(moved.clone()).expect("valid train");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("A"), Some(&moved));
    }

    #[test]
    fn test_snapshot_isolated_from_later_upserts() {
        let store = store();
        store.upsert(testing::train_at("A", 9, "north", "east")).expect("valid train");
        let before = store.snapshot();

        store.upsert(testing::train_at("B", 4, "south", "west")).expect("valid train");
        store.remove("A");

        assert_eq!(before.len(), 1);
        assert!(before.get("A").is_some());
        let after = store.snapshot();
        assert_eq!(after.trains().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn test_forked_snapshot_does_not_touch_store() {
        let store = store();
        store.upsert(testing::train_at("A", 9, "north", "east")).expect("valid train");
        let mut fork = store.snapshot();
        fork.trains_mut().clear();
        assert!(fork.is_empty());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_rejects_implausible_speed() {
        let store = store();
        let mut crawling = testing::train_on("S", 5, "junction-east", "east", 5.0, "east");
        for speed in [1e-12, 0.5, 900.0, f64::NAN, f64::INFINITY] {
            crawling.speed_kmh = speed;
            assert!(matches!(
                store.upsert(crawling.clone()),
                Err(TelemetryError::InvalidSpeed { .. })
            ));
        }
        assert!(store.snapshot().is_empty());

        crawling.speed_kmh = 0.0;
        store.upsert(crawling.clone()).expect("stopped train");
        crawling.speed_kmh = 1.0;
        store.upsert(crawling).expect("slow train");
    }

    #[test]
    fn test_rejects_malformed_telemetry() {
        let store = store();

        let mut train = testing::train_at("A", 11, "north", "east");
        assert!(matches!(
            store.upsert(train.clone()),
            Err(TelemetryError::PriorityOutOfRange { priority: 11, .. })
        ));

        train.priority = 5;
        train.speed_kmh = -3.0;
        assert!(matches!(store.upsert(train.clone()), Err(TelemetryError::InvalidSpeed { .. })));

        train.speed_kmh = 40.0;
        train.destination = "atlantis".to_string();
        assert!(matches!(store.upsert(train), Err(TelemetryError::UnknownNode { .. })));

        let wrong_way = testing::train_on("B", 4, "south-junction", "east", 2.0, "west");
        assert!(matches!(store.upsert(wrong_way), Err(TelemetryError::WrongDirection { .. })));

        let too_far = testing::train_on("B", 4, "south-junction", "junction", 9.0, "west");
        assert!(matches!(
            store.upsert(too_far),
            Err(TelemetryError::RemainingOutOfRange { .. })
        ));

        let blank = testing::train_at("  ", 4, "south", "west");
        assert_eq!(store.upsert(blank), Err(TelemetryError::EmptyId));

        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_complete_records_throughput() {
        let store = store();
        let mut train = testing::train_at("A", 9, "east", "east");
        train.delay_minutes = 4.0;
        store.upsert(train).expect("valid train");

        let completion = store.complete("A", at(8, 5)).expect("train exists");
        assert_eq!(completion.delay_minutes, 4.0);
        assert!(store.complete("A", at(8, 6)).is_none());

        let snapshot = store.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.completions().len(), 1);
    }

    #[test]
    fn test_advance_clock_prunes_old_completions() {
        let store = store();
        store.upsert(testing::train_at("A", 9, "east", "east")).expect("valid train");
        store.complete("A", at(8, 0));

        assert_eq!(store.advance_clock(at(8, 59)), at(8, 59));
        assert_eq!(store.snapshot().completions().len(), 1);

        store.advance_clock(at(9, 1));
        assert!(store.snapshot().completions().is_empty());

        // Clock never runs backwards
        assert_eq!(store.advance_clock(at(8, 30)), at(9, 1));
        assert_eq!(store.snapshot().as_of(), at(9, 1));
    }
}
