//! Carrying out recommendations on a forked snapshot.

use crate::conflict::project;
use crate::models::{HoldOrder, Recommendation, RecommendationKind, Train};
use crate::settings::DispatchSettings;
use crate::time::minutes_between;
use crate::topology::Topology;
use crate::train_store::TrainSnapshot;
use chrono::NaiveDateTime;

/// The train as it would be once `kind` is carried out. Timing fields are
/// left alone; see [`retime`].
#[must_use]
pub fn apply_to_train(train: &Train, kind: &RecommendationKind) -> Train {
    let mut train = train.clone();
    match kind {
        RecommendationKind::Hold { at, until } => {
            let until = match &train.hold {
                Some(hold) if &hold.at == at => hold.until.max(*until),
                _ => *until,
            };
            train.hold = Some(HoldOrder { at: at.clone(), until });
        }
        RecommendationKind::Release { at } => {
            if train.hold.as_ref().is_some_and(|hold| &hold.at == at) {
                train.hold = None;
            }
        }
        RecommendationKind::PlatformAssignment { from, to } => {
            if &train.destination == from {
                train.destination.clone_from(to);
            }
        }
        RecommendationKind::SpeedAdjustment { to_kmh, .. } => train.speed_kmh = *to_kmh,
    }
    train
}

/// Shift delay and ETA of `changed` by how much its projected arrival moved
/// relative to `original`, and refresh its status
pub fn retime(
    original: &Train,
    changed: &mut Train,
    topology: &Topology,
    as_of: NaiveDateTime,
    settings: &DispatchSettings,
) {
    let before = project(original, topology, as_of, settings);
    let after = project(changed, topology, as_of, settings);
    if let (Some(before), Some(after)) = (before, after) {
        changed.delay_minutes += minutes_between(before.arrival, after.arrival);
        changed.eta = after.arrival;
    }
    changed.status = changed.derived_status(as_of, settings.on_time_threshold_minutes);
}

/// Arrival shift caused by carrying out `kind`, in minutes
#[must_use]
pub fn arrival_cost(
    train: &Train,
    kind: &RecommendationKind,
    topology: &Topology,
    as_of: NaiveDateTime,
    settings: &DispatchSettings,
) -> f64 {
    let changed = apply_to_train(train, kind);
    match (
        project(train, topology, as_of, settings),
        project(&changed, topology, as_of, settings),
    ) {
        (Some(before), Some(after)) => minutes_between(before.arrival, after.arrival),
        _ => 0.0,
    }
}

/// Fork `snapshot` with `recommendations` carried out as if accepted.
/// Recommendations for trains missing from the snapshot are skipped.
#[must_use]
pub fn apply_recommendations(
    snapshot: &TrainSnapshot,
    recommendations: &[Recommendation],
    topology: &Topology,
    settings: &DispatchSettings,
) -> TrainSnapshot {
    let mut forked = snapshot.clone();
    if recommendations.is_empty() {
        return forked;
    }
    let as_of = snapshot.as_of();
    let trains = forked.trains_mut();
    for rec in recommendations {
        let Some(original) = trains.get(&rec.train_id) else {
            log::debug!("Skipping recommendation {} for departed train {}", rec.id, rec.train_id);
            continue;
        };
        let mut changed = apply_to_train(original, &rec.kind);
        retime(original, &mut changed, topology, as_of, settings);
        trains.insert(changed.id.clone(), changed);
    }
    forked
}
