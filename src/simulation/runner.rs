//! Stepping two forked tracks of train state through a horizon.

use crate::conflict::{detect_projected, project_all, project_with, Conflict, Projection, Restraints};
use crate::kpi;
use crate::models::{ConflictKey, KpiDelta, KpiSnapshot, Recommendation, Resource, TrainId, TrainPosition};
use crate::recommendation::{apply_recommendations, fcfs_waiters, generate};
use crate::settings::DispatchSettings;
use crate::time::{duration_minutes, minutes_between};
use crate::topology::Topology;
use crate::train_store::{Completion, TrainSnapshot};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything a run needs, captured when it is started
#[derive(Debug, Clone)]
pub struct SimulationInputs {
    pub snapshot: TrainSnapshot,
    /// Carried out on the predicted track as if accepted
    pub pending: Vec<Recommendation>,
    /// Conflict keys of recommendations accepted before the run
    pub accepted: Vec<ConflictKey>,
    pub topology: Arc<Topology>,
    pub settings: DispatchSettings,
}

/// What happened on one track during one step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackStep {
    pub conflicts: usize,
    pub recommendations: usize,
    /// Trains that found a resource full and had to stop
    pub unplanned_stops: usize,
    pub arrivals: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTrace {
    pub at: NaiveDateTime,
    pub current: TrackStep,
    pub predicted: TrackStep,
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub horizon_minutes: u32,
    /// KPIs at the end of the horizon with no recommendation carried out
    pub current: KpiSnapshot,
    /// KPIs at the end of the horizon with the pending recommendations carried out
    pub predicted: KpiSnapshot,
    pub delta: KpiDelta,
    pub trace: Vec<StepTrace>,
}

/// One forked evolution of the train state.
///
/// Every train follows a plan (its projection). Plans only change when a
/// train is stopped in front of a contested resource, so a train moving
/// undisturbed arrives exactly when first projected.
struct Track<'a> {
    topology: &'a Topology,
    settings: &'a DispatchSettings,
    snapshot: TrainSnapshot,
    plans: BTreeMap<TrainId, Projection>,
    restraints: BTreeMap<TrainId, Restraints>,
    /// Planned arrival and delay of each train when the run started
    baseline: BTreeMap<TrainId, (NaiveDateTime, f64)>,
}

impl<'a> Track<'a> {
    fn new(snapshot: TrainSnapshot, topology: &'a Topology, settings: &'a DispatchSettings) -> Self {
        let plans = project_all(&snapshot, topology, settings);
        let baseline = plans
            .values()
            .filter_map(|plan| {
                let train = snapshot.get(&plan.train_id)?;
                Some((plan.train_id.clone(), (plan.arrival, train.delay_minutes)))
            })
            .collect();
        Self {
            topology,
            settings,
            snapshot,
            plans,
            restraints: BTreeMap::new(),
            baseline,
        }
    }

    fn detect(&self) -> Vec<Conflict> {
        detect_projected(&self.plans, self.topology, self.snapshot.as_of(), self.settings)
    }

    fn step(&mut self, step: Duration) -> TrackStep {
        let until = self.snapshot.as_of() + step;
        let conflicts = self.detect();
        let recommendations = generate(&conflicts, &self.snapshot, self.topology, self.settings)
            .recommendations
            .len();
        let unplanned_stops = self.stop_unmanaged(&conflicts, until);
        let arrivals = self.advance(until);
        TrackStep {
            conflicts: conflicts.len(),
            recommendations,
            unplanned_stops,
            arrivals,
        }
    }

    /// Let conflicts starting before `until` resolve themselves: trains that
    /// have not yet entered the resource stop in front of it, first come
    /// first served, until it clears plus an unplanned stop penalty
    fn stop_unmanaged(&mut self, conflicts: &[Conflict], until: NaiveDateTime) -> usize {
        let now = self.snapshot.as_of();
        let mut stops = 0;
        let mut replan = BTreeSet::new();

        for conflict in conflicts.iter().filter(|c| c.window_start <= until) {
            for (waiting, release) in fcfs_waiters(conflict) {
                if waiting.enter <= now {
                    continue;
                }
                let restraints = self.restraints.entry(waiting.train_id.clone()).or_default();
                let not_before = match restraints.get(&conflict.resource) {
                    Some(&earlier) => earlier.max(release),
                    None => {
                        stops += 1;
                        release + self.settings.unplanned_stop_penalty
                    }
                };
                restraints.insert(conflict.resource.clone(), not_before);
                replan.insert(waiting.train_id.clone());
            }
        }

        for id in &replan {
            self.replan(id);
        }
        stops
    }

    fn replan(&mut self, id: &str) {
        let Some(train) = self.snapshot.get(id) else {
            return;
        };
        let now = self.snapshot.as_of();
        // A train part way through a stop keeps the time it already stood there
        let from = self
            .plans
            .get(id)
            .and_then(|plan| {
                plan.legs
                    .iter()
                    .find(|leg| !leg.is_segment() && leg.enter <= now && now < leg.exit)
            })
            .map_or(now, |leg| leg.enter);
        let empty = Restraints::new();
        let restraints = self.restraints.get(id).unwrap_or(&empty);

        if let Some(plan) = project_with(train, self.topology, from, self.settings, restraints) {
            self.plans.insert(id.to_string(), plan);
        }
    }

    /// Move every planned train to where its plan puts it at `to` and
    /// record arrivals
    fn advance(&mut self, to: NaiveDateTime) -> usize {
        let threshold = self.settings.on_time_threshold_minutes;
        let mut arrived = Vec::new();

        let trains = self.snapshot.trains_mut();
        for (id, plan) in &self.plans {
            let Some(train) = trains.get_mut(id) else {
                continue;
            };
            if let Some(&(planned, delay)) = self.baseline.get(id) {
                train.delay_minutes = delay + minutes_between(planned, plan.arrival);
            }
            train.eta = plan.arrival;
            if plan.arrival <= to {
                arrived.push((id.clone(), plan.arrival));
                continue;
            }

            train.position = position_at(plan, to);
            let hold_passed = train.hold.as_ref().is_some_and(|hold| {
                plan.leg(&Resource::Node(hold.at.clone()))
                    .map_or(true, |leg| leg.exit <= to)
            });
            if hold_passed {
                train.hold = None;
            }
            train.status = train.derived_status(to, threshold);
        }

        for (id, arrived_at) in &arrived {
            self.plans.remove(id);
            self.restraints.remove(id);
            if let Some(train) = self.snapshot.trains_mut().remove(id) {
                self.snapshot.completions_mut().push(Completion {
                    train_id: train.id,
                    kind: train.kind,
                    arrived_at: *arrived_at,
                    delay_minutes: train.delay_minutes,
                });
            }
        }
        self.snapshot.set_as_of(to);
        arrived.len()
    }

    fn kpis<'k>(&self, accepted: impl IntoIterator<Item = &'k ConflictKey>) -> KpiSnapshot {
        kpi::aggregate(&self.snapshot, &self.detect(), accepted, self.settings)
    }
}

/// Where `plan` puts its train at `at`
fn position_at(plan: &Projection, at: NaiveDateTime) -> TrainPosition {
    let Some(leg) = plan.legs.iter().find(|leg| leg.enter <= at && at < leg.exit) else {
        let last = plan.legs.last().map(|leg| leg.toward.clone()).unwrap_or_default();
        return TrainPosition::Node { node: last };
    };
    match &leg.resource {
        Resource::Node(node) => TrainPosition::Node { node: node.clone() },
        Resource::Segment(segment) => {
            let travelled = plan.speed_kmh * minutes_between(leg.enter, at) / 60.0;
            TrainPosition::Segment {
                segment: segment.clone(),
                toward: leg.toward.clone(),
                remaining_km: (leg.length_km - travelled).max(0.0),
            }
        }
    }
}

/// Run both tracks over `horizon_minutes`, reporting the completed fraction
/// after every step. Returns `None` once `cancel` is set.
pub(super) fn run(
    inputs: &SimulationInputs,
    horizon_minutes: u32,
    cancel: &AtomicBool,
    mut progress: impl FnMut(f64),
) -> Option<SimulationReport> {
    let SimulationInputs {
        snapshot,
        pending,
        accepted,
        topology,
        settings,
    } = inputs;
    let started_at = snapshot.as_of();
    let horizon = Duration::minutes(i64::from(horizon_minutes));
    let step = settings.simulation_step.max(Duration::minutes(1));

    let predicted_start = apply_recommendations(snapshot, pending, topology, settings);
    let mut current = Track::new(snapshot.clone(), topology, settings);
    let mut predicted = Track::new(predicted_start, topology, settings);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let steps = (duration_minutes(horizon) / duration_minutes(step)).ceil() as usize;
    let mut trace = Vec::with_capacity(steps);

    for i in 0..steps {
        if cancel.load(Ordering::Relaxed) {
            log::info!("Simulation cancelled after {i} of {steps} steps");
            return None;
        }
        let at = current.snapshot.as_of();
        let dt = step.min(started_at + horizon - at);
        trace.push(StepTrace {
            at,
            current: current.step(dt),
            predicted: predicted.step(dt),
        });
        #[allow(clippy::cast_precision_loss)]
        progress((i + 1) as f64 / steps as f64);
    }

    let current_kpis = current.kpis(accepted);
    let predicted_keys: Vec<ConflictKey> = accepted
        .iter()
        .cloned()
        .chain(pending.iter().filter_map(|rec| rec.conflict.clone()))
        .collect();
    let predicted_kpis = predicted.kpis(&predicted_keys);

    Some(SimulationReport {
        started_at,
        finished_at: current.snapshot.as_of(),
        horizon_minutes,
        delta: KpiDelta::between(&current_kpis, &predicted_kpis),
        current: current_kpis,
        predicted: predicted_kpis,
        trace,
    })
}
