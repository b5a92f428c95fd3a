//! One controlled section: the tick pipeline tying store, detector,
//! generator, ledger, KPIs and simulation together.

use crate::conflict::{detect, Conflict};
use crate::error::{DispatchError, Result};
use crate::kpi;
use crate::ledger::{ActionLedger, History, HistoryFilter, LedgerError};
use crate::models::{
    Action, ActionType, ConflictKey, KpiSnapshot, Recommendation, RecommendationId, RecommendationKind, Train,
};
use crate::recommendation::{apply_recommendations, apply_to_train, generate, retime, PolicyError};
use crate::settings::DispatchSettings;
use crate::simulation::{SimulationEngine, SimulationInputs, SimulationStatus};
use crate::time::duration_minutes;
use crate::topology::Topology;
use crate::train_store::{Completion, TrainSnapshot, TrainStore};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Outcome of one pass of the pipeline
#[derive(Debug, Clone)]
pub struct TickReport {
    pub as_of: NaiveDateTime,
    /// Conflicts in the live state, ranked
    pub conflicts: Vec<Conflict>,
    /// Recommendations registered by this tick
    pub issued: Vec<Recommendation>,
    pub expired: Vec<RecommendationId>,
    pub failures: Vec<PolicyError>,
    /// Conflicts still present with every pending recommendation carried out
    pub residual: Vec<Conflict>,
    /// Detector and generator rounds run before no new remedy turned up
    pub rounds: usize,
}

#[derive(Debug, Default)]
struct Registry {
    /// Every recommendation ever issued, in issue order
    recommendations: IndexMap<RecommendationId, Recommendation>,
    latest_conflicts: Vec<Conflict>,
}

/// The dispatch core for one section
#[derive(Debug)]
pub struct SectionController {
    topology: Arc<Topology>,
    settings: DispatchSettings,
    store: TrainStore,
    ledger: ActionLedger,
    simulation: SimulationEngine,
    registry: RwLock<Registry>,
    /// Serialises ticks and decisions so no two passes overlap
    pipeline: Mutex<()>,
}

impl SectionController {
    #[must_use]
    pub fn new(
        topology: Arc<Topology>,
        settings: DispatchSettings,
        ledger: ActionLedger,
        as_of: NaiveDateTime,
    ) -> Self {
        Self {
            store: TrainStore::new(Arc::clone(&topology), as_of),
            simulation: SimulationEngine::new(settings.max_simulation_horizon_minutes),
            topology,
            settings,
            ledger,
            registry: RwLock::new(Registry::default()),
            pipeline: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    #[must_use]
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    #[must_use]
    pub fn store(&self) -> &TrainStore {
        &self.store
    }

    #[must_use]
    pub fn snapshot(&self) -> TrainSnapshot {
        self.store.snapshot()
    }

    /// Feed one telemetry report into the store
    ///
    /// # Errors
    ///
    /// Returns the validation failure for malformed telemetry
    pub fn upsert(&self, train: Train) -> Result<()> {
        Ok(self.store.upsert(train)?)
    }

    pub fn remove(&self, id: &str) -> Option<Train> {
        self.store.remove(id)
    }

    pub fn complete(&self, id: &str, at: NaiveDateTime) -> Option<Completion> {
        self.store.complete(id, at)
    }

    /// Run the pipeline at `now`: expire stale recommendations, detect, and
    /// generate until no new remedy turns up
    pub fn tick(&self, now: NaiveDateTime) -> TickReport {
        let _pipeline = self.pipeline.lock().unwrap_or_else(PoisonError::into_inner);

        let as_of = self.store.advance_clock(now);
        let snapshot = self.store.snapshot();
        let conflicts = detect(&snapshot, &self.topology, &self.settings);

        let expired = self.expire_stale(&snapshot, &conflicts);
        let pending = self.pending();

        let mut working = apply_recommendations(&snapshot, &pending, &self.topology, &self.settings);
        let mut issued: Vec<Recommendation> = Vec::new();
        let mut failures: Vec<PolicyError> = Vec::new();
        let mut rounds = 0;
        let mut residual = detect(&working, &self.topology, &self.settings);

        while rounds < self.settings.max_fixed_point_rounds {
            rounds += 1;
            let outcome = generate(&residual, &working, &self.topology, &self.settings);
            for failure in outcome.failures {
                if !failures.contains(&failure) {
                    failures.push(failure);
                }
            }

            let fresh: Vec<Recommendation> = outcome
                .recommendations
                .into_iter()
                .filter(|rec| !pending.iter().chain(&issued).any(|known| known.same_remedy(rec)))
                .collect();
            if fresh.is_empty() {
                break;
            }
            working = apply_recommendations(&working, &fresh, &self.topology, &self.settings);
            issued.extend(fresh);
            residual = detect(&working, &self.topology, &self.settings);
        }

        if !residual.is_empty() {
            log::warn!(
                "{} conflicts remain after {rounds} recommendation rounds",
                residual.len()
            );
        }

        {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            for rec in &issued {
                registry.recommendations.insert(rec.id, rec.clone());
            }
            registry.latest_conflicts.clone_from(&conflicts);
        }
        log::debug!(
            "Tick at {as_of}: {} conflicts, {} issued, {} expired",
            conflicts.len(),
            issued.len(),
            expired.len()
        );

        TickReport {
            as_of,
            conflicts,
            issued,
            expired,
            failures,
            residual,
            rounds,
        }
    }

    /// Record `expired` actions for pending recommendations that no longer
    /// make sense against `snapshot`
    fn expire_stale(&self, snapshot: &TrainSnapshot, conflicts: &[Conflict]) -> Vec<RecommendationId> {
        let as_of = snapshot.as_of();
        let live: HashSet<ConflictKey> = conflicts.iter().map(Conflict::key).collect();
        let mut expired = Vec::new();

        let pending = self.pending();
        for rec in &pending {
            let Some(reason) = self.stale_reason(rec, &pending, snapshot, &live) else {
                continue;
            };
            match self.ledger.record(Action::expired(rec.id, &reason, as_of)) {
                Ok(()) => expired.push(rec.id),
                Err(LedgerError::AlreadyResolved { .. }) => {
                    log::debug!("Recommendation {} resolved before it could expire", rec.id);
                }
                Err(e) => log::error!("Failed to expire recommendation {}: {e}", rec.id),
            }
        }
        expired
    }

    fn stale_reason(
        &self,
        rec: &Recommendation,
        pending: &[Recommendation],
        snapshot: &TrainSnapshot,
        live: &HashSet<ConflictKey>,
    ) -> Option<String> {
        let Some(train) = snapshot.get(&rec.train_id) else {
            return Some(format!("Train {} left the section", rec.train_id));
        };
        if let Some(key) = &rec.conflict {
            if !live.contains(key) && !self.arises_from_pending(key, rec, pending, snapshot) {
                return Some("Conflict no longer detected".to_string());
            }
        }
        if let RecommendationKind::Release { at } = &rec.kind {
            if !train.hold.as_ref().is_some_and(|hold| &hold.at == at) {
                return Some("Hold no longer in place".to_string());
            }
        }
        if snapshot.as_of() - rec.created_at >= self.settings.recommendation_ttl {
            return Some(format!(
                "Not decided within {} minutes",
                duration_minutes(self.settings.recommendation_ttl)
            ));
        }
        None
    }

    /// Whether `key` shows up once the other pending recommendations are
    /// carried out, as it does for remedies issued in a later round
    fn arises_from_pending(
        &self,
        key: &ConflictKey,
        rec: &Recommendation,
        pending: &[Recommendation],
        snapshot: &TrainSnapshot,
    ) -> bool {
        let others: Vec<Recommendation> = pending.iter().filter(|other| other.id != rec.id).cloned().collect();
        if others.is_empty() {
            return false;
        }
        let forked = apply_recommendations(snapshot, &others, &self.topology, &self.settings);
        detect(&forked, &self.topology, &self.settings)
            .iter()
            .any(|conflict| &conflict.key() == key)
    }

    /// Accept a recommendation and carry it out on the live state
    ///
    /// # Errors
    ///
    /// `UnknownRecommendation` if it was never issued, otherwise any ledger
    /// rejection (blank controller, already resolved, storage failure)
    pub fn accept(&self, id: RecommendationId, controller_id: &str) -> Result<Action> {
        let _pipeline = self.pipeline.lock().unwrap_or_else(PoisonError::into_inner);
        let rec = self.recommendation(id).ok_or(DispatchError::UnknownRecommendation(id))?;

        let action = Action::accepted(id, controller_id, self.store.snapshot().as_of());
        self.ledger.record(action.clone())?;

        self.store.update(|as_of, trains| {
            let Some(original) = trains.get(&rec.train_id) else {
                log::warn!("Accepted {} for train {} which has left", rec.id, rec.train_id);
                return;
            };
            let mut changed = apply_to_train(original, &rec.kind);
            retime(original, &mut changed, &self.topology, as_of, &self.settings);
            trains.insert(changed.id.clone(), changed);
        });
        Ok(action)
    }

    /// Reject a recommendation; the reason is mandatory
    ///
    /// # Errors
    ///
    /// `UnknownRecommendation` if it was never issued, otherwise any ledger
    /// rejection, including a blank reason
    pub fn override_recommendation(&self, id: RecommendationId, controller_id: &str, reason: &str) -> Result<Action> {
        let _pipeline = self.pipeline.lock().unwrap_or_else(PoisonError::into_inner);
        if self.recommendation(id).is_none() {
            return Err(DispatchError::UnknownRecommendation(id));
        }
        let action = Action::overridden(id, controller_id, reason, self.store.snapshot().as_of());
        self.ledger.record(action.clone())?;
        Ok(action)
    }

    /// Issued recommendations with no terminal action yet, in issue order
    #[must_use]
    pub fn pending(&self) -> Vec<Recommendation> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .recommendations
            .values()
            .filter(|rec| self.ledger.resolution(rec.id).is_none())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn recommendation(&self, id: RecommendationId) -> Option<Recommendation> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.recommendations.get(&id).cloned()
    }

    #[must_use]
    pub fn history(&self, filter: HistoryFilter) -> History {
        self.ledger.history(filter)
    }

    #[must_use]
    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    /// Conflicts found by the latest tick
    #[must_use]
    pub fn latest_conflicts(&self) -> Vec<Conflict> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.latest_conflicts.clone()
    }

    /// Conflict keys of every accepted recommendation
    fn accepted_conflicts(&self) -> Vec<ConflictKey> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        self.ledger
            .history(HistoryFilter::default())
            .iter()
            .filter(|action| action.action_type == ActionType::Accepted)
            .filter_map(|action| registry.recommendations.get(&action.recommendation_id))
            .filter_map(|rec| rec.conflict.clone())
            .collect()
    }

    #[must_use]
    pub fn kpis(&self) -> KpiSnapshot {
        let snapshot = self.store.snapshot();
        let accepted = self.accepted_conflicts();
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        kpi::aggregate(&snapshot, &registry.latest_conflicts, &accepted, &self.settings)
    }

    /// Start a what-if run from the live state with the pending
    /// recommendations as the predicted course
    ///
    /// # Errors
    ///
    /// Fails when a run is already in progress or completed, or the horizon
    /// is out of range
    pub fn start_simulation(&self, horizon_minutes: u32) -> Result<()> {
        let inputs = SimulationInputs {
            snapshot: self.store.snapshot(),
            pending: self.pending(),
            accepted: self.accepted_conflicts(),
            topology: Arc::clone(&self.topology),
            settings: self.settings.clone(),
        };
        Ok(self.simulation.start(horizon_minutes, inputs)?)
    }

    pub fn reset_simulation(&self) {
        self.simulation.reset();
    }

    #[must_use]
    pub fn simulation_status(&self) -> SimulationStatus {
        self.simulation.status()
    }

    /// Block until a running simulation finishes
    pub fn wait_for_simulation(&self) -> SimulationStatus {
        self.simulation.wait()
    }
}
