//! Turning ranked conflicts into recommendations.

mod apply;
mod impact;
mod policy;

pub use apply::{apply_recommendations, apply_to_train, arrival_cost, retime};
pub use impact::{estimate, fcfs_waiters, unmanaged_delay};

use crate::conflict::{project_all, Conflict};
use crate::models::{ConflictKey, EstimatedImpact, PriorityClass, Recommendation, RecommendationKind};
use crate::settings::DispatchSettings;
use crate::time::format_clock;
use crate::topology::Topology;
use crate::train_store::TrainSnapshot;
use policy::{PolicyContext, Remedy};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// No remedy fits the conflict. This points at a gap in the policy, not at bad input.
    #[error("no applicable policy for conflict at {} between {}", .0.resource, .0.trains.join(", "))]
    NoApplicablePolicy(ConflictKey),
}

/// Recommendations for one detector run, plus the conflicts nothing fitted
#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub recommendations: Vec<Recommendation>,
    pub failures: Vec<PolicyError>,
}

/// Generate recommendations for `conflicts` (already ranked) and release
/// recommendations for trains whose holds have run out.
///
/// A train gets at most one recommendation per run; later conflicts involving
/// it as the yielding party are left for the next run on the updated state.
#[must_use]
pub fn generate(
    conflicts: &[Conflict],
    snapshot: &TrainSnapshot,
    topology: &Topology,
    settings: &DispatchSettings,
) -> GenerationOutcome {
    let projections = project_all(snapshot, topology, settings);
    let ctx = PolicyContext {
        snapshot,
        topology,
        settings,
        projections: &projections,
    };

    let mut outcome = GenerationOutcome::default();
    let mut targeted = BTreeSet::new();
    for conflict in conflicts {
        match recommend(&ctx, conflict) {
            Ok(rec) => {
                if targeted.insert(rec.train_id.clone()) {
                    log::debug!("{} for conflict at {}", rec.description, conflict.resource);
                    outcome.recommendations.push(rec);
                }
            }
            Err(e) => {
                log::error!("{e}");
                outcome.failures.push(e);
            }
        }
    }

    for rec in releases(snapshot, topology) {
        if targeted.insert(rec.train_id.clone()) {
            outcome.recommendations.push(rec);
        }
    }
    outcome
}

fn recommend(ctx: &PolicyContext<'_>, conflict: &Conflict) -> Result<Recommendation, PolicyError> {
    let no_policy = || PolicyError::NoApplicablePolicy(conflict.key());
    let yielding = policy::yielding_member(conflict).ok_or_else(no_policy)?;

    let remedy = policy::hold(ctx, conflict, yielding)
        .or_else(|| policy::platform_assignment(ctx, conflict))
        .or_else(|| policy::speed_adjustment(ctx, conflict, yielding))
        .ok_or_else(no_policy)?;

    build(ctx, conflict, remedy).ok_or_else(no_policy)
}

fn build(ctx: &PolicyContext<'_>, conflict: &Conflict, remedy: Remedy) -> Option<Recommendation> {
    let train = ctx.snapshot.get(&remedy.train_id)?;
    let as_of = ctx.snapshot.as_of();
    let cost = arrival_cost(train, &remedy.kind, ctx.topology, as_of, ctx.settings);

    Some(Recommendation {
        id: Uuid::new_v4(),
        estimated_impact: estimate(conflict, &remedy.train_id, cost, ctx.snapshot, ctx.settings),
        train_id: remedy.train_id,
        kind: remedy.kind,
        description: remedy.description,
        rationale: remedy.rationale,
        priority: PriorityClass::from_severity(conflict.severity, &ctx.settings.severity_bands),
        created_at: as_of,
        conflict: Some(conflict.key()),
        severity: conflict.severity,
    })
}

/// Releases for trains still carrying a hold whose time has passed
fn releases(snapshot: &TrainSnapshot, topology: &Topology) -> Vec<Recommendation> {
    let as_of = snapshot.as_of();
    snapshot
        .trains()
        .filter_map(|train| {
            let hold = train.hold.as_ref().filter(|hold| hold.until <= as_of)?;
            Some(Recommendation {
                id: Uuid::new_v4(),
                train_id: train.id.clone(),
                kind: RecommendationKind::Release { at: hold.at.clone() },
                description: format!("Release {} from {}", train.id, topology.node_name(&hold.at)),
                rationale: format!("Hold ended at {}", format_clock(hold.until)),
                priority: PriorityClass::Low,
                estimated_impact: EstimatedImpact {
                    delay_reduction_minutes: 0.0,
                    throughput_improvement_percent: 0.0,
                },
                created_at: as_of,
                conflict: None,
                severity: 0.0,
            })
        })
        .collect()
}
