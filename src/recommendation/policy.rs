//! The fixed decision policy: which remedy fits a conflict.

use super::apply::apply_to_train;
use crate::conflict::{project, Conflict, ConflictMember, Leg, Projection};
use crate::models::{Node, RecommendationKind, Resource, TrackSegment, Train, TrainId, TrainPosition};
use crate::settings::DispatchSettings;
use crate::time::{format_clock, minutes_between};
use crate::topology::Topology;
use crate::train_store::TrainSnapshot;
use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;

pub(super) struct PolicyContext<'a> {
    pub snapshot: &'a TrainSnapshot,
    pub topology: &'a Topology,
    pub settings: &'a DispatchSettings,
    pub projections: &'a BTreeMap<TrainId, Projection>,
}

/// A chosen remedy, before impact and priority are attached
pub(super) struct Remedy {
    pub train_id: TrainId,
    pub kind: RecommendationKind,
    pub description: String,
    pub rationale: String,
}

/// Lowest priority gives way; among equals the one arriving last, then the highest id
pub(super) fn yielding_member(conflict: &Conflict) -> Option<&ConflictMember> {
    conflict.members.iter().min_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.enter.cmp(&a.enter))
            .then_with(|| b.train_id.cmp(&a.train_id))
    })
}

/// When every member other than `yielding` has left the resource
fn clear_time(conflict: &Conflict, yielding: &ConflictMember) -> NaiveDateTime {
    conflict
        .members
        .iter()
        .filter(|m| m.train_id != yielding.train_id)
        .map(|m| m.exit)
        .max()
        .unwrap_or(yielding.exit)
}

fn others(conflict: &Conflict, train_id: &str) -> String {
    conflict
        .train_ids()
        .filter(|&id| id != train_id)
        .collect::<Vec<_>>()
        .join(", ")
}

fn lookup<'a>(ctx: &PolicyContext<'a>, train_id: &str) -> Option<(&'a Train, &'a Projection)> {
    Some((ctx.snapshot.get(train_id)?, ctx.projections.get(train_id)?))
}

/// Hold the yielding train at a station or platform it reaches before the
/// contested resource, long enough to enter it once the others have cleared
pub(super) fn hold(ctx: &PolicyContext<'_>, conflict: &Conflict, yielding: &ConflictMember) -> Option<Remedy> {
    let (train, projection) = lookup(ctx, &yielding.train_id)?;
    let resource_idx = projection.leg_index(&conflict.resource)?;

    let hold_at = match &train.position {
        TrainPosition::Node { node } => {
            let eligible = train.is_stopped() || ctx.topology.node(node).is_some_and(Node::is_hold_point);
            eligible.then_some(node)
        }
        TrainPosition::Segment {
            toward, remaining_km, ..
        } => {
            let near = train.is_stopped() || *remaining_km <= ctx.settings.hold_point_radius_km;
            let eligible = near && ctx.topology.node(toward).is_some_and(Node::is_hold_point);
            eligible.then_some(toward)
        }
    }?;

    let hold_idx = projection.leg_index(&Resource::Node(hold_at.clone()))?;
    if hold_idx >= resource_idx {
        return None;
    }

    let clear_at = clear_time(conflict, yielding);
    let shift = clear_at + ctx.settings.hold_margin - projection.legs[resource_idx].enter;
    if shift <= Duration::zero() {
        return None;
    }
    let until = projection.legs[hold_idx].exit + shift;

    Some(Remedy {
        train_id: train.id.clone(),
        description: format!(
            "Hold {} at {} until {}",
            train.id,
            ctx.topology.node_name(hold_at),
            format_clock(until)
        ),
        rationale: format!(
            "Allow {} to pass through {} first",
            others(conflict, &train.id),
            ctx.topology.display_name(&conflict.resource)
        ),
        kind: RecommendationKind::Hold {
            at: hold_at.clone(),
            until,
        },
    })
}

/// Send a member bound for the contested platform to a sibling platform that
/// is free while it would be there
pub(super) fn platform_assignment(ctx: &PolicyContext<'_>, conflict: &Conflict) -> Option<Remedy> {
    let platform_id = conflict.resource.node_id()?;
    if !ctx.topology.node(platform_id).is_some_and(Node::is_platform) {
        return None;
    }
    let alternates = ctx.topology.alternate_platforms(platform_id);
    if alternates.is_empty() {
        return None;
    }

    let mut candidates: Vec<(&ConflictMember, &Train)> = conflict
        .members
        .iter()
        .filter_map(|m| ctx.snapshot.get(&m.train_id).map(|train| (m, train)))
        .filter(|(_, train)| train.destination == platform_id)
        .collect();
    candidates.sort_by(|(a, _), (b, _)| a.priority.cmp(&b.priority).then_with(|| a.train_id.cmp(&b.train_id)));

    for (_, train) in candidates {
        for alternate in &alternates {
            let kind = RecommendationKind::PlatformAssignment {
                from: platform_id.to_string(),
                to: alternate.id.clone(),
            };
            let moved = apply_to_train(train, &kind);
            let Some(projection) = project(&moved, ctx.topology, ctx.snapshot.as_of(), ctx.settings) else {
                continue;
            };
            let resource = Resource::Node(alternate.id.clone());
            let Some(stay) = projection.leg(&resource) else {
                continue;
            };
            let busy = ctx
                .projections
                .values()
                .filter(|other| other.train_id != train.id)
                .filter_map(|other| other.leg(&resource))
                .filter(|leg| leg.enter < stay.exit && stay.enter < leg.exit)
                .count();
            if busy >= usize::try_from(alternate.capacity).unwrap_or(usize::MAX) {
                continue;
            }

            return Some(Remedy {
                train_id: train.id.clone(),
                description: format!("Assign {} to {}", alternate.name, train.id),
                rationale: format!(
                    "{} will be occupied by {}",
                    ctx.topology.node_name(platform_id),
                    others(conflict, &train.id)
                ),
                kind,
            });
        }
    }
    None
}

/// Slow the yielding train on the main line so it reaches the resource
/// after the others have cleared
pub(super) fn speed_adjustment(
    ctx: &PolicyContext<'_>,
    conflict: &Conflict,
    yielding: &ConflictMember,
) -> Option<Remedy> {
    let (train, projection) = lookup(ctx, &yielding.train_id)?;
    if train.is_stopped() || train.speed_kmh <= 0.0 {
        return None;
    }
    let resource_idx = projection.leg_index(&conflict.resource)?;

    let main_line = |leg: &Leg| {
        leg.resource
            .segment_id()
            .and_then(|id| ctx.topology.segment(id))
            .is_some_and(TrackSegment::is_main_line)
    };
    let over_main = main_line(&projection.legs[resource_idx])
        || projection.segment_before(resource_idx).is_some_and(main_line);
    if !over_main {
        return None;
    }

    let distance = projection.distance_before(resource_idx);
    if distance <= 0.0 {
        return None;
    }
    let clear_at = clear_time(conflict, yielding);
    let shift = minutes_between(projection.legs[resource_idx].enter, clear_at + ctx.settings.hold_margin);
    if shift <= 0.0 {
        return None;
    }

    let running = distance / train.speed_kmh * 60.0;
    let to_kmh = (distance * 60.0 / (running + shift)).floor();
    if to_kmh < ctx.settings.min_adjusted_speed_kmh || to_kmh >= train.speed_kmh {
        return None;
    }

    Some(Remedy {
        train_id: train.id.clone(),
        description: format!("Reduce speed of {} to {to_kmh} km/h", train.id),
        rationale: format!(
            "Reach {} after {} clear it at {}",
            ctx.topology.display_name(&conflict.resource),
            others(conflict, &train.id),
            format_clock(clear_at)
        ),
        kind: RecommendationKind::SpeedAdjustment {
            from_kmh: train.speed_kmh,
            to_kmh,
        },
    })
}
