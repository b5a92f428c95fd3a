//! Deterministic estimate of what a remedy is worth.

use crate::conflict::{Conflict, ConflictMember};
use crate::constants::DELAY_DIFFERENTIAL_WEIGHT;
use crate::models::EstimatedImpact;
use crate::settings::DispatchSettings;
use crate::time::{duration_minutes, minutes_between, round1};
use crate::train_store::TrainSnapshot;
use chrono::NaiveDateTime;

/// Members that find the resource full when the conflict is left alone,
/// first come first served, each paired with the time the resource clears
/// for them
#[must_use]
pub fn fcfs_waiters(conflict: &Conflict) -> Vec<(&ConflictMember, NaiveDateTime)> {
    let mut arrivals: Vec<&ConflictMember> = conflict.members.iter().collect();
    arrivals.sort_by(|a, b| a.enter.cmp(&b.enter).then_with(|| a.train_id.cmp(&b.train_id)));

    let capacity = usize::try_from(conflict.capacity).unwrap_or(usize::MAX);
    let Some(release) = arrivals.iter().take(capacity).map(|m| m.exit).max() else {
        return Vec::new();
    };
    arrivals.into_iter().skip(capacity).map(|m| (m, release)).collect()
}

/// Minutes the members would lose if the conflict were left to resolve
/// itself: every waiter stands until the resource clears and pays an
/// unplanned stop
#[must_use]
pub fn unmanaged_delay(conflict: &Conflict, settings: &DispatchSettings) -> f64 {
    let penalty = duration_minutes(settings.unplanned_stop_penalty);
    fcfs_waiters(conflict)
        .into_iter()
        .map(|(waiting, release)| minutes_between(waiting.enter, release).max(0.0) + penalty)
        .sum()
}

/// Estimate the effect of a remedy on `conflict`.
///
/// `cost_minutes` is how much later the targeted train arrives because of the
/// remedy. The delay credit also rewards protecting members that are already
/// running later than the target. Throughput improvement is the overload as
/// a share of the resource's hourly capacity (`capacity * 60 / headway`).
#[must_use]
pub fn estimate(
    conflict: &Conflict,
    target: &str,
    cost_minutes: f64,
    snapshot: &TrainSnapshot,
    settings: &DispatchSettings,
) -> EstimatedImpact {
    let delay_of = |id: &str| snapshot.get(id).map_or(0.0, |train| train.delay_minutes);
    let target_delay = delay_of(target);
    let worst_other = conflict
        .train_ids()
        .filter(|&id| id != target)
        .map(delay_of)
        .fold(f64::NEG_INFINITY, f64::max);
    let differential = if worst_other.is_finite() {
        (worst_other - target_delay).max(0.0)
    } else {
        0.0
    };

    let delay_reduction = (unmanaged_delay(conflict, settings) + DELAY_DIFFERENTIAL_WEIGHT * differential
        - cost_minutes.max(0.0))
    .max(0.0);

    let headway = duration_minutes(settings.headway);
    let hourly_capacity = f64::from(conflict.capacity) * 60.0 / headway;
    let overload = f64::from(conflict.peak.saturating_sub(conflict.capacity));
    let throughput = if hourly_capacity > 0.0 {
        (100.0 * overload / hourly_capacity).min(100.0)
    } else {
        0.0
    };

    EstimatedImpact {
        delay_reduction_minutes: round1(delay_reduction),
        throughput_improvement_percent: round1(throughput),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;
    use crate::testing::{self, at};

    fn junction_conflict() -> Conflict {
        Conflict {
            resource: Resource::Node("junction".to_string()),
            members: vec![
                ConflictMember {
                    train_id: "A".to_string(),
                    priority: 9,
                    enter: at(8, 7),
                    exit: at(8, 9),
                },
                ConflictMember {
                    train_id: "B".to_string(),
                    priority: 4,
                    enter: at(8, 7),
                    exit: at(8, 9),
                },
            ],
            capacity: 1,
            peak: 2,
            window_start: at(8, 7),
            window_end: at(8, 9),
            priority_delta: 5,
            severity: 68.2,
        }
    }

    #[test]
    fn test_unmanaged_delay_first_come_first_served() {
        // B waits two minutes for A and pays a three minute unplanned stop
        let settings = DispatchSettings::default();
        assert_eq!(unmanaged_delay(&junction_conflict(), &settings), 5.0);
    }

    #[test]
    fn test_fcfs_waiters() {
        let conflict = junction_conflict();
        let waiters = fcfs_waiters(&conflict);
        assert_eq!(waiters.len(), 1);
        // Same entry time: the id breaks the tie
        assert_eq!(waiters[0].0.train_id, "B");
        assert_eq!(waiters[0].1, at(8, 9));
    }

    #[test]
    fn test_estimate() {
        let settings = DispatchSettings::default();
        let snapshot = TrainSnapshot::new(at(8, 0), testing::junction_scenario());
        let impact = estimate(&junction_conflict(), "B", 3.0, &snapshot, &settings);
        assert_eq!(impact.delay_reduction_minutes, 2.0);
        // One train over a capacity of 12 per hour
        assert_eq!(impact.throughput_improvement_percent, 8.3);
    }

    #[test]
    fn test_delay_differential_credit() {
        let settings = DispatchSettings::default();
        let mut trains = testing::junction_scenario();
        trains[0].delay_minutes = 6.0;
        let snapshot = TrainSnapshot::new(at(8, 0), trains);
        let impact = estimate(&junction_conflict(), "B", 3.0, &snapshot, &settings);
        assert_eq!(impact.delay_reduction_minutes, 5.0);
    }

    #[test]
    fn test_expensive_remedy_never_negative() {
        let settings = DispatchSettings::default();
        let snapshot = TrainSnapshot::new(at(8, 0), testing::junction_scenario());
        let impact = estimate(&junction_conflict(), "B", 40.0, &snapshot, &settings);
        assert_eq!(impact.delay_reduction_minutes, 0.0);
    }
}
