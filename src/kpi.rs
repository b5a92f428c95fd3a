//! System-wide metrics derived from train state and the ledger.

use crate::conflict::Conflict;
use crate::constants::{
    EFFICIENCY_DELAY_CEILING_MINUTES, EFFICIENCY_DELAY_WEIGHT, EFFICIENCY_ON_TIME_WEIGHT,
    EFFICIENCY_RESOLUTION_WEIGHT, EFFICIENCY_THROUGHPUT_WEIGHT, THROUGHPUT_WINDOW_MINUTES,
};
use crate::models::{ConflictKey, KpiSnapshot};
use crate::settings::DispatchSettings;
use crate::time::round1;
use crate::train_store::TrainSnapshot;
use chrono::Duration;
use std::collections::HashSet;

/// Derive a KPI snapshot.
///
/// `accepted` holds the conflict keys of every accepted recommendation; those
/// missing from `conflicts` (the latest detection) count as resolved.
#[must_use]
pub fn aggregate<'a>(
    snapshot: &TrainSnapshot,
    conflicts: &[Conflict],
    accepted: impl IntoIterator<Item = &'a ConflictKey>,
    settings: &DispatchSettings,
) -> KpiSnapshot {
    let as_of = snapshot.as_of();

    #[allow(clippy::cast_precision_loss)]
    let train_count = snapshot.len() as f64;
    let (average_delay, on_time) = if snapshot.is_empty() {
        (0.0, 100.0)
    } else {
        let total: f64 = snapshot.trains().map(|t| t.delay_minutes).sum();
        #[allow(clippy::cast_precision_loss)]
        let punctual = snapshot
            .trains()
            .filter(|t| t.delay_minutes <= settings.on_time_threshold_minutes)
            .count() as f64;
        (total / train_count, 100.0 * punctual / train_count)
    };

    let window_start = as_of - Duration::minutes(THROUGHPUT_WINDOW_MINUTES);
    #[allow(clippy::cast_precision_loss)]
    let throughput = snapshot
        .completions()
        .iter()
        .filter(|c| c.arrived_at > window_start && c.arrived_at <= as_of)
        .count() as f64;

    let active: HashSet<ConflictKey> = conflicts.iter().map(Conflict::key).collect();
    let conflicts_resolved = accepted.into_iter().filter(|key| !active.contains(*key)).count();
    let active_conflicts = conflicts.len();

    let delay_score = 100.0 * (1.0 - average_delay / EFFICIENCY_DELAY_CEILING_MINUTES).max(0.0);
    let utilisation = (100.0 * throughput / settings.section_capacity_per_hour).min(100.0);
    let handled = conflicts_resolved + active_conflicts;
    #[allow(clippy::cast_precision_loss)]
    let resolution = if handled == 0 {
        100.0
    } else {
        100.0 * conflicts_resolved as f64 / handled as f64
    };
    let efficiency = EFFICIENCY_ON_TIME_WEIGHT * on_time
        + EFFICIENCY_DELAY_WEIGHT * delay_score.min(100.0)
        + EFFICIENCY_THROUGHPUT_WEIGHT * utilisation
        + EFFICIENCY_RESOLUTION_WEIGHT * resolution;

    KpiSnapshot {
        as_of,
        average_delay_minutes: round1(average_delay),
        throughput_per_hour: throughput,
        on_time_percentage: round1(on_time),
        conflicts_resolved,
        active_conflicts,
        system_efficiency: round1(efficiency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;
    use crate::testing::{self, at};
    use crate::train_store::Completion;

    #[test]
    fn test_average_delay_and_on_time() {
        let mut trains = testing::junction_scenario();
        trains[1].delay_minutes = 4.0;
        let snapshot = TrainSnapshot::new(at(8, 0), trains);

        let kpis = aggregate(&snapshot, &[], [], &DispatchSettings::default());
        assert_eq!(kpis.average_delay_minutes, 2.0);
        assert_eq!(kpis.on_time_percentage, 50.0);
    }

    #[test]
    fn test_empty_section() {
        let snapshot = TrainSnapshot::new(at(8, 0), Vec::new());
        let kpis = aggregate(&snapshot, &[], [], &DispatchSettings::default());
        assert_eq!(kpis.average_delay_minutes, 0.0);
        assert_eq!(kpis.on_time_percentage, 100.0);
        assert_eq!(kpis.throughput_per_hour, 0.0);
        // 0.35 * 100 + 0.25 * 100 + 0.20 * 0 + 0.20 * 100
        assert_eq!(kpis.system_efficiency, 80.0);
    }

    #[test]
    fn test_throughput_counts_last_hour() {
        let mut snapshot = TrainSnapshot::new(at(9, 0), Vec::new());
        for (id, arrived) in [("A", at(7, 59)), ("B", at(8, 0)), ("C", at(8, 30)), ("D", at(9, 0))] {
            snapshot.completions_mut().push(Completion {
                train_id: id.to_string(),
                kind: crate::models::TrainKind::Local,
                arrived_at: arrived,
                delay_minutes: 0.0,
            });
        }
        let kpis = aggregate(&snapshot, &[], [], &DispatchSettings::default());
        assert_eq!(kpis.throughput_per_hour, 2.0);
    }

    #[test]
    fn test_conflicts_resolved() {
        let topology = testing::junction_topology();
        let settings = DispatchSettings::default();
        let snapshot = TrainSnapshot::new(at(8, 0), testing::junction_scenario());
        let conflicts = crate::conflict::detect(&snapshot, &topology, &settings);

        let still_active = conflicts[0].key();
        let gone = ConflictKey::new(
            Resource::Node("north".to_string()),
            vec!["A".to_string(), "C".to_string()],
        );
        let kpis = aggregate(&snapshot, &conflicts, [&still_active, &gone], &settings);
        assert_eq!(kpis.conflicts_resolved, 1);
        assert_eq!(kpis.active_conflicts, 1);
    }
}
