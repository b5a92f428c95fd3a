mod projection;
mod sweep;
mod types;

pub use projection::{project, project_with, Leg, Projection, Restraints};
pub use types::{severity, Conflict, ConflictMember};

use crate::settings::DispatchSettings;
use crate::topology::{Occupancy, SharedResources, Topology};
use crate::train_store::TrainSnapshot;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Projections of every train in the snapshot, keyed by train id.
/// Trains without a route are left out.
#[must_use]
pub fn project_all(
    snapshot: &TrainSnapshot,
    topology: &Topology,
    settings: &DispatchSettings,
) -> BTreeMap<String, Projection> {
    snapshot
        .trains()
        .filter_map(|train| project(train, topology, snapshot.as_of(), settings))
        .map(|projection| (projection.train_id.clone(), projection))
        .collect()
}

/// Detect all conflicts in a snapshot, ranked most pressing first
#[must_use]
pub fn detect(snapshot: &TrainSnapshot, topology: &Topology, settings: &DispatchSettings) -> Vec<Conflict> {
    let projections = project_all(snapshot, topology, settings);
    detect_projected(&projections, topology, snapshot.as_of(), settings)
}

/// Detect conflicts among already projected trains
#[must_use]
pub fn detect_projected(
    projections: &BTreeMap<String, Projection>,
    topology: &Topology,
    as_of: NaiveDateTime,
    settings: &DispatchSettings,
) -> Vec<Conflict> {
    let occupancies: Vec<Occupancy> = projections.values().flat_map(Projection::occupancies).collect();
    detect_occupancies(&occupancies, topology, as_of, settings)
}

/// Detect conflicts from raw occupancy windows
#[must_use]
pub fn detect_occupancies(
    occupancies: &[Occupancy],
    topology: &Topology,
    as_of: NaiveDateTime,
    settings: &DispatchSettings,
) -> Vec<Conflict> {
    #[cfg(feature = "perf_timing")]
    let started = std::time::Instant::now();

    let horizon_end = as_of
        .checked_add_signed(settings.detection_horizon)
        .unwrap_or(NaiveDateTime::MAX);
    let groups = topology.shared_resource_groups(occupancies, as_of, horizon_end);

    let mut conflicts = Vec::new();
    for group in &groups {
        sweep::overload_episodes(group, as_of, settings.detection_horizon, &mut conflicts);
    }
    rank(&mut conflicts);

    #[cfg(feature = "perf_timing")]
    log::debug!(
        "Conflict detection: {} occupancies, {} shared resources, {} conflicts in {:?}",
        occupancies.len(),
        groups.len(),
        conflicts.len(),
        started.elapsed()
    );

    conflicts
}

/// Larger priority delta first, then earlier start, then train ids, then resource
pub fn rank(conflicts: &mut [Conflict]) {
    conflicts.sort_by(|a, b| {
        b.priority_delta
            .cmp(&a.priority_delta)
            .then_with(|| a.window_start.cmp(&b.window_start))
            .then_with(|| a.train_ids().cmp(b.train_ids()))
            .then_with(|| a.resource.cmp(&b.resource))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;
    use crate::testing::{self, at};
    use chrono::Duration;

    #[test]
    fn test_junction_scenario_reports_one_conflict() {
        let topology = testing::junction_topology();
        let settings = DispatchSettings::default();
        let snapshot = TrainSnapshot::new(at(8, 0), testing::junction_scenario());

        let conflicts = detect(&snapshot, &topology, &settings);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.resource, Resource::Node("junction".to_string()));
        assert_eq!(conflict.train_ids().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(conflict.window_start, at(8, 7));
        assert_eq!(conflict.window_end, at(8, 9));
        assert_eq!(conflict.capacity, 1);
        assert_eq!(conflict.peak, 2);
        assert_eq!(conflict.priority_delta, 5);
        assert_eq!(conflict.severity, 68.2);
    }

    #[test]
    fn test_non_overlapping_windows_never_conflict() {
        let topology = testing::junction_topology();
        let settings = DispatchSettings::default();
        let resources = [
            Resource::Node("junction".to_string()),
            Resource::Node("north".to_string()),
            Resource::Segment("junction-east".to_string()),
        ];

        // Sequences of back-to-back or gapped windows on every resource
        for gap in 0..4 {
            for length in 1..5 {
                let mut occupancies = Vec::new();
                for (n, resource) in resources.iter().enumerate() {
                    let mut start = at(8, 0);
                    for t in 0..6 {
                        let end = start + Duration::minutes(length);
                        occupancies.push(Occupancy {
                            train_id: format!("T{n}{t}"),
                            priority: u8::try_from(1 + t).expect("small"),
                            resource: resource.clone(),
                            enter: start,
                            exit: end,
                        });
                        start = end + Duration::minutes(gap);
                    }
                }
                let conflicts = detect_occupancies(&occupancies, &topology, at(8, 0), &settings);
                assert!(conflicts.is_empty(), "gap {gap} length {length}: {conflicts:?}");
            }
        }
    }

    #[test]
    fn test_more_trains_than_capacity_always_conflict() {
        let settings = DispatchSettings::default();
        for capacity in 1..4u32 {
            for extra in 1..3u32 {
                let spokes = usize::try_from(capacity + extra).expect("small");
                let topology = testing::star_topology(spokes, capacity);
                let trains = (0..spokes)
                    .map(|i| {
                        let priority = u8::try_from(1 + i).expect("small");
                        testing::train_at(&format!("T{i}"), priority, &format!("s{i}"), "hub")
                    })
                    .collect();
                let snapshot = TrainSnapshot::new(at(8, 0), trains);
                let conflicts = detect(&snapshot, &topology, &settings);
                assert!(
                    conflicts.iter().any(|c| c.resource == Resource::Node("hub".to_string())),
                    "capacity {capacity} with {spokes} trains"
                );
            }
        }
    }

    #[test]
    fn test_occupancy_beyond_horizon_is_ignored() {
        let topology = testing::junction_topology();
        let settings = DispatchSettings {
            detection_horizon: Duration::minutes(5),
            ..DispatchSettings::default()
        };
        let snapshot = TrainSnapshot::new(at(8, 0), testing::junction_scenario());
        assert!(detect(&snapshot, &topology, &settings).is_empty());
    }

    #[test]
    fn test_ranking() {
        let topology = testing::junction_topology();
        let settings = DispatchSettings::default();
        let occ = |train: &str, priority: u8, resource: Resource, enter: (u32, u32), exit: (u32, u32)| Occupancy {
            train_id: train.to_string(),
            priority,
            resource,
            enter: at(enter.0, enter.1),
            exit: at(exit.0, exit.1),
        };
        let junction = Resource::Node("junction".to_string());
        let north = Resource::Node("north".to_string());
        let east_line = Resource::Segment("junction-east".to_string());
        let occupancies = vec![
            occ("A", 9, junction.clone(), (8, 10), (8, 12)),
            occ("B", 4, junction.clone(), (8, 11), (8, 13)),
            occ("C", 2, north.clone(), (8, 20), (8, 25)),
            occ("D", 3, north.clone(), (8, 20), (8, 25)),
            occ("E", 8, north.clone(), (8, 21), (8, 24)),
            occ("F", 5, east_line.clone(), (8, 5), (8, 9)),
            occ("G", 10, east_line.clone(), (8, 6), (8, 8)),
        ];

        let conflicts = detect_occupancies(&occupancies, &topology, at(8, 0), &settings);
        let order: Vec<&Resource> = conflicts.iter().map(|c| &c.resource).collect();
        assert_eq!(order, vec![&north, &east_line, &junction]);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let topology = testing::junction_topology();
        let settings = DispatchSettings::default();
        let snapshot = TrainSnapshot::new(at(8, 0), testing::junction_scenario());
        assert_eq!(
            detect(&snapshot, &topology, &settings),
            detect(&snapshot, &topology, &settings)
        );
    }
}
