use super::Topology;
use crate::models::{Resource, TrainId};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

/// One train holding one resource over a half-open window `[enter, exit)`
#[derive(Debug, Clone, PartialEq)]
pub struct Occupancy {
    pub train_id: TrainId,
    pub priority: u8,
    pub resource: Resource,
    pub enter: NaiveDateTime,
    pub exit: NaiveDateTime,
}

impl Occupancy {
    #[must_use]
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.enter < end && start < self.exit
    }
}

/// Occupancies of one resource by at least two distinct trains
#[derive(Debug, Clone)]
pub struct ResourceGroup<'a> {
    pub resource: Resource,
    pub capacity: u32,
    pub occupancies: Vec<&'a Occupancy>,
}

impl ResourceGroup<'_> {
    #[must_use]
    pub fn train_ids(&self) -> BTreeSet<&str> {
        self.occupancies.iter().map(|occ| occ.train_id.as_str()).collect()
    }
}

/// Extension trait for grouping occupancies by the resource they share
pub trait SharedResources {
    /// Group occupancies overlapping `[start, end)` by resource, keeping only
    /// resources used by two or more trains. Groups are ordered by resource,
    /// occupancies within a group by entry time then train id.
    fn shared_resource_groups<'a>(
        &self,
        occupancies: &'a [Occupancy],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<ResourceGroup<'a>>;
}

impl SharedResources for Topology {
    fn shared_resource_groups<'a>(
        &self,
        occupancies: &'a [Occupancy],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<ResourceGroup<'a>> {
        let mut by_resource: BTreeMap<&Resource, Vec<&'a Occupancy>> = BTreeMap::new();
        for occ in occupancies {
            if occ.exit <= occ.enter || !occ.overlaps(start, end) {
                continue;
            }
            by_resource.entry(&occ.resource).or_default().push(occ);
        }

        by_resource
            .into_iter()
            .filter_map(|(resource, mut occs)| {
                let distinct: BTreeSet<&str> = occs.iter().map(|occ| occ.train_id.as_str()).collect();
                if distinct.len() < 2 {
                    return None;
                }
                let Some(capacity) = self.capacity(resource) else {
                    log::warn!("Occupancy of unknown {resource} ignored");
                    return None;
                };
                occs.sort_by(|a, b| a.enter.cmp(&b.enter).then_with(|| a.train_id.cmp(&b.train_id)));
                Some(ResourceGroup {
                    resource: resource.clone(),
                    capacity,
                    occupancies: occs,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, at};

    fn occ(train: &str, resource: Resource, enter: (u32, u32), exit: (u32, u32)) -> Occupancy {
        Occupancy {
            train_id: train.to_string(),
            priority: 5,
            resource,
            enter: at(enter.0, enter.1),
            exit: at(exit.0, exit.1),
        }
    }

    #[test]
    fn test_groups_need_two_trains() {
        let topology = testing::junction_topology();
        let junction = Resource::Node("junction".to_string());
        let occupancies = vec![
            occ("A", junction.clone(), (8, 7), (8, 9)),
            occ("B", junction.clone(), (8, 20), (8, 22)),
            occ("A", Resource::Node("north".to_string()), (8, 0), (8, 2)),
        ];
        let groups = topology.shared_resource_groups(&occupancies, at(8, 0), at(8, 30));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].resource, junction);
        assert_eq!(groups[0].capacity, 1);
        assert_eq!(groups[0].train_ids().into_iter().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_window_filters_occupancies() {
        let topology = testing::junction_topology();
        let junction = Resource::Node("junction".to_string());
        let occupancies = vec![
            occ("A", junction.clone(), (8, 7), (8, 9)),
            occ("B", junction, (8, 40), (8, 42)),
        ];
        let groups = topology.shared_resource_groups(&occupancies, at(8, 0), at(8, 30));
        assert!(groups.is_empty());
    }

    #[test]
    fn test_unknown_resource_skipped() {
        let topology = testing::junction_topology();
        let ghost = Resource::Segment("ghost".to_string());
        let occupancies = vec![
            occ("A", ghost.clone(), (8, 0), (8, 5)),
            occ("B", ghost, (8, 1), (8, 6)),
        ];
        assert!(topology
            .shared_resource_groups(&occupancies, at(8, 0), at(8, 30))
            .is_empty());
    }
}
