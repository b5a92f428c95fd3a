//! Sweep over one resource's occupancies to find overload episodes.

use super::types::{severity, Conflict, ConflictMember};
use crate::topology::{Occupancy, ResourceGroup};
use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Edge {
    // Ends sort first: windows are half-open, so a train leaving at t makes
    // room for one entering at t
    Exit,
    Enter,
}

struct Episode<'a> {
    start: NaiveDateTime,
    peak: usize,
    members: BTreeMap<&'a str, ConflictMember>,
}

impl<'a> Episode<'a> {
    fn absorb(&mut self, active: &BTreeSet<usize>, occupancies: &[&'a Occupancy]) {
        self.peak = self.peak.max(active.len());
        for &i in active {
            let occ = occupancies[i];
            self.members
                .entry(occ.train_id.as_str())
                .and_modify(|member| {
                    member.enter = member.enter.min(occ.enter);
                    member.exit = member.exit.max(occ.exit);
                })
                .or_insert_with(|| ConflictMember {
                    train_id: occ.train_id.clone(),
                    priority: occ.priority,
                    enter: occ.enter,
                    exit: occ.exit,
                });
        }
    }
}

/// Every maximal stretch of time in which the group holds more occupancies
/// than the resource's capacity becomes one conflict
pub(super) fn overload_episodes(
    group: &ResourceGroup<'_>,
    as_of: NaiveDateTime,
    horizon: Duration,
    conflicts: &mut Vec<Conflict>,
) {
    let capacity = usize::try_from(group.capacity).unwrap_or(usize::MAX);
    if group.occupancies.len() <= capacity {
        return;
    }

    let mut events: Vec<(NaiveDateTime, Edge, usize)> = Vec::with_capacity(group.occupancies.len() * 2);
    for (i, occ) in group.occupancies.iter().enumerate() {
        events.push((occ.enter, Edge::Enter, i));
        events.push((occ.exit, Edge::Exit, i));
    }
    events.sort_unstable();

    let mut active = BTreeSet::new();
    let mut episode: Option<Episode> = None;
    let mut idx = 0;
    while idx < events.len() {
        let time = events[idx].0;
        while idx < events.len() && events[idx].0 == time {
            let (_, edge, occ) = events[idx];
            match edge {
                Edge::Exit => active.remove(&occ),
                Edge::Enter => active.insert(occ),
            };
            idx += 1;
        }

        if active.len() > capacity {
            let open = episode.get_or_insert_with(|| Episode {
                start: time,
                peak: 0,
                members: BTreeMap::new(),
            });
            open.absorb(&active, &group.occupancies);
        } else if let Some(closed) = episode.take() {
            conflicts.push(close(group, closed, time, as_of, horizon));
        }
    }
}

fn close(
    group: &ResourceGroup<'_>,
    episode: Episode<'_>,
    end: NaiveDateTime,
    as_of: NaiveDateTime,
    horizon: Duration,
) -> Conflict {
    let members: Vec<ConflictMember> = episode.members.into_values().collect();
    let highest = members.iter().map(|m| m.priority).max().unwrap_or_default();
    let lowest = members.iter().map(|m| m.priority).min().unwrap_or_default();
    let priority_delta = highest - lowest;

    Conflict {
        resource: group.resource.clone(),
        members,
        capacity: group.capacity,
        peak: u32::try_from(episode.peak).unwrap_or(u32::MAX),
        window_start: episode.start,
        window_end: end,
        priority_delta,
        severity: severity(priority_delta, episode.start, as_of, horizon),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;
    use crate::testing::at;

    fn occ(train: &str, priority: u8, enter: (u32, u32), exit: (u32, u32)) -> Occupancy {
        Occupancy {
            train_id: train.to_string(),
            priority,
            resource: Resource::Node("junction".to_string()),
            enter: at(enter.0, enter.1),
            exit: at(exit.0, exit.1),
        }
    }

    fn sweep(occupancies: &[Occupancy], capacity: u32) -> Vec<Conflict> {
        let group = ResourceGroup {
            resource: Resource::Node("junction".to_string()),
            capacity,
            occupancies: occupancies.iter().collect(),
        };
        let mut conflicts = Vec::new();
        overload_episodes(&group, at(8, 0), Duration::minutes(30), &mut conflicts);
        conflicts
    }

    #[test]
    fn test_back_to_back_windows_do_not_overload() {
        let occupancies = vec![occ("A", 9, (8, 5), (8, 7)), occ("B", 4, (8, 7), (8, 9))];
        assert!(sweep(&occupancies, 1).is_empty());
    }

    #[test]
    fn test_separate_overloads_are_separate_conflicts() {
        // A overlaps B and B overlaps C, with a gap in between
        let occupancies = vec![
            occ("A", 9, (8, 5), (8, 8)),
            occ("B", 4, (8, 7), (8, 11)),
            occ("C", 6, (8, 10), (8, 12)),
        ];
        let conflicts = sweep(&occupancies, 1);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].window_start, at(8, 7));
        assert_eq!(conflicts[0].window_end, at(8, 8));
        assert_eq!(conflicts[1].window_start, at(8, 10));
        assert_eq!(conflicts[1].train_ids().collect::<Vec<_>>(), vec!["B", "C"]);
    }

    #[test]
    fn test_episode_collects_union_and_peak() {
        let occupancies = vec![
            occ("A", 9, (8, 5), (8, 15)),
            occ("B", 4, (8, 6), (8, 9)),
            occ("C", 6, (8, 8), (8, 12)),
        ];
        let conflicts = sweep(&occupancies, 1);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.train_ids().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(conflict.peak, 3);
        assert_eq!(conflict.window_start, at(8, 6));
        assert_eq!(conflict.window_end, at(8, 12));
        assert_eq!(conflict.priority_delta, 5);
    }

    #[test]
    fn test_capacity_two_tolerates_pairs() {
        let occupancies = vec![
            occ("A", 9, (8, 5), (8, 10)),
            occ("B", 4, (8, 6), (8, 9)),
            occ("C", 6, (8, 12), (8, 14)),
        ];
        assert!(sweep(&occupancies, 2).is_empty());
    }
}
