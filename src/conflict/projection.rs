//! Projecting a train along its route into timed resource occupancies.

use crate::models::{NodeId, Resource, Train, TrainId, TrainPosition};
use crate::settings::DispatchSettings;
use crate::time::travel_time;
use crate::topology::{Occupancy, Routes, Topology};
use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;

/// Earliest time a train may enter a resource, imposed on top of its own timing
pub type Restraints = BTreeMap<Resource, NaiveDateTime>;

/// One resource on a projected route
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub resource: Resource,
    pub enter: NaiveDateTime,
    pub exit: NaiveDateTime,
    /// Node reached at the end of a segment leg; the node itself for node legs
    pub toward: NodeId,
    /// Distance covered on this leg (zero for nodes)
    pub length_km: f64,
}

impl Leg {
    #[must_use]
    pub fn is_segment(&self) -> bool {
        matches!(self.resource, Resource::Segment(_))
    }
}

/// Timed route of one train from its current position to its destination
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub train_id: TrainId,
    pub priority: u8,
    pub speed_kmh: f64,
    pub legs: Vec<Leg>,
    /// When the train reaches its destination
    pub arrival: NaiveDateTime,
}

impl Projection {
    /// Index of the first leg using `resource`
    #[must_use]
    pub fn leg_index(&self, resource: &Resource) -> Option<usize> {
        self.legs.iter().position(|leg| &leg.resource == resource)
    }

    #[must_use]
    pub fn leg(&self, resource: &Resource) -> Option<&Leg> {
        self.leg_index(resource).map(|i| &self.legs[i])
    }

    /// Distance run before entering leg `index`
    #[must_use]
    pub fn distance_before(&self, index: usize) -> f64 {
        self.legs[..index.min(self.legs.len())]
            .iter()
            .map(|leg| leg.length_km)
            .sum()
    }

    /// Last segment leg before leg `index`
    #[must_use]
    pub fn segment_before(&self, index: usize) -> Option<&Leg> {
        self.legs[..index.min(self.legs.len())]
            .iter()
            .rev()
            .find(|leg| leg.is_segment())
    }

    pub fn occupancies(&self) -> impl Iterator<Item = Occupancy> + '_ {
        self.legs.iter().map(|leg| Occupancy {
            train_id: self.train_id.clone(),
            priority: self.priority,
            resource: leg.resource.clone(),
            enter: leg.enter,
            exit: leg.exit,
        })
    }
}

/// `clock` moved on by `by`, or `None` past the end of the calendar
fn later(train: &Train, clock: NaiveDateTime, by: Duration) -> Option<NaiveDateTime> {
    let moved = clock.checked_add_signed(by);
    if moved.is_none() {
        log::warn!("Dropping projection of train {}: timing overflows after {clock}", train.id);
    }
    moved
}

/// Project `train` from `as_of` along its shortest route
#[must_use]
pub fn project(
    train: &Train,
    topology: &Topology,
    as_of: NaiveDateTime,
    settings: &DispatchSettings,
) -> Option<Projection> {
    project_with(train, topology, as_of, settings, &Restraints::new())
}

/// Project `train` honouring `restraints`.
///
/// A restrained node makes the train wait on its approach segment, a
/// restrained segment makes it wait at the node before it. Resources the train
/// already occupies at `as_of` are never delayed.
#[must_use]
pub fn project_with(
    train: &Train,
    topology: &Topology,
    as_of: NaiveDateTime,
    settings: &DispatchSettings,
    restraints: &Restraints,
) -> Option<Projection> {
    let speed_kmh = train.effective_speed_kmh();
    let mut legs = Vec::new();
    let mut clock = as_of;

    let start = match &train.position {
        TrainPosition::Node { node } => node.as_str(),
        TrainPosition::Segment {
            segment,
            toward,
            remaining_km,
        } => {
            let exit = later(train, clock, travel_time(*remaining_km, speed_kmh))?;
            legs.push(Leg {
                resource: Resource::Segment(segment.clone()),
                enter: clock,
                exit,
                toward: toward.clone(),
                length_km: *remaining_km,
            });
            clock = exit;
            toward.as_str()
        }
    };

    let Some(route) = topology.route(start, &train.destination) else {
        log::debug!("No route for train {} from {start} to {}", train.id, train.destination);
        return None;
    };

    let last = route.nodes.len() - 1;
    let mut arrival = clock;
    for (i, node) in route.nodes.iter().enumerate() {
        let occupied_now = i == 0 && legs.is_empty();

        if !occupied_now {
            if let Some(&not_before) = restraints.get(&Resource::Node(node.clone())) {
                if not_before > clock {
                    if let Some(approach) = legs.last_mut() {
                        approach.exit = not_before;
                    }
                    clock = not_before;
                }
            }
        }

        let enter = clock;
        if i == last {
            arrival = enter;
            legs.push(Leg {
                resource: Resource::Node(node.clone()),
                enter,
                exit: later(train, enter, settings.station_dwell)?,
                toward: node.clone(),
                length_km: 0.0,
            });
            break;
        }

        let mut depart = later(train, enter, settings.junction_clearance)?;
        if let Some(hold) = train.hold.as_ref().filter(|hold| &hold.at == node) {
            depart = depart.max(hold.until);
        }

        let segment_id = &route.segments[i];
        let segment = topology.segment(segment_id)?;
        let segment_resource = Resource::Segment(segment_id.clone());
        if let Some(&not_before) = restraints.get(&segment_resource) {
            depart = depart.max(not_before);
        }

        legs.push(Leg {
            resource: Resource::Node(node.clone()),
            enter,
            exit: depart,
            toward: node.clone(),
            length_km: 0.0,
        });

        let exit = later(train, depart, travel_time(segment.length_km, speed_kmh))?;
        legs.push(Leg {
            resource: segment_resource,
            enter: depart,
            exit,
            toward: route.nodes[i + 1].clone(),
            length_km: segment.length_km,
        });
        clock = exit;
    }

    Some(Projection {
        train_id: train.id.clone(),
        priority: train.priority,
        speed_kmh,
        legs,
        arrival,
    })
}
