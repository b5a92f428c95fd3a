//! Shared fixtures for unit tests.

use crate::constants::BASE_DATE;
use crate::models::{
    HoldOrder, Node, NodeKind, SegmentKind, TrackSegment, Train, TrainKind, TrainPosition, TrainStatus,
};
use crate::topology::Topology;
use chrono::NaiveDateTime;

/// Fixture time on the base date
pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    BASE_DATE.and_hms_opt(hour, minute, 0).expect("valid time")
}

/// A local train standing at `node`, running at 60 km/h once it departs
pub fn train_at(id: &str, priority: u8, node: &str, destination: &str) -> Train {
    Train {
        id: id.to_string(),
        kind: TrainKind::Local,
        position: TrainPosition::Node { node: node.to_string() },
        destination: destination.to_string(),
        eta: at(8, 30),
        delay_minutes: 0.0,
        speed_kmh: 60.0,
        priority,
        status: TrainStatus::OnTime,
        hold: None,
    }
}

/// A local train running at 60 km/h on `segment`
pub fn train_on(
    id: &str,
    priority: u8,
    segment: &str,
    toward: &str,
    remaining_km: f64,
    destination: &str,
) -> Train {
    Train {
        position: TrainPosition::Segment {
            segment: segment.to_string(),
            toward: toward.to_string(),
            remaining_km,
        },
        ..train_at(id, priority, toward, destination)
    }
}

pub fn held(mut train: Train, node: &str, until: NaiveDateTime) -> Train {
    train.hold = Some(HoldOrder { at: node.to_string(), until });
    train.status = TrainStatus::Stopped;
    train
}

/// Four stations around a single-track junction of capacity 1.
///
/// ```text
///            north
///              | 5 km
/// west --10-- junction --10-- east
///              | 5 km
///            south
/// ```
pub fn junction_topology() -> Topology {
    let nodes = vec![
        Node::new("north", "North Station", NodeKind::Station, 2),
        Node::new("south", "South Station", NodeKind::Station, 2),
        Node::new("junction", "North Junction", NodeKind::Junction, 1),
        Node::new("east", "East Terminal", NodeKind::Station, 3),
        Node::new("west", "West Terminal", NodeKind::Station, 3),
    ];
    let segments = vec![
        TrackSegment::new("north-junction", SegmentKind::Main, "north", "junction", 5.0),
        TrackSegment::new("south-junction", SegmentKind::Main, "south", "junction", 5.0),
        TrackSegment::new("junction-east", SegmentKind::Main, "junction", "east", 10.0),
        TrackSegment::new("junction-west", SegmentKind::Main, "junction", "west", 10.0),
    ];
    Topology::from_parts(nodes, segments).expect("valid junction topology")
}

/// Two approach lines meeting at a throat that feeds two platforms of one station.
///
/// ```text
/// outer_a --6-- throat --1-- p1 (central)
/// outer_b --6--/      \--1-- p2 (central)
/// ```
pub fn platform_topology() -> Topology {
    let nodes = vec![
        Node::new("outer_a", "Outer A", NodeKind::Station, 2),
        Node::new("outer_b", "Outer B", NodeKind::Station, 2),
        Node::new("throat", "Central Throat", NodeKind::Junction, 2),
        Node::new("central", "Central Station", NodeKind::Station, 4),
        Node::new("p1", "Platform 1", NodeKind::Platform, 1).with_parent("central"),
        Node::new("p2", "Platform 2", NodeKind::Platform, 1).with_parent("central"),
    ];
    let segments = vec![
        TrackSegment::new("outer_a-throat", SegmentKind::Main, "outer_a", "throat", 6.0),
        TrackSegment::new("outer_b-throat", SegmentKind::Main, "outer_b", "throat", 6.0),
        TrackSegment::new("throat-p1", SegmentKind::JunctionLink, "throat", "p1", 1.0).with_tracks(2),
        TrackSegment::new("throat-p2", SegmentKind::JunctionLink, "throat", "p2", 1.0).with_tracks(2),
    ];
    Topology::from_parts(nodes, segments).expect("valid platform topology")
}

/// `spokes` stations `s0..` each 5 km from a central hub of `hub_capacity`
pub fn star_topology(spokes: usize, hub_capacity: u32) -> Topology {
    let spoke_capacity = u32::try_from(spokes).expect("small fixture");
    let mut nodes = vec![Node::new("hub", "Hub", NodeKind::Junction, hub_capacity)];
    let mut segments = Vec::new();
    for i in 0..spokes {
        let id = format!("s{i}");
        nodes.push(Node::new(&id, &format!("Spoke {i}"), NodeKind::Station, spoke_capacity));
        segments.push(TrackSegment::new(
            &format!("{id}-hub"),
            SegmentKind::Main,
            &id,
            "hub",
            5.0,
        ));
    }
    Topology::from_parts(nodes, segments).expect("valid star topology")
}

/// Trains A (priority 9, north to east) and B (priority 4, south to west),
/// both passing the junction over [08:07, 08:09) when starting at 08:00
pub fn junction_scenario() -> Vec<Train> {
    vec![
        train_at("A", 9, "north", "east"),
        train_at("B", 4, "south", "west"),
    ]
}

/// A as in the junction scenario; B already on the south approach, 5 km out
/// at 50 km/h, entering the junction over [08:06, 08:08)
pub fn approach_scenario() -> Vec<Train> {
    let mut b = train_on("B", 4, "south-junction", "junction", 5.0, "west");
    b.speed_kmh = 50.0;
    vec![train_at("A", 9, "north", "east"), b]
}
