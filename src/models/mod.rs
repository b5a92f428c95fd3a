mod action;
mod kpi;
mod node;
mod recommendation;
mod resource;
mod track;
mod train;

pub use action::{Action, ActionType};
pub use kpi::{KpiDelta, KpiSnapshot};
pub use node::{Node, NodeId, NodeKind};
pub use recommendation::{EstimatedImpact, PriorityClass, Recommendation, RecommendationId, RecommendationKind};
pub use resource::{ConflictKey, Resource};
pub use track::{SegmentId, SegmentKind, TrackSegment, Waypoint};
pub use train::{HoldOrder, Train, TrainId, TrainKind, TrainPosition, TrainStatus};
