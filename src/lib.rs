#![allow(clippy::implicit_hasher)]
#![allow(unknown_lints)]

pub mod conflict;
pub mod constants;
pub mod error;
pub mod kpi;
pub mod ledger;
pub mod models;
pub mod recommendation;
pub mod section;
pub mod settings;
pub mod simulation;
pub mod time;
pub mod topology;
pub mod train_store;

#[cfg(test)]
mod testing;

pub use error::DispatchError;
pub use section::{SectionController, TickReport};
pub use settings::DispatchSettings;
pub use topology::Topology;
