use crate::ledger::LedgerError;
use crate::models::RecommendationId;
use crate::recommendation::PolicyError;
use crate::settings::SettingsError;
use crate::simulation::SimulationError;
use crate::topology::TopologyError;
use crate::train_store::TelemetryError;
use thiserror::Error;

/// Any failure surfaced by the dispatch core
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("unknown recommendation {0}")]
    UnknownRecommendation(RecommendationId),
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
