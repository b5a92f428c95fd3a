//! What-if runs over a bounded horizon on a worker thread.

mod runner;

pub use runner::{SimulationInputs, SimulationReport, StepTrace, TrackStep};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationPhase {
    Idle,
    Running,
    Completed,
}

impl fmt::Display for SimulationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("simulation is {0}; reset it before starting another run")]
    NotIdle(SimulationPhase),
    #[error("horizon of {requested} minutes is outside 1-{max}")]
    InvalidHorizon { requested: u32, max: u32 },
    #[error("failed to start simulation worker: {0}")]
    Spawn(String),
}

/// Snapshot of the engine as seen by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStatus {
    pub phase: SimulationPhase,
    /// Completed fraction of the horizon, 0 to 1
    pub progress: f64,
    pub horizon_minutes: Option<u32>,
    pub report: Option<SimulationReport>,
}

impl SimulationStatus {
    fn idle() -> Self {
        Self {
            phase: SimulationPhase::Idle,
            progress: 0.0,
            horizon_minutes: None,
            report: None,
        }
    }
}

#[derive(Debug)]
struct Shared {
    status: Mutex<SimulationStatus>,
    cancel: AtomicBool,
}

impl Shared {
    fn update(&self, update: impl FnOnce(&mut SimulationStatus)) {
        update(&mut self.status.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// `Idle -> Running -> Completed`; `reset` returns to `Idle` from anywhere.
///
/// Runs work on forked state only. Cancellation is cooperative and takes
/// effect between steps.
#[derive(Debug)]
pub struct SimulationEngine {
    max_horizon_minutes: u32,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulationEngine {
    #[must_use]
    pub fn new(max_horizon_minutes: u32) -> Self {
        Self {
            max_horizon_minutes,
            shared: Arc::new(Shared {
                status: Mutex::new(SimulationStatus::idle()),
                cancel: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start a run over `horizon_minutes` of simulated time
    ///
    /// # Errors
    ///
    /// Fails when the engine is not idle, the horizon is out of range, or the
    /// worker thread cannot be spawned
    pub fn start(&self, horizon_minutes: u32, inputs: SimulationInputs) -> Result<(), SimulationError> {
        if horizon_minutes == 0 || horizon_minutes > self.max_horizon_minutes {
            return Err(SimulationError::InvalidHorizon {
                requested: horizon_minutes,
                max: self.max_horizon_minutes,
            });
        }

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut status = self.shared.status.lock().unwrap_or_else(PoisonError::into_inner);
            if status.phase != SimulationPhase::Idle {
                return Err(SimulationError::NotIdle(status.phase));
            }
            *status = SimulationStatus {
                phase: SimulationPhase::Running,
                horizon_minutes: Some(horizon_minutes),
                ..SimulationStatus::idle()
            };
        }
        self.shared.cancel.store(false, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || {
                let report = runner::run(&inputs, horizon_minutes, &shared.cancel, |progress| {
                    shared.update(|status| status.progress = progress);
                });
                if let Some(report) = report {
                    log::info!(
                        "Simulation completed: delay reduction {:.1} min, efficiency gain {:.1}",
                        report.delta.delay_reduction_minutes,
                        report.delta.efficiency_gain
                    );
                    shared.update(|status| {
                        status.phase = SimulationPhase::Completed;
                        status.progress = 1.0;
                        status.report = Some(report);
                    });
                }
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                log::info!("Simulation started over {horizon_minutes} minutes");
                Ok(())
            }
            Err(e) => {
                self.shared.update(|status| *status = SimulationStatus::idle());
                Err(SimulationError::Spawn(e.to_string()))
            }
        }
    }

    /// Cancel any run, discard results and return to `Idle`
    pub fn reset(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = worker.take() {
            join_worker(handle);
        }
        self.shared.update(|status| *status = SimulationStatus::idle());
        self.shared.cancel.store(false, Ordering::Relaxed);
        log::info!("Simulation reset");
    }

    #[must_use]
    pub fn status(&self) -> SimulationStatus {
        self.shared.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Block until the current run (if any) finishes, then report status
    pub fn wait(&self) -> SimulationStatus {
        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            join_worker(handle);
        }
        self.status()
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        self.shared.cancel.store(true, Ordering::Relaxed);
        let handle = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            join_worker(handle);
        }
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("Simulation worker panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DispatchSettings;
    use crate::testing::{self, at};
    use crate::train_store::TrainSnapshot;

    fn inputs() -> SimulationInputs {
        SimulationInputs {
            snapshot: TrainSnapshot::new(at(8, 0), testing::junction_scenario()),
            pending: Vec::new(),
            accepted: Vec::new(),
            topology: Arc::new(testing::junction_topology()),
            settings: DispatchSettings::default(),
        }
    }

    #[test]
    fn test_run_to_completion() {
        let engine = SimulationEngine::new(120);
        assert_eq!(engine.status(), SimulationStatus::idle());

        engine.start(10, inputs()).expect("idle engine starts");
        let status = engine.wait();
        assert_eq!(status.phase, SimulationPhase::Completed);
        assert_eq!(status.progress, 1.0);
        assert_eq!(status.horizon_minutes, Some(10));
        let report = status.report.expect("completed run has a report");
        assert_eq!(report.current, report.predicted);
    }

    #[test]
    fn test_start_only_from_idle() {
        let engine = SimulationEngine::new(120);
        engine.start(10, inputs()).expect("idle engine starts");
        // Running or already completed, never idle until reset
        assert!(matches!(
            engine.start(10, inputs()),
            Err(SimulationError::NotIdle(_))
        ));

        engine.wait();
        assert_eq!(
            engine.start(10, inputs()),
            Err(SimulationError::NotIdle(SimulationPhase::Completed))
        );

        engine.reset();
        assert!(engine.start(10, inputs()).is_ok());
        engine.wait();
    }

    #[test]
    fn test_drop_survives_panicked_worker() {
        let engine = SimulationEngine::new(120);
        let worker = std::thread::spawn(|| panic!("worker failure"));
        *engine.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);
        drop(engine);
    }

    #[test]
    fn test_reset_from_any_state() {
        let engine = SimulationEngine::new(120);
        engine.reset();
        assert_eq!(engine.status(), SimulationStatus::idle());

        engine.start(120, inputs()).expect("idle engine starts");
        engine.reset();
        assert_eq!(engine.status(), SimulationStatus::idle());

        engine.start(5, inputs()).expect("idle engine starts");
        engine.wait();
        engine.reset();
        let status = engine.status();
        assert_eq!(status.phase, SimulationPhase::Idle);
        assert_eq!(status.progress, 0.0);
        assert!(status.report.is_none());
    }

    #[test]
    fn test_horizon_bounds() {
        let engine = SimulationEngine::new(60);
        assert_eq!(
            engine.start(0, inputs()),
            Err(SimulationError::InvalidHorizon { requested: 0, max: 60 })
        );
        assert_eq!(
            engine.start(61, inputs()),
            Err(SimulationError::InvalidHorizon { requested: 61, max: 60 })
        );
        assert_eq!(engine.status().phase, SimulationPhase::Idle);
    }
}
