use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// System-wide metrics, always derived from train state and the action ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub as_of: NaiveDateTime,
    pub average_delay_minutes: f64,
    /// Trains completing their route in the last rolling hour
    pub throughput_per_hour: f64,
    pub on_time_percentage: f64,
    pub conflicts_resolved: usize,
    pub active_conflicts: usize,
    pub system_efficiency: f64,
}

/// Predicted minus current; positive means the prediction is better for every field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDelta {
    pub delay_reduction_minutes: f64,
    pub throughput_increase: f64,
    pub on_time_improvement: f64,
    pub conflict_reduction: i64,
    pub efficiency_gain: f64,
}

impl KpiDelta {
    #[must_use]
    pub fn between(current: &KpiSnapshot, predicted: &KpiSnapshot) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let conflict_reduction = current.active_conflicts as i64 - predicted.active_conflicts as i64;
        Self {
            delay_reduction_minutes: current.average_delay_minutes - predicted.average_delay_minutes,
            throughput_increase: predicted.throughput_per_hour - current.throughput_per_hour,
            on_time_improvement: predicted.on_time_percentage - current.on_time_percentage,
            conflict_reduction,
            efficiency_gain: predicted.system_efficiency - current.system_efficiency,
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.delay_reduction_minutes == 0.0
            && self.throughput_increase == 0.0
            && self.on_time_improvement == 0.0
            && self.conflict_reduction == 0
            && self.efficiency_gain == 0.0
    }
}
