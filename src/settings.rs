use crate::constants::{MAX_SETTING_MINUTES, MAX_SPEED_KMH, MIN_MOVING_SPEED_KMH};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid setting `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Severity thresholds (0-100) mapping a conflict to a recommendation priority class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            critical: 80.0,
            high: 60.0,
            medium: 35.0,
        }
    }
}

/// Tunables for detection, recommendation, KPIs and simulation.
///
/// Durations are stored as whole minutes in JSON. Every field has a default,
/// so a settings file only needs to list what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// How far ahead of the snapshot time occupancies are considered
    #[serde(with = "minutes_serde")]
    pub detection_horizon: Duration,
    /// Time a passing train blocks a junction (or an intermediate stop)
    #[serde(with = "minutes_serde")]
    pub junction_clearance: Duration,
    /// Time a train occupies its destination station or platform
    #[serde(with = "minutes_serde")]
    pub station_dwell: Duration,
    /// Extra time added after the contending trains clear
    #[serde(with = "minutes_serde")]
    pub hold_margin: Duration,
    /// Minimum time between two trains on one track, drives hourly capacity
    #[serde(with = "minutes_serde")]
    pub headway: Duration,
    /// Distance from a station/platform within which a train can still be held there
    pub hold_point_radius_km: f64,
    /// Lowest speed a speed adjustment may ask for
    pub min_adjusted_speed_kmh: f64,
    /// A train counts as on time when its delay is at most this many minutes
    pub on_time_threshold_minutes: f64,
    pub severity_bands: SeverityBands,
    /// Nominal section throughput used for the efficiency score
    pub section_capacity_per_hour: f64,
    /// Detector/generator rounds per tick before residual conflicts are reported
    pub max_fixed_point_rounds: usize,
    /// Pending recommendations older than this expire
    #[serde(with = "minutes_serde")]
    pub recommendation_ttl: Duration,
    #[serde(with = "minutes_serde")]
    pub simulation_step: Duration,
    pub max_simulation_horizon_minutes: u32,
    /// Cost of an unplanned stop when a conflict is left to resolve itself
    #[serde(with = "minutes_serde")]
    pub unplanned_stop_penalty: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            detection_horizon: Duration::minutes(30),
            junction_clearance: Duration::minutes(2),
            station_dwell: Duration::minutes(3),
            hold_margin: Duration::minutes(1),
            headway: Duration::minutes(5),
            hold_point_radius_km: 2.0,
            min_adjusted_speed_kmh: 20.0,
            on_time_threshold_minutes: 0.0,
            severity_bands: SeverityBands::default(),
            section_capacity_per_hour: 30.0,
            max_fixed_point_rounds: 8,
            recommendation_ttl: Duration::minutes(15),
            simulation_step: Duration::minutes(1),
            max_simulation_horizon_minutes: 120,
            unplanned_stop_penalty: Duration::minutes(3),
        }
    }
}

impl DispatchSettings {
    /// Parse settings from JSON, filling missing fields with defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the settings are invalid
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns the first field whose value is out of range
    pub fn validate(&self) -> Result<(), SettingsError> {
        let longest = Duration::minutes(MAX_SETTING_MINUTES);
        let positive = [
            ("detection_horizon", self.detection_horizon),
            ("junction_clearance", self.junction_clearance),
            ("station_dwell", self.station_dwell),
            ("headway", self.headway),
            ("recommendation_ttl", self.recommendation_ttl),
            ("simulation_step", self.simulation_step),
        ];
        for (field, value) in positive {
            if value <= Duration::zero() {
                return Err(SettingsError::Invalid {
                    field,
                    message: "must be at least one minute".to_string(),
                });
            }
        }
        let margins = [
            ("hold_margin", self.hold_margin),
            ("unplanned_stop_penalty", self.unplanned_stop_penalty),
        ];
        for (field, value) in margins {
            if value < Duration::zero() {
                return Err(SettingsError::Invalid {
                    field,
                    message: "margins cannot be negative".to_string(),
                });
            }
        }
        for (field, value) in positive.into_iter().chain(margins) {
            if value > longest {
                return Err(SettingsError::Invalid {
                    field,
                    message: format!("must be at most {MAX_SETTING_MINUTES} minutes"),
                });
            }
        }
        if i64::from(self.max_simulation_horizon_minutes) > MAX_SETTING_MINUTES {
            return Err(SettingsError::Invalid {
                field: "max_simulation_horizon_minutes",
                message: format!("must be at most {MAX_SETTING_MINUTES} minutes"),
            });
        }
        if !(MIN_MOVING_SPEED_KMH..=MAX_SPEED_KMH).contains(&self.min_adjusted_speed_kmh) {
            return Err(SettingsError::Invalid {
                field: "min_adjusted_speed_kmh",
                message: format!("must be between {MIN_MOVING_SPEED_KMH} and {MAX_SPEED_KMH} km/h"),
            });
        }
        if !(self.hold_point_radius_km.is_finite() && self.hold_point_radius_km >= 0.0) {
            return Err(SettingsError::Invalid {
                field: "hold_point_radius_km",
                message: "must be a non-negative distance".to_string(),
            });
        }
        if !(self.section_capacity_per_hour.is_finite() && self.section_capacity_per_hour > 0.0) {
            return Err(SettingsError::Invalid {
                field: "section_capacity_per_hour",
                message: "must be positive".to_string(),
            });
        }
        let bands = self.severity_bands;
        if !(bands.medium <= bands.high && bands.high <= bands.critical) {
            return Err(SettingsError::Invalid {
                field: "severity_bands",
                message: "expected medium <= high <= critical".to_string(),
            });
        }
        if self.max_fixed_point_rounds == 0 {
            return Err(SettingsError::Invalid {
                field: "max_fixed_point_rounds",
                message: "at least one round is required".to_string(),
            });
        }
        if self.max_simulation_horizon_minutes == 0 {
            return Err(SettingsError::Invalid {
                field: "max_simulation_horizon_minutes",
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

mod minutes_serde {
    use chrono::Duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_minutes())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let minutes = i64::deserialize(deserializer)?;
        Duration::try_minutes(minutes).ok_or_else(|| D::Error::custom(format!("{minutes} minutes is out of range")))
    }
}
