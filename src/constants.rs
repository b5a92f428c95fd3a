use chrono::NaiveDate;

/// Base date used by fixtures and benchmarks
pub const BASE_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2024, 1, 1) {
    Some(date) => date,
    None => panic!("Invalid base date"),
};

/// Lowest and highest train priority accepted from telemetry
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// Plausible speed range for a moving train, in km/h
pub const MIN_MOVING_SPEED_KMH: f64 = 1.0;
pub const MAX_SPEED_KMH: f64 = 500.0;

/// Longest segment a topology may contain
pub const MAX_SEGMENT_LENGTH_KM: f64 = 10_000.0;

/// Longest duration a setting may hold (one week)
pub const MAX_SETTING_MINUTES: i64 = 7 * 24 * 60;

/// Controller id used for actions the core records on its own (expiry)
pub const SYSTEM_CONTROLLER: &str = "system";

/// Rolling window used for throughput (trains per hour)
pub const THROUGHPUT_WINDOW_MINUTES: i64 = 60;

/// Severity composition: weight of the priority delta vs. time-to-overlap
pub const SEVERITY_PRIORITY_WEIGHT: f64 = 0.4;
pub const SEVERITY_URGENCY_WEIGHT: f64 = 0.6;

/// Share of the higher-priority trains' delay surplus credited to a remedy
pub const DELAY_DIFFERENTIAL_WEIGHT: f64 = 0.5;

/// System efficiency weights (sum to 1.0)
pub const EFFICIENCY_ON_TIME_WEIGHT: f64 = 0.35;
pub const EFFICIENCY_DELAY_WEIGHT: f64 = 0.25;
pub const EFFICIENCY_THROUGHPUT_WEIGHT: f64 = 0.20;
pub const EFFICIENCY_RESOLUTION_WEIGHT: f64 = 0.20;

/// Average delay at which the delay term of the efficiency score reaches zero
pub const EFFICIENCY_DELAY_CEILING_MINUTES: f64 = 15.0;
