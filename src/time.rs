use chrono::{Duration, NaiveDateTime};

/// Signed number of minutes from `from` to `to`, with sub-second precision
#[must_use]
pub fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    let delta = to.signed_duration_since(from);

    // Split seconds and milliseconds to avoid converting large i64 values to f64
    let total_seconds = delta.num_seconds();
    let milliseconds = delta.num_milliseconds() % 1000;

    #[allow(clippy::cast_precision_loss)]
    let seconds_f64 = total_seconds as f64;
    #[allow(clippy::cast_precision_loss)]
    let millis_f64 = milliseconds as f64;

    seconds_f64 / 60.0 + millis_f64 / 60_000.0
}

/// Convert fractional minutes into a `Duration`, rounded to the millisecond
#[must_use]
pub fn minutes(value: f64) -> Duration {
    if !value.is_finite() {
        return Duration::zero();
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = (value * 60_000.0).round() as i64;
    // Saturated casts may land on i64::MIN, one past the shortest Duration
    Duration::milliseconds(millis.max(-i64::MAX))
}

/// Fractional minutes in a `Duration`
#[must_use]
pub fn duration_minutes(duration: Duration) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let millis = duration.num_milliseconds() as f64;
    millis / 60_000.0
}

/// Travel time over `length_km` at `speed_kmh`
#[must_use]
pub fn travel_time(length_km: f64, speed_kmh: f64) -> Duration {
    if speed_kmh <= 0.0 {
        return Duration::zero();
    }
    minutes(length_km / speed_kmh * 60.0)
}

/// Format a clock time as HH:MM for recommendation text
#[must_use]
pub fn format_clock(time: NaiveDateTime) -> String {
    time.format("%H:%M").to_string()
}

/// Round to one decimal place
#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BASE_DATE;

    #[test]
    fn test_minutes_between_forward() {
        let a = BASE_DATE.and_hms_opt(8, 0, 0).expect("valid time");
        let b = BASE_DATE.and_hms_opt(8, 7, 30).expect("valid time");
        assert_eq!(minutes_between(a, b), 7.5);
    }

    #[test]
    fn test_minutes_between_backward_is_negative() {
        let a = BASE_DATE.and_hms_opt(8, 10, 0).expect("valid time");
        let b = BASE_DATE.and_hms_opt(8, 0, 0).expect("valid time");
        assert_eq!(minutes_between(a, b), -10.0);
    }

    #[test]
    fn test_minutes_round_trip() {
        assert_eq!(duration_minutes(minutes(2.5)), 2.5);
        assert_eq!(minutes(f64::NAN), Duration::zero());
    }

    #[test]
    fn test_travel_time() {
        assert_eq!(travel_time(5.0, 60.0), Duration::minutes(5));
        assert_eq!(travel_time(10.0, 0.0), Duration::zero());
    }

    #[test]
    fn test_format_clock() {
        let t = BASE_DATE.and_hms_opt(14, 5, 59).expect("valid time");
        assert_eq!(format_clock(t), "14:05");
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(8.333), 8.3);
        assert_eq!(round1(2.25), 2.3);
    }
}
