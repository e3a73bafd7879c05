// Helpers shared by the signal extractors

use chrono::{DateTime, Utc};

/// Whole days elapsed since `created_at`. Timestamps in the future count as age 0.
pub fn age_in_days(created_at: DateTime<Utc>, reference_time: DateTime<Utc>) -> i64 {
    (reference_time - created_at).num_days().max(0)
}

/// Whole hours elapsed since `created_at`. Timestamps in the future count as age 0.
pub fn age_in_hours(created_at: DateTime<Utc>, reference_time: DateTime<Utc>) -> i64 {
    (reference_time - created_at).num_hours().max(0)
}

/// ln(count + 1): zero for an unseen item, compressed for the long tail.
pub fn log_count(count: u64) -> f64 {
    (count as f64).ln_1p()
}

/// Case-insensitive equality over full Unicode lowercase mappings.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_age_truncates_to_whole_units() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(age_in_days(now - Duration::hours(47), now), 1);
        assert_eq!(age_in_hours(now - Duration::minutes(119), now), 1);
    }

    #[test]
    fn test_future_timestamps_clamp_to_zero() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(age_in_days(now + Duration::days(3), now), 0);
        assert_eq!(age_in_hours(now + Duration::hours(3), now), 0);
    }

    #[test]
    fn test_log_count() {
        assert_eq!(log_count(0), 0.0);
        assert!((log_count(1000) - 1001f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_eq_ignore_case_is_unicode_aware() {
        assert!(eq_ignore_case("Work", "work"));
        assert!(eq_ignore_case("ÉNERGIQUE", "énergique"));
        assert!(eq_ignore_case("ΣΠΟΡ", "σπορ"));
        assert!(!eq_ignore_case("calm", "calmer"));
    }
}
