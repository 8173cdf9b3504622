//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Timestamp type used on every persisted record.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats the date part used when suffixing imported template names.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use contestflow::utils::import_date_stamp;
///
/// let ts = Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap();
/// assert_eq!(import_date_stamp(ts), "2024-08-01");
/// ```
#[must_use]
pub fn import_date_stamp(ts: Timestamp) -> String {
    ts.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_utc_is_monotonic_enough() {
        let a = now_utc();
        let b = now_utc();
        assert!(b >= a);
    }

    #[test]
    fn test_import_date_stamp_pads_fields() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 9, 0, 0, 0).unwrap();
        assert_eq!(import_date_stamp(ts), "2025-01-09");
    }
}
