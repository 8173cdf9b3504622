//! Utility functions for identity generation and timestamp handling.

pub mod timestamps;
mod uuid_utils;

pub use timestamps::{import_date_stamp, now_utc, Timestamp};
pub use uuid_utils::{generate_uuid, IdRemapper};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_valid() {
        let id = generate_uuid();
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn test_import_date_stamp_format() {
        let stamp = import_date_stamp(now_utc());
        assert_eq!(stamp.len(), 10);
        assert_eq!(stamp.matches('-').count(), 2);
    }
}
