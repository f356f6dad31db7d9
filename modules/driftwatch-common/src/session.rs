use chrono::Local;

/// Generate a session identifier: compact local timestamp, `YYYYMMDD-HHMMSS`.
///
/// Monotonically non-decreasing under wall-clock assumptions. Used as the
/// history-table key, in report filenames, and in notifications.
pub fn new_session_id() -> String {
    Local::now().format("%Y%m%d-%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_compact_timestamp_shape() {
        let id = new_session_id();
        assert_eq!(id.len(), 15);
        assert_eq!(id.as_bytes()[8], b'-');
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-'));
    }
}
