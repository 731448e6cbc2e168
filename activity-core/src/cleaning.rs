use crate::event::{ActivityEvent, INVALID_SESSION, UNKNOWN_PLATFORM};

/// Removes structurally invalid events.
///
/// An event survives iff `user_id` is present, `session_id` is present and not
/// `invalid_session`, and `platform` is present and not `Unknown`.
///
/// Only the csv path and the live feed are cleaned. Partitioned datasets are
/// written by the converter, which already dropped these rows.
#[derive(Default, Clone, Copy, Debug)]
pub struct CleaningFilter;

impl CleaningFilter {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    pub fn is_valid(&self, event: &ActivityEvent) -> bool {
        event.user_id.is_some()
            && event
                .session_id
                .as_deref()
                .is_some_and(|s| s != INVALID_SESSION)
            && event
                .platform
                .as_deref()
                .is_some_and(|p| p != UNKNOWN_PLATFORM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(user_id: Option<&str>, session_id: Option<&str>, platform: Option<&str>) -> ActivityEvent {
        ActivityEvent {
            user_id: user_id.map(|s| s.to_string()),
            session_id: session_id.map(|s| s.to_string()),
            platform: platform.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_event() {
        let filter = CleaningFilter::new();

        assert!(filter.is_valid(&event(Some("u1"), Some("s1"), Some("iOS"))));
        assert!(filter.is_valid(&event(Some("u1"), Some("s1"), Some("Web"))));
    }

    #[test]
    fn test_invalid_events() {
        let filter = CleaningFilter::new();

        assert!(!filter.is_valid(&event(None, Some("s1"), Some("iOS"))));
        assert!(!filter.is_valid(&event(Some("u1"), None, Some("iOS"))));
        assert!(!filter.is_valid(&event(Some("u1"), Some("invalid_session"), Some("iOS"))));
        assert!(!filter.is_valid(&event(Some("u1"), Some("s1"), None)));
        assert!(!filter.is_valid(&event(Some("u1"), Some("s1"), Some("Unknown"))));
    }

    #[test]
    fn test_sentinels_are_case_sensitive() {
        let filter = CleaningFilter::new();

        assert!(filter.is_valid(&event(Some("u1"), Some("INVALID_SESSION"), Some("iOS"))));
        assert!(filter.is_valid(&event(Some("u1"), Some("s1"), Some("unknown"))));
    }
}
