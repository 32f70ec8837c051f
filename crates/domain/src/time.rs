//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for `last_changed`, trigger observations, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether at least `seconds` have passed between `since` and `now`.
///
/// A `since` in the future (clock skew) never counts as elapsed.
#[must_use]
pub fn elapsed_at_least(since: Timestamp, now: Timestamp, seconds: u64) -> bool {
    (now - since)
        .to_std()
        .is_ok_and(|elapsed| elapsed >= std::time::Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_report_elapsed_when_exactly_on_boundary() {
        let since = now();
        let later = since + TimeDelta::seconds(5);
        assert!(elapsed_at_least(since, later, 5));
        assert!(!elapsed_at_least(since, later, 6));
    }

    #[test]
    fn should_not_report_elapsed_when_since_is_in_the_future() {
        let now = now();
        let since = now + TimeDelta::seconds(3);
        assert!(!elapsed_at_least(since, now, 0));
    }
}
