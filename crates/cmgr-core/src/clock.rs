//! Monotonic-enough wall-clock helpers for the reconciler's grace-period checks.

use chrono::{DateTime, Utc};

/// True iff `now - initial >= grace_secs`. The comparison is strictly `>=`:
/// a grace period that has just elapsed counts as up.
pub fn time_is_up(initial: DateTime<Utc>, now: DateTime<Utc>, grace_secs: i64) -> bool {
    now.signed_duration_since(initial) >= chrono::Duration::seconds(grace_secs)
}
