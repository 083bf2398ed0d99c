use chrono::{DateTime, Utc};

/// Longest remaining time reported before the estimate is considered noise.
pub const MAX_ETA_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Remaining seconds, extrapolated linearly from the time spent so far.
///
/// `None` outside `0 < pct < 100`, and when the estimate is negative or
/// longer than [`MAX_ETA_SECONDS`].
pub fn estimate_eta(
    progress_percentage: f64,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<i64> {
    if progress_percentage <= 0.0 || progress_percentage >= 100.0 {
        return None;
    }

    let elapsed = (now - started_at).num_milliseconds() as f64 / 1000.0;
    let estimated_total = elapsed / (progress_percentage / 100.0);
    let remaining = estimated_total - elapsed;

    if remaining < 0.0 || remaining > MAX_ETA_SECONDS as f64 {
        return None;
    }
    Some(remaining as i64)
}
