//! Client-side metrics.
//!
//! Uses the `metrics` facade; nothing is exported unless the embedding
//! application installs a recorder.

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const HISTORY_REQUESTS_TOTAL: &str = "ezchat_history_requests_total";
    pub const HISTORY_FAILURES_TOTAL: &str = "ezchat_history_failures_total";
    pub const TOKEN_REFRESHES_TOTAL: &str = "ezchat_token_refreshes_total";
    pub const LIVE_FRAMES_TOTAL: &str = "ezchat_live_frames_total";
    pub const LIVE_CONNECTIONS_ACTIVE: &str = "ezchat_live_connections_active";
}

/// Describe all client metrics to the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        names::HISTORY_REQUESTS_TOTAL,
        "Total number of history requests issued"
    );
    metrics::describe_counter!(
        names::HISTORY_FAILURES_TOTAL,
        "Total number of failed history attempts"
    );
    metrics::describe_counter!(
        names::TOKEN_REFRESHES_TOTAL,
        "Total number of credential refreshes"
    );
    metrics::describe_counter!(names::LIVE_FRAMES_TOTAL, "Total number of live frames");
    metrics::describe_gauge!(
        names::LIVE_CONNECTIONS_ACTIVE,
        "Current number of open live connections"
    );
}

/// Record a history request attempt.
pub fn record_history_request() {
    counter!(names::HISTORY_REQUESTS_TOTAL).increment(1);
}

/// Record a failed history attempt.
pub fn record_history_failure(kind: &'static str) {
    counter!(names::HISTORY_FAILURES_TOTAL, "kind" => kind).increment(1);
}

/// Record a credential refresh.
pub fn record_token_refresh() {
    counter!(names::TOKEN_REFRESHES_TOTAL).increment(1);
}

/// Record a live frame.
pub fn record_frame(direction: &'static str, kind: &'static str) {
    counter!(names::LIVE_FRAMES_TOTAL, "direction" => direction, "kind" => kind).increment(1);
}

/// Gauge guard that counts an open live connection until dropped.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording an open connection.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::LIVE_CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::LIVE_CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder() {
        // No recorder installed: all calls are no-ops
        describe_metrics();
        record_history_request();
        record_frame("inbound", "message");
        let _guard = ConnectionMetricsGuard::new();
    }
}
