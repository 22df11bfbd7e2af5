//! Metrics for the consultation client.
//!
//! Naming follows Prometheus conventions: `consult_` prefix, `_total` for
//! counters, `_seconds` for durations.
//!
//! # Cardinality
//!
//! - `outcome`: `connected`, `cancelled`, or a `SessionError::error_type` label
//! - `event`: bounded by `RoomEvent::label` (8 values)
//! - `step`: `detach`, `detach_preview`, `unpublish`, `provider_disconnect`, `stop_track`
//! - `error_type`: bounded by `SessionError::error_type` (14 values)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the result of a start sequence.
///
/// Metric: `consult_session_starts_total`
/// Labels: `outcome`
pub fn record_session_start(outcome: &str) {
    counter!("consult_session_starts_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record how long the provider took to establish the room.
///
/// Metric: `consult_room_connect_duration_seconds`
pub fn record_room_connect_duration(duration: Duration) {
    histogram!("consult_room_connect_duration_seconds").record(duration.as_secs_f64());
}

/// Record a handled provider event.
///
/// Metric: `consult_room_events_total`
/// Labels: `event`
pub fn record_room_event(event: &str) {
    counter!("consult_room_events_total", "event" => event.to_string()).increment(1);
}

/// Set the number of remote participants in the registry.
///
/// Metric: `consult_remote_participants`
pub fn set_remote_participants(count: usize) {
    // usize to f64 conversion is safe for realistic room sizes
    #[allow(clippy::cast_precision_loss)]
    gauge!("consult_remote_participants").set(count as f64);
}

/// Record a cleanup step that failed and was swallowed.
///
/// Metric: `consult_teardown_step_failures_total`
/// Labels: `step`
///
/// Non-zero values mean a device or surface may have leaked.
pub fn record_teardown_step_failure(step: &str) {
    counter!("consult_teardown_step_failures_total", "step" => step.to_string()).increment(1);
}

/// Record a surfaced session error.
///
/// Metric: `consult_errors_total`
/// Labels: `error_type`
pub fn record_error(error_type: &str) {
    counter!("consult_errors_total", "error_type" => error_type.to_string()).increment(1);
}
