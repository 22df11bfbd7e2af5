//! Observability for the consultation client.
//!
//! # Privacy by Default
//!
//! Async entry points use `#[instrument(skip_all)]` with explicit safe fields
//! (room id, role, session id). Tokens are never logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `consult_session_starts_total` | Counter | `outcome` | Start attempts by result |
//! | `consult_room_connect_duration_seconds` | Histogram | none | Provider connect latency |
//! | `consult_room_events_total` | Counter | `event` | Provider events handled |
//! | `consult_remote_participants` | Gauge | none | Participants in the registry |
//! | `consult_teardown_step_failures_total` | Counter | `step` | Swallowed cleanup failures |
//! | `consult_errors_total` | Counter | `error_type` | Surfaced session errors |
//!
//! The host application installs the recorder.

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured filter.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}
