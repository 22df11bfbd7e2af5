//! Consultation client configuration.
//!
//! Configuration is loaded from environment variables. Numeric and boolean
//! settings fall back to their defaults when unparsable; endpoint URLs and the
//! exchange style are validated.

use crate::controller::SessionOptions;
use crate::media::CaptureConstraints;
use crate::room::ConnectOptions;
use common::config::{ObservabilityConfig, DEFAULT_LOG_FILTER};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP timeout for the exchange and hook endpoints, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default requested capture width.
pub const DEFAULT_VIDEO_WIDTH: u32 = 640;

/// Default capacity of the session event broadcast channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// How the credential exchange request is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStyle {
    /// `POST {appointmentId, userId, role}`.
    Appointment,
    /// `POST {meetingId}` with `Authorization: Bearer <userId>|<role>`.
    Meeting,
}

impl FromStr for ExchangeStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "appointment" => Ok(ExchangeStyle::Appointment),
            "meeting" => Ok(ExchangeStyle::Meeting),
            other => Err(ConfigError::InvalidValue(format!(
                "CONSULT_EXCHANGE_STYLE must be 'appointment' or 'meeting', got '{other}'"
            ))),
        }
    }
}

/// Consultation client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential exchange endpoint.
    pub exchange_url: String,

    /// Request shape for the exchange endpoint (default: appointment).
    pub exchange_style: ExchangeStyle,

    /// Doctor start-call hook endpoint, if any.
    pub start_call_url: Option<String>,

    /// End-call hook endpoint, if any.
    pub end_call_url: Option<String>,

    /// HTTP timeout in seconds (default: 10).
    pub http_timeout_seconds: u64,

    /// Request a microphone track (default: true).
    pub capture_audio: bool,

    /// Request a camera track (default: true).
    pub capture_video: bool,

    /// Requested camera width (default: 640).
    pub video_width: u32,

    /// Ask the provider for dominant-speaker events (default: true).
    pub dominant_speaker: bool,

    /// Session event broadcast capacity (default: 64).
    pub event_buffer: usize,

    /// Logging setup for the binary.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let exchange_url = vars
            .get("CONSULT_EXCHANGE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("CONSULT_EXCHANGE_URL".to_string()))?
            .clone();
        validate_url("CONSULT_EXCHANGE_URL", &exchange_url)?;

        let exchange_style = match vars.get("CONSULT_EXCHANGE_STYLE") {
            Some(raw) => raw.parse()?,
            None => ExchangeStyle::Appointment,
        };

        let start_call_url = optional_url(vars, "CONSULT_START_CALL_URL")?;
        let end_call_url = optional_url(vars, "CONSULT_END_CALL_URL")?;

        let http_timeout_seconds = vars
            .get("CONSULT_HTTP_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECONDS);

        let capture_audio = parse_bool(vars, "CONSULT_CAPTURE_AUDIO", true);
        let capture_video = parse_bool(vars, "CONSULT_CAPTURE_VIDEO", true);

        let video_width = vars
            .get("CONSULT_VIDEO_WIDTH")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_VIDEO_WIDTH);

        let dominant_speaker = parse_bool(vars, "CONSULT_DOMINANT_SPEAKER", true);

        let event_buffer = vars
            .get("CONSULT_EVENT_BUFFER")
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_EVENT_BUFFER);

        let observability = ObservabilityConfig {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            json_logs: parse_bool(vars, "CONSULT_LOG_JSON", false),
        };

        Ok(Config {
            exchange_url,
            exchange_style,
            start_call_url,
            end_call_url,
            http_timeout_seconds,
            capture_audio,
            capture_video,
            video_width,
            dominant_speaker,
            event_buffer,
            observability,
        })
    }

    /// HTTP timeout as a `Duration`.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Capture and connect options for the Session Controller.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            constraints: CaptureConstraints {
                audio: self.capture_audio,
                video: self.capture_video,
                video_width: self.video_width,
            },
            connect: ConnectOptions {
                dominant_speaker: self.dominant_speaker,
            },
            event_buffer: self.event_buffer,
        }
    }
}

fn validate_url(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(format!(
            "{name} must be an http(s) URL"
        )))
    }
}

fn optional_url(vars: &HashMap<String, String>, name: &str) -> Result<Option<String>, ConfigError> {
    match vars.get(name).filter(|v| !v.trim().is_empty()) {
        Some(url) => {
            validate_url(name, url)?;
            Ok(Some(url.clone()))
        }
        None => Ok(None),
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str, default: bool) -> bool {
    vars.get(name)
        .and_then(|s| s.trim().to_ascii_lowercase().parse().ok())
        .unwrap_or(default)
}
