//! Consultation session error types.
//!
//! `SessionError` is the single error type crossing the Session Controller
//! boundary. Collaborator errors (`DeviceError`, `ProviderError`, ...) are
//! defined next to their seams and converted here. Internal details are logged
//! but never put into the user-visible message.

use thiserror::Error;

/// Consultation session error type.
///
/// Variants map to the user-visible behavior of the Session Controller:
/// - Exchange and device failures abort a start before any room connection.
/// - `RoomClosedByRemote` and `Cancelled` are notices, not failures.
/// - Everything raised after `Connected` has already run the full teardown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Start inputs were empty or unrecognized.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Exchange endpoint answered with a payload missing token or room id.
    #[error("Invalid credential response: {0}")]
    InvalidCredentialResponse(String),

    /// Exchange endpoint unreachable (transport error, timeout, 5xx).
    #[error("Credential exchange unavailable: {0}")]
    ExchangeUnavailable(String),

    /// Exchange endpoint refused the request (4xx).
    #[error("Credential exchange rejected: {0}")]
    ExchangeRejected(String),

    /// Doctor start-call hook failed.
    #[error("Start call failed: {0}")]
    StartCallFailed(String),

    /// Platform denied camera/microphone permission.
    #[error("Device access denied: {0}")]
    DeviceAccessDenied(String),

    /// No capture device matches the constraints.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Provider could not establish the room connection.
    #[error("Room connect failed: {0}")]
    RoomConnectFailed(String),

    /// Provider closed the room (remote hangup, network drop).
    #[error("Room closed by remote: {0}")]
    RoomClosedByRemote(String),

    /// A start is already in flight or a session is already open.
    #[error("Session already in progress")]
    SessionAlreadyInProgress,

    /// Provider raised an error outside any request.
    #[error("Unexpected provider error: {0}")]
    UnexpectedProviderError(String),

    /// Start was abandoned because leave or unmount arrived while it was suspended.
    #[error("Session start cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Controller mailbox failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Bounded label for metrics and log fields.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            SessionError::InvalidRequest(_) => "invalid_request",
            SessionError::InvalidCredentialResponse(_) => "invalid_credential_response",
            SessionError::ExchangeUnavailable(_) => "exchange_unavailable",
            SessionError::ExchangeRejected(_) => "exchange_rejected",
            SessionError::StartCallFailed(_) => "start_call_failed",
            SessionError::DeviceAccessDenied(_) => "device_access_denied",
            SessionError::DeviceUnavailable(_) => "device_unavailable",
            SessionError::RoomConnectFailed(_) => "room_connect_failed",
            SessionError::RoomClosedByRemote(_) => "room_closed_by_remote",
            SessionError::SessionAlreadyInProgress => "session_already_in_progress",
            SessionError::UnexpectedProviderError(_) => "unexpected_provider_error",
            SessionError::Cancelled => "cancelled",
            SessionError::Config(_) => "config",
            SessionError::Internal(_) => "internal",
        }
    }

    /// Whether this is a non-fatal notice rather than a failure the user must act on.
    #[must_use]
    pub const fn is_notice(&self) -> bool {
        matches!(
            self,
            SessionError::RoomClosedByRemote(_) | SessionError::Cancelled
        )
    }

    /// Returns a user-safe message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::InvalidRequest(msg) => msg.clone(),
            SessionError::InvalidCredentialResponse(_) => {
                "Invalid token response from the server".to_string()
            }
            SessionError::ExchangeUnavailable(_) => {
                "Could not reach the consultation service, please try again".to_string()
            }
            SessionError::ExchangeRejected(_) => {
                "The consultation service refused to issue a session".to_string()
            }
            SessionError::StartCallFailed(_) => "Failed to start the consultation".to_string(),
            SessionError::DeviceAccessDenied(_) => {
                "Failed to access camera/microphone. Check permissions.".to_string()
            }
            SessionError::DeviceUnavailable(_) => "No camera or microphone was found".to_string(),
            SessionError::RoomConnectFailed(_) => "Unable to join the room".to_string(),
            SessionError::RoomClosedByRemote(reason) => {
                format!("The consultation was ended: {reason}")
            }
            SessionError::SessionAlreadyInProgress => {
                "A consultation is already in progress".to_string()
            }
            SessionError::UnexpectedProviderError(_) => {
                "The call was interrupted unexpectedly".to_string()
            }
            SessionError::Cancelled => "Joining was cancelled".to_string(),
            SessionError::Config(_) | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}
