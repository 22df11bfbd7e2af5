//! Credential Exchange.
//!
//! Turns `(meeting or appointment id, user id, role)` into a short-lived
//! [`SessionCredential`] with one call to the exchange endpoint. The exchange
//! never retries; a new attempt is always a new user-initiated start.
//!
//! Accepted response shapes:
//!
//! ```text
//! { "token": "...", "roomName": "..." }            (also "roomId")
//! { "result": { "token": "...", "roomName": "..." } }
//! { "token": { "token": "..." }, "roomName": "..." }
//! ```
//!
//! Anything else, or an empty token/room, is `InvalidCredentialResponse`.

mod http;

pub use http::HttpCredentialExchange;

use crate::errors::SessionError;
use async_trait::async_trait;
use common::secret::SecretString;
use common::types::Role;
use serde::Deserialize;

/// Short-lived proof of authorization to join one media room.
///
/// Immutable once issued. Never persisted; dropped on disconnect or error.
#[derive(Debug)]
pub struct SessionCredential {
    token: SecretString,
    room_id: String,
    issued_for_user_id: String,
    issued_for_role: Role,
}

impl SessionCredential {
    /// Build a credential, rejecting empty token or room id.
    pub fn new(
        token: SecretString,
        room_id: impl Into<String>,
        issued_for_user_id: impl Into<String>,
        issued_for_role: Role,
    ) -> Result<Self, SessionError> {
        use common::secret::ExposeSecret;

        let room_id = room_id.into();
        if token.expose_secret().trim().is_empty() {
            return Err(SessionError::InvalidCredentialResponse(
                "token is empty".to_string(),
            ));
        }
        if room_id.trim().is_empty() {
            return Err(SessionError::InvalidCredentialResponse(
                "room id is empty".to_string(),
            ));
        }

        Ok(Self {
            token,
            room_id,
            issued_for_user_id: issued_for_user_id.into(),
            issued_for_role,
        })
    }

    /// Opaque room token. Only the provider adapter should expose it.
    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Room identifier.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// User the credential was issued for.
    #[must_use]
    pub fn issued_for_user_id(&self) -> &str {
        &self.issued_for_user_id
    }

    /// Role the credential was issued for.
    #[must_use]
    pub fn issued_for_role(&self) -> Role {
        self.issued_for_role
    }
}

/// Validated exchange input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    /// Meeting id or appointment id, depending on the exchange style.
    pub meeting_or_appointment_id: String,
    /// Requesting user.
    pub user_id: String,
    /// Requesting role.
    pub role: Role,
}

impl CredentialRequest {
    /// Validate and build a request. Ids are trimmed and must be non-empty.
    pub fn new(
        meeting_or_appointment_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<Self, SessionError> {
        let meeting_or_appointment_id = meeting_or_appointment_id.trim();
        let user_id = user_id.trim();

        if meeting_or_appointment_id.is_empty() {
            return Err(SessionError::InvalidRequest(
                "Meeting or appointment ID required".to_string(),
            ));
        }
        if user_id.is_empty() {
            return Err(SessionError::InvalidRequest("User ID required".to_string()));
        }

        Ok(Self {
            meeting_or_appointment_id: meeting_or_appointment_id.to_string(),
            user_id: user_id.to_string(),
            role,
        })
    }

    /// Build a request from a role string, rejecting unrecognized roles.
    pub fn parse(
        meeting_or_appointment_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<Self, SessionError> {
        let role = role
            .parse::<Role>()
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;
        Self::new(meeting_or_appointment_id, user_id, role)
    }
}

/// Exchanges a validated request for a session credential.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    /// Perform exactly one exchange call.
    async fn exchange(&self, request: &CredentialRequest)
        -> Result<SessionCredential, SessionError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenField {
    Plain(String),
    Nested { token: String },
}

#[derive(Deserialize)]
struct CredentialPayload {
    #[serde(default)]
    token: Option<TokenField>,
    #[serde(default, rename = "roomName")]
    room_name: Option<String>,
    #[serde(default, rename = "roomId", alias = "room")]
    room_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialEnvelope {
    Wrapped { result: CredentialPayload },
    Flat(CredentialPayload),
}

/// Parse an exchange response body into a credential for `request`.
pub fn parse_credential_response(
    body: &[u8],
    request: &CredentialRequest,
) -> Result<SessionCredential, SessionError> {
    let envelope: CredentialEnvelope = serde_json::from_slice(body)
        .map_err(|e| SessionError::InvalidCredentialResponse(format!("unrecognized response shape: {e}")))?;

    let payload = match envelope {
        CredentialEnvelope::Wrapped { result } => result,
        CredentialEnvelope::Flat(payload) => payload,
    };

    let token = match payload.token {
        Some(TokenField::Plain(token) | TokenField::Nested { token }) => token,
        None => {
            return Err(SessionError::InvalidCredentialResponse(
                "token missing".to_string(),
            ))
        }
    };
    let room_id = payload.room_name.or(payload.room_id).ok_or_else(|| {
        SessionError::InvalidCredentialResponse("room id missing".to_string())
    })?;

    SessionCredential::new(
        SecretString::from(token),
        room_id,
        request.user_id.clone(),
        request.role,
    )
}
