//! HTTP credential exchange against the consultation backend.

use super::{parse_credential_response, CredentialExchange, CredentialRequest, SessionCredential};
use crate::config::ExchangeStyle;
use crate::errors::SessionError;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Default connection timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Credential exchange over HTTP.
///
/// Timeouts are the HTTP layer's; a timeout surfaces as `ExchangeUnavailable`.
#[derive(Debug, Clone)]
pub struct HttpCredentialExchange {
    client: reqwest::Client,
    url: String,
    style: ExchangeStyle,
}

impl HttpCredentialExchange {
    /// Build an exchange client for `url`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` if the HTTP client cannot be built.
    pub fn new(url: String, style: ExchangeStyle, timeout: Duration) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, url, style })
    }

    fn build_request(&self, request: &CredentialRequest) -> reqwest::RequestBuilder {
        match self.style {
            ExchangeStyle::Appointment => self.client.post(&self.url).json(&json!({
                "appointmentId": request.meeting_or_appointment_id,
                "userId": request.user_id,
                "role": request.role,
            })),
            ExchangeStyle::Meeting => self
                .client
                .post(&self.url)
                .bearer_auth(format!("{}|{}", request.user_id, request.role))
                .json(&json!({ "meetingId": request.meeting_or_appointment_id })),
        }
    }
}

#[async_trait]
impl CredentialExchange for HttpCredentialExchange {
    #[instrument(skip_all, fields(role = %request.role))]
    async fn exchange(
        &self,
        request: &CredentialRequest,
    ) -> Result<SessionCredential, SessionError> {
        debug!(
            target: "consult.credential",
            url = %self.url,
            style = ?self.style,
            "Requesting session credential"
        );

        let response = self.build_request(request).send().await.map_err(|e| {
            warn!(target: "consult.credential", error = %e, "Credential request failed");
            SessionError::ExchangeUnavailable(e.to_string())
        })?;

        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await.map_err(|e| {
                warn!(target: "consult.credential", error = %e, "Failed to read credential response");
                SessionError::ExchangeUnavailable(e.to_string())
            })?;

            let credential = parse_credential_response(&body, request).map_err(|e| {
                warn!(target: "consult.credential", error = %e, "Credential response rejected");
                e
            })?;

            debug!(
                target: "consult.credential",
                room_id = %credential.room_id(),
                "Session credential acquired"
            );
            Ok(credential)
        } else if status.is_client_error() {
            // Body may echo request details; keep it at trace level.
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "consult.credential",
                status = %status,
                "Credential exchange rejected"
            );
            trace!(target: "consult.credential", body = %body, "Rejection body");
            Err(SessionError::ExchangeRejected(format!("Status {status}")))
        } else {
            warn!(
                target: "consult.credential",
                status = %status,
                "Credential endpoint returned an error"
            );
            Err(SessionError::ExchangeUnavailable(format!(
                "Unexpected status: {status}"
            )))
        }
    }
}
