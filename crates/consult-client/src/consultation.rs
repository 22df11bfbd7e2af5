//! Consultation lifecycle hooks.
//!
//! The backend wants to know when a doctor opens a consultation and when a
//! participant leaves it. Start is mandatory for doctors (its failure aborts
//! the start sequence); end is best-effort.

use crate::errors::SessionError;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Backend notifications around a consultation.
#[async_trait]
pub trait ConsultationHooks: Send + Sync {
    /// A doctor is starting the consultation.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StartCallFailed` if the backend refused or was unreachable.
    async fn call_started(
        &self,
        appointment_id: &str,
        doctor_user_id: &str,
    ) -> Result<(), SessionError>;

    /// A participant left an established consultation.
    async fn call_ended(&self, appointment_id: &str, user_id: &str) -> Result<(), SessionError>;
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl ConsultationHooks for NoopHooks {
    async fn call_started(&self, _: &str, _: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn call_ended(&self, _: &str, _: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Hooks posting `{appointmentId, doctorUserId}` to configured endpoints.
///
/// An unset endpoint makes the matching hook a no-op.
#[derive(Debug, Clone)]
pub struct HttpConsultationHooks {
    client: reqwest::Client,
    start_call_url: Option<String>,
    end_call_url: Option<String>,
}

impl HttpConsultationHooks {
    /// # Errors
    ///
    /// Returns `SessionError::Config` if the HTTP client cannot be built.
    pub fn new(
        start_call_url: Option<String>,
        end_call_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            start_call_url,
            end_call_url,
        })
    }

    async fn post(&self, url: &str, appointment_id: &str, user_id: &str) -> Result<(), String> {
        let response = self
            .client
            .post(url)
            .json(&json!({
                "appointmentId": appointment_id,
                "doctorUserId": user_id,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("Unexpected status: {}", response.status()))
        }
    }
}

#[async_trait]
impl ConsultationHooks for HttpConsultationHooks {
    #[instrument(skip_all)]
    async fn call_started(
        &self,
        appointment_id: &str,
        doctor_user_id: &str,
    ) -> Result<(), SessionError> {
        let Some(url) = self.start_call_url.as_deref() else {
            return Ok(());
        };

        self.post(url, appointment_id, doctor_user_id)
            .await
            .map_err(|e| {
                warn!(target: "consult.hooks", error = %e, "Start-call hook failed");
                SessionError::StartCallFailed(e)
            })?;

        debug!(target: "consult.hooks", "Start-call hook notified");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn call_ended(&self, appointment_id: &str, user_id: &str) -> Result<(), SessionError> {
        let Some(url) = self.end_call_url.as_deref() else {
            return Ok(());
        };

        self.post(url, appointment_id, user_id).await.map_err(|e| {
            warn!(target: "consult.hooks", error = %e, "End-call hook failed");
            SessionError::Internal(e)
        })?;

        debug!(target: "consult.hooks", "End-call hook notified");
        Ok(())
    }
}
