//! Recording consultation hooks.

use crate::journal::{Call, CallJournal};
use async_trait::async_trait;
use consult_client::consultation::ConsultationHooks;
use consult_client::errors::SessionError;

/// Hooks that record every call and optionally fail.
#[derive(Debug, Clone, Default)]
pub struct MockHooks {
    fail_start: bool,
    fail_end: bool,
    journal: CallJournal,
}

impl MockHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `call_started` fail with `StartCallFailed`.
    #[must_use]
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Make `call_ended` fail.
    #[must_use]
    pub fn failing_end(mut self) -> Self {
        self.fail_end = true;
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = journal;
        self
    }

    #[must_use]
    pub fn started_count(&self) -> usize {
        self.journal.count(|c| matches!(c, Call::StartCallHook { .. }))
    }

    #[must_use]
    pub fn ended_count(&self) -> usize {
        self.journal.count(|c| matches!(c, Call::EndCallHook { .. }))
    }
}

#[async_trait]
impl ConsultationHooks for MockHooks {
    async fn call_started(&self, appointment_id: &str, doctor_user_id: &str) -> Result<(), SessionError> {
        self.journal.record(Call::StartCallHook {
            appointment_id: appointment_id.to_string(),
            user_id: doctor_user_id.to_string(),
        });
        if self.fail_start {
            return Err(SessionError::StartCallFailed("Unexpected status: 409".to_string()));
        }
        Ok(())
    }

    async fn call_ended(&self, appointment_id: &str, user_id: &str) -> Result<(), SessionError> {
        self.journal.record(Call::EndCallHook {
            appointment_id: appointment_id.to_string(),
            user_id: user_id.to_string(),
        });
        if self.fail_end {
            return Err(SessionError::Internal("Unexpected status: 500".to_string()));
        }
        Ok(())
    }
}
