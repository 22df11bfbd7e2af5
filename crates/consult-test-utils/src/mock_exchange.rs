//! Scripted credential exchange.

use crate::gate::Gate;
use crate::journal::{Call, CallJournal};
use async_trait::async_trait;
use common::secret::SecretString;
use consult_client::credential::{CredentialExchange, CredentialRequest, SessionCredential};
use consult_client::errors::SessionError;

#[derive(Debug, Clone)]
enum Script {
    Issue { token: String, room_id: String },
    Fail(SessionError),
}

/// Credential exchange returning a fixed credential or error.
#[derive(Debug, Clone)]
pub struct MockExchange {
    script: Script,
    gate: Option<Gate>,
    journal: CallJournal,
}

impl MockExchange {
    /// Issue `{token, room_id}` for every request.
    #[must_use]
    pub fn returning(token: &str, room_id: &str) -> Self {
        Self {
            script: Script::Issue {
                token: token.to_string(),
                room_id: room_id.to_string(),
            },
            gate: None,
            journal: CallJournal::new(),
        }
    }

    /// Fail every request with `error`.
    #[must_use]
    pub fn failing(error: SessionError) -> Self {
        Self {
            script: Script::Fail(error),
            gate: None,
            journal: CallJournal::new(),
        }
    }

    /// Suspend inside `exchange` until the gate opens.
    #[must_use]
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Number of exchange calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.journal.count(|c| matches!(c, Call::Exchange { .. }))
    }
}

#[async_trait]
impl CredentialExchange for MockExchange {
    async fn exchange(&self, request: &CredentialRequest) -> Result<SessionCredential, SessionError> {
        self.journal.record(Call::Exchange {
            id: request.meeting_or_appointment_id.clone(),
            user_id: request.user_id.clone(),
            role: request.role,
        });

        if let Some(gate) = &self.gate {
            gate.pass().await;
        }

        match &self.script {
            Script::Issue { token, room_id } => SessionCredential::new(
                SecretString::from(token.clone()),
                room_id.clone(),
                request.user_id.clone(),
                request.role,
            ),
            Script::Fail(error) => Err(error.clone()),
        }
    }
}
