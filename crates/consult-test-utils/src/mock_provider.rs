//! Media room provider with scripted participants and injectable events.
//!
//! ```rust,ignore
//! let provider = MockProvider::new()
//!     .with_participant(RemoteParticipant::new("doctor-1").with_subscribed("TR_v1", video))
//!     .with_local_identity("patient-7");
//!
//! // after the session connects
//! provider.emit(RoomEvent::ParticipantDisconnected { identity: "doctor-1".into() });
//! ```

use crate::gate::Gate;
use crate::journal::{Call, CallJournal};
use async_trait::async_trait;
use consult_client::credential::SessionCredential;
use consult_client::media::LocalTrack;
use consult_client::room::{
    ConnectOptions, MediaRoomProvider, ProviderError, RemoteParticipant, RoomConnection,
    RoomEvent, RoomLink,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct ProviderState {
    events: Option<mpsc::UnboundedSender<RoomEvent>>,
    published: Vec<LocalTrack>,
    options: Option<ConnectOptions>,
    connected: bool,
}

/// Scriptable media room provider.
#[derive(Debug, Clone)]
pub struct MockProvider {
    participants: Vec<RemoteParticipant>,
    local_identity: String,
    fail_connect: bool,
    fail_unpublish: bool,
    fail_disconnect: bool,
    gate: Option<Gate>,
    state: Arc<Mutex<ProviderState>>,
    journal: CallJournal,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// An empty room.
    #[must_use]
    pub fn new() -> Self {
        Self {
            participants: Vec::new(),
            local_identity: "local".to_string(),
            fail_connect: false,
            fail_unpublish: false,
            fail_disconnect: false,
            gate: None,
            state: Arc::new(Mutex::new(ProviderState::default())),
            journal: CallJournal::new(),
        }
    }

    /// Participant already present at connect time.
    #[must_use]
    pub fn with_participant(mut self, participant: RemoteParticipant) -> Self {
        self.participants.push(participant);
        self
    }

    /// Identity reported for the local participant.
    #[must_use]
    pub fn with_local_identity(mut self, identity: &str) -> Self {
        self.local_identity = identity.to_string();
        self
    }

    #[must_use]
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    #[must_use]
    pub fn failing_unpublish(mut self) -> Self {
        self.fail_unpublish = true;
        self
    }

    #[must_use]
    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    /// Suspend inside `connect` until the gate opens.
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

    /// Deliver an event on the live connection. Returns `false` if there is none.
    pub fn emit(&self, event: RoomEvent) -> bool {
        let state = self.state.lock().unwrap();
        match state.events.as_ref() {
            Some(events) => {
                debug!(event = event.label(), "Mock provider emitting event");
                events.send(event).is_ok()
            }
            None => false,
        }
    }

    /// Close the event stream without a `Disconnected` event.
    pub fn drop_event_stream(&self) {
        self.state.lock().unwrap().events = None;
    }

    /// Tracks published at the last connect.
    #[must_use]
    pub fn published(&self) -> Vec<LocalTrack> {
        self.state.lock().unwrap().published.clone()
    }

    /// Options passed to the last connect.
    #[must_use]
    pub fn last_options(&self) -> Option<ConnectOptions> {
        self.state.lock().unwrap().options.clone()
    }

    /// Whether a connection is established and not yet disconnected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.journal.count(|c| matches!(c, Call::Connect { .. }))
    }
}

#[async_trait]
impl MediaRoomProvider for MockProvider {
    async fn connect(
        &self,
        credential: &SessionCredential,
        local_tracks: &[LocalTrack],
        options: &ConnectOptions,
    ) -> Result<RoomLink, ProviderError> {
        self.journal.record(Call::Connect {
            room_id: credential.room_id().to_string(),
            published: local_tracks.len(),
        });

        if let Some(gate) = &self.gate {
            gate.pass().await;
        }

        if self.fail_connect {
            return Err(ProviderError::Connect("signaling timeout".to_string()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock().unwrap();
            state.events = Some(events_tx);
            state.published = local_tracks.to_vec();
            state.options = Some(options.clone());
            state.connected = true;
        }

        Ok(RoomLink {
            connection: Box::new(MockConnection {
                fail_unpublish: self.fail_unpublish,
                fail_disconnect: self.fail_disconnect,
                state: Arc::clone(&self.state),
                journal: self.journal.clone(),
            }),
            events: events_rx,
            local_identity: self.local_identity.clone(),
            participants: self.participants.clone(),
        })
    }
}

struct MockConnection {
    fail_unpublish: bool,
    fail_disconnect: bool,
    state: Arc<Mutex<ProviderState>>,
    journal: CallJournal,
}

#[async_trait]
impl RoomConnection for MockConnection {
    fn unpublish_local_tracks(&mut self) -> Result<(), ProviderError> {
        self.journal.record(Call::Unpublish);
        self.state.lock().unwrap().published.clear();
        if self.fail_unpublish {
            return Err(ProviderError::Unpublish("transport closed".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ProviderError> {
        self.journal.record(Call::ProviderDisconnect);
        {
            let mut state = self.state.lock().unwrap();
            state.connected = false;
            state.events = None;
        }
        if self.fail_disconnect {
            return Err(ProviderError::Disconnect("socket reset".to_string()));
        }
        Ok(())
    }
}
