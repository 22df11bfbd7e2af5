//! Room Session.
//!
//! The single source of truth for "are we in a call". Owns the provider
//! connection, the Participant Registry and the session credential; borrows
//! clones of the local tracks for publishing.
//!
//! ```text
//! Idle -> Connecting -> Connected -> Disconnecting -> Closed
//!             |             |
//!             +-> Failed <--+
//! ```
//!
//! Provider events are handled synchronously and in delivery order. Every
//! exit from `Connected` runs the same ordered teardown:
//!
//! 1. detach remote and local handles from their surfaces
//! 2. withdraw provider-side publications
//! 3. provider disconnect
//! 4. release the Local Media Controller's tracks
//! 5. clear the registry and drop the credential
//!
//! A failing step is logged and counted; later steps still run.

mod provider;

pub use provider::{
    ConnectOptions, MediaRoomProvider, ProviderError, RemoteParticipant, RemotePublication,
    RoomConnection, RoomEvent, RoomLink,
};

use crate::credential::SessionCredential;
use crate::errors::SessionError;
use crate::media::{LocalMediaController, LocalTrack};
use crate::observability::metrics;
use crate::registry::{ParticipantRegistry, ParticipantSummary, TrackPublication};
use crate::render::{RenderBinder, SurfaceRef};
use common::types::{TrackHandle, TrackKind};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

/// Room Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Closed,
    Failed,
}

impl RoomState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RoomState::Idle => "idle",
            RoomState::Connecting => "connecting",
            RoomState::Connected => "connected",
            RoomState::Disconnecting => "disconnecting",
            RoomState::Closed => "closed",
            RoomState::Failed => "failed",
        }
    }

    /// `Closed` and `Failed` end the instance.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, RoomState::Closed | RoomState::Failed)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notices from the Room Session to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomNotice {
    ParticipantJoined { identity: String },
    ParticipantLeft { identity: String },
    TrackAttached { identity: String, kind: TrackKind },
    TrackDetached { identity: String, kind: TrackKind },
    StateChanged(RoomState),
}

/// Result of handling one provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Continue,
    /// The provider closed the room; run the remote-close teardown.
    RemoteClosed { reason: Option<String> },
    /// Unrecoverable; run the failure teardown and surface the error.
    Failed(SessionError),
}

/// Shared outputs of every Room Session a controller creates.
#[derive(Debug, Clone)]
pub struct RoomChannels {
    pub notices: mpsc::UnboundedSender<RoomNotice>,
    pub roster: Arc<watch::Sender<Vec<ParticipantSummary>>>,
}

/// Room Session.
pub struct RoomSession {
    state: RoomState,
    room_id: Option<String>,
    credential: Option<SessionCredential>,
    connection: Option<Box<dyn RoomConnection>>,
    events: Option<mpsc::UnboundedReceiver<RoomEvent>>,
    published: Vec<LocalTrack>,
    registry: ParticipantRegistry,
    binder: Arc<dyn RenderBinder>,
    channels: RoomChannels,
}

impl RoomSession {
    pub fn new(binder: Arc<dyn RenderBinder>, channels: RoomChannels) -> Self {
        Self {
            state: RoomState::Idle,
            room_id: None,
            credential: None,
            connection: None,
            events: None,
            published: Vec::new(),
            registry: ParticipantRegistry::new(String::new()),
            binder,
            channels,
        }
    }

    #[must_use]
    pub fn state(&self) -> RoomState {
        self.state
    }

    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    #[must_use]
    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    /// Whether the credential is still held.
    #[must_use]
    pub fn holds_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Connect and reconcile the participants already present.
    ///
    /// # Errors
    ///
    /// `RoomConnectFailed` if the provider could not establish the room; the
    /// session is then `Failed` with an empty registry. `Internal` if this
    /// instance was already used.
    #[instrument(skip_all, fields(room_id = %credential.room_id()))]
    pub async fn connect(
        &mut self,
        provider: &dyn MediaRoomProvider,
        credential: SessionCredential,
        local_tracks: Vec<LocalTrack>,
        options: &ConnectOptions,
    ) -> Result<(), SessionError> {
        if self.state != RoomState::Idle {
            return Err(SessionError::Internal(format!(
                "room session already {}",
                self.state
            )));
        }

        self.room_id = Some(credential.room_id().to_string());
        self.set_state(RoomState::Connecting);

        let started = Instant::now();
        let link = match provider.connect(&credential, &local_tracks, options).await {
            Ok(link) => link,
            Err(e) => {
                warn!(target: "consult.room", error = %e, "Room connect failed");
                self.registry.clear();
                self.publish_roster();
                self.set_state(RoomState::Failed);
                return Err(SessionError::RoomConnectFailed(e.to_string()));
            }
        };
        metrics::record_room_connect_duration(started.elapsed());

        self.registry = ParticipantRegistry::new(link.local_identity);
        self.connection = Some(link.connection);
        self.events = Some(link.events);
        self.credential = Some(credential);
        self.published = local_tracks;
        self.set_state(RoomState::Connected);

        for participant in link.participants {
            self.reconcile_participant(participant);
        }

        info!(
            target: "consult.room",
            participants = self.registry.len(),
            published = self.published.len(),
            "Room connected"
        );
        Ok(())
    }

    /// Next provider event. Pends forever when not connected.
    pub async fn next_event(&mut self) -> Option<RoomEvent> {
        match self.events.as_mut() {
            Some(events) if self.state == RoomState::Connected => events.recv().await,
            _ => std::future::pending().await,
        }
    }

    /// Apply one provider event. Never suspends.
    pub fn handle_event(&mut self, event: RoomEvent) -> EventOutcome {
        if self.state != RoomState::Connected {
            debug!(
                target: "consult.room",
                event = event.label(),
                state = %self.state,
                "Event outside Connected dropped"
            );
            return EventOutcome::Continue;
        }

        metrics::record_room_event(event.label());

        match event {
            RoomEvent::ParticipantConnected(participant) => {
                self.reconcile_participant(participant);
            }
            RoomEvent::ParticipantDisconnected { identity } => {
                self.participant_left(&identity);
            }
            RoomEvent::TrackPublished {
                identity,
                sid,
                kind,
            } => {
                self.track_published(&identity, &sid, kind);
            }
            RoomEvent::TrackSubscribed {
                identity,
                sid,
                handle,
            } => {
                self.track_subscribed(&identity, &sid, handle);
            }
            RoomEvent::TrackUnsubscribed { identity, sid } => {
                self.track_unsubscribed(&identity, &sid);
            }
            RoomEvent::TrackUnpublished { identity, sid } => {
                self.track_unpublished(&identity, &sid);
            }
            RoomEvent::Disconnected { reason } => {
                info!(target: "consult.room", reason = ?reason, "Room closed by provider");
                return EventOutcome::RemoteClosed { reason };
            }
            RoomEvent::Error { message } => {
                warn!(target: "consult.room", error = %message, "Provider error");
                return EventOutcome::Failed(SessionError::UnexpectedProviderError(message));
            }
        }

        EventOutcome::Continue
    }

    /// User- or controller-initiated leave: `Disconnecting -> Closed`.
    ///
    /// Outside `Connected` only the local tracks are released.
    #[instrument(skip_all, fields(room_id = ?self.room_id))]
    pub async fn disconnect(&mut self, media: &mut LocalMediaController) {
        if self.state != RoomState::Connected {
            media.release();
            return;
        }
        self.set_state(RoomState::Disconnecting);
        self.teardown(media).await;
        self.set_state(RoomState::Closed);
        info!(target: "consult.room", "Room disconnected");
    }

    /// Provider-initiated close: teardown, then `Closed`.
    pub async fn close_by_remote(&mut self, media: &mut LocalMediaController) {
        if self.state.is_terminal() {
            media.release();
            return;
        }
        self.teardown(media).await;
        self.set_state(RoomState::Closed);
    }

    /// Unexpected error: best-effort teardown, then `Failed`.
    pub async fn fail(&mut self, media: &mut LocalMediaController) {
        if self.state.is_terminal() {
            media.release();
            return;
        }
        self.teardown(media).await;
        self.set_state(RoomState::Failed);
    }

    async fn teardown(&mut self, media: &mut LocalMediaController) {
        // 1. Detach everything we rendered.
        for (identity, handle) in self.registry.subscribed_handles() {
            self.detach(&SurfaceRef::remote(&identity), &handle);
        }
        media.detach_preview();

        // 2-3. Withdraw publications and leave.
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.unpublish_local_tracks() {
                warn!(target: "consult.room", error = %e, "Unpublish failed during teardown");
                metrics::record_teardown_step_failure("unpublish");
            }
            if let Err(e) = connection.disconnect().await {
                warn!(target: "consult.room", error = %e, "Provider disconnect failed during teardown");
                metrics::record_teardown_step_failure("provider_disconnect");
            }
        }
        self.events = None;

        // 4. Only the owner stops tracks.
        self.published.clear();
        media.release();

        // 5.
        self.registry.clear();
        self.publish_roster();
        self.credential = None;
    }

    fn reconcile_participant(&mut self, participant: RemoteParticipant) {
        match self.registry.upsert_participant(&participant.identity) {
            Ok(true) => {
                debug!(target: "consult.room", identity = %participant.identity, "Participant joined");
                self.publish_roster();
                self.notify(RoomNotice::ParticipantJoined {
                    identity: participant.identity.clone(),
                });
            }
            Ok(false) => {}
            Err(e) => {
                debug!(target: "consult.room", error = %e, "Participant ignored");
                return;
            }
        }

        for publication in participant.publications {
            match publication.handle {
                Some(handle) => self.track_subscribed(&participant.identity, &publication.sid, handle),
                None => {
                    self.track_published(&participant.identity, &publication.sid, publication.kind);
                    // A later unsubscribed report supersedes an earlier subscribed one.
                    self.track_unsubscribed(&participant.identity, &publication.sid);
                }
            }
        }
    }

    fn participant_left(&mut self, identity: &str) {
        let Some(participant) = self.registry.participant(identity) else {
            debug!(target: "consult.room", identity = %identity, "Departure of unknown participant dropped");
            return;
        };

        // Detach before the registry forgets the participant.
        let handles: Vec<TrackHandle> = participant
            .publications()
            .filter_map(|p| p.handle().cloned())
            .collect();
        let surface = SurfaceRef::remote(identity);
        for handle in &handles {
            self.detach(&surface, handle);
        }

        self.registry.remove_participant(identity);
        self.publish_roster();

        for handle in handles {
            self.notify(RoomNotice::TrackDetached {
                identity: identity.to_string(),
                kind: handle.kind(),
            });
        }
        self.notify(RoomNotice::ParticipantLeft {
            identity: identity.to_string(),
        });
        debug!(target: "consult.room", identity = %identity, "Participant left");
    }

    fn track_published(&mut self, identity: &str, sid: &str, kind: TrackKind) {
        let Some(participant) = self.registry.participant(identity) else {
            debug!(target: "consult.room", identity = %identity, sid = %sid, "Publication for unknown participant dropped");
            return;
        };
        if participant.publication(sid).is_some() {
            return;
        }
        if self
            .registry
            .upsert_publication(identity, TrackPublication::unsubscribed(sid, kind))
            .is_ok()
        {
            self.publish_roster();
        }
    }

    fn track_subscribed(&mut self, identity: &str, sid: &str, handle: TrackHandle) {
        let Some(participant) = self.registry.participant(identity) else {
            warn!(target: "consult.room", identity = %identity, sid = %sid, "Track for unknown participant dropped");
            return;
        };

        let previous = participant
            .publication(sid)
            .and_then(|p| p.handle().cloned());
        let surface = SurfaceRef::remote(identity);

        match previous {
            Some(existing) if existing == handle => {
                debug!(target: "consult.room", identity = %identity, sid = %sid, "Duplicate subscription ignored");
                return;
            }
            Some(existing) => self.detach(&surface, &existing),
            None => {}
        }

        let kind = handle.kind();
        if self
            .registry
            .upsert_publication(identity, TrackPublication::subscribed(sid, handle.clone()))
            .is_err()
        {
            return;
        }
        self.publish_roster();

        if let Err(e) = self.binder.attach(&surface, &handle) {
            warn!(target: "consult.room", error = %e, track = %handle, "Attach failed");
        }
        self.notify(RoomNotice::TrackAttached {
            identity: identity.to_string(),
            kind,
        });
    }

    fn track_unsubscribed(&mut self, identity: &str, sid: &str) {
        let Some(publication) = self
            .registry
            .participant(identity)
            .and_then(|p| p.publication(sid))
            .cloned()
        else {
            debug!(target: "consult.room", identity = %identity, sid = %sid, "Unsubscribe for unknown track dropped");
            return;
        };

        let mut publication = publication;
        let Some(handle) = publication.unsubscribe() else {
            return;
        };

        self.detach(&SurfaceRef::remote(identity), &handle);
        if self.registry.upsert_publication(identity, publication).is_ok() {
            self.publish_roster();
        }
        self.notify(RoomNotice::TrackDetached {
            identity: identity.to_string(),
            kind: handle.kind(),
        });
    }

    fn track_unpublished(&mut self, identity: &str, sid: &str) {
        let Some(handle) = self
            .registry
            .participant(identity)
            .and_then(|p| p.publication(sid))
            .map(|p| p.handle().cloned())
        else {
            debug!(target: "consult.room", identity = %identity, sid = %sid, "Unpublish for unknown track dropped");
            return;
        };

        if let Some(handle) = handle.as_ref() {
            self.detach(&SurfaceRef::remote(identity), handle);
        }
        if self.registry.remove_publication(identity, sid).is_ok() {
            self.publish_roster();
        }
        if let Some(handle) = handle {
            self.notify(RoomNotice::TrackDetached {
                identity: identity.to_string(),
                kind: handle.kind(),
            });
        }
    }

    fn detach(&self, surface: &SurfaceRef, handle: &TrackHandle) {
        if let Err(e) = self.binder.detach(surface, handle) {
            warn!(target: "consult.room", surface = %surface, error = %e, "Detach failed");
            metrics::record_teardown_step_failure("detach");
        }
    }

    fn set_state(&mut self, state: RoomState) {
        if self.state == state {
            return;
        }
        debug!(target: "consult.room", from = %self.state, to = %state, "Room state changed");
        self.state = state;
        self.notify(RoomNotice::StateChanged(state));
    }

    fn publish_roster(&self) {
        metrics::set_remote_participants(self.registry.len());
        self.channels.roster.send_replace(self.registry.summaries());
    }

    fn notify(&self, notice: RoomNotice) {
        // Owner gone means nobody is listening.
        let _ = self.channels.notices.send(notice);
    }
}
