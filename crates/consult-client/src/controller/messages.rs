//! Session Controller messages and views.
//!
//! Intents travel on a `tokio::sync::mpsc` mailbox and are answered over
//! `tokio::sync::oneshot`.

use crate::errors::SessionError;
use crate::registry::ParticipantSummary;
use crate::room::{RoomNotice, RoomState};
use chrono::{DateTime, Utc};
use common::types::{Role, TrackKind};
use tokio::sync::oneshot;

/// Messages sent to the `SessionController`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Exchange, acquire and connect.
    StartSession {
        meeting_or_appointment_id: String,
        user_id: String,
        role: Role,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Flip the enabled flag of the local track of `kind`.
    ///
    /// Answers the new flag, or `None` if no such track is held.
    ToggleTrack {
        kind: TrackKind,
        respond_to: oneshot::Sender<Result<Option<bool>, SessionError>>,
    },

    /// Leave the current session, or abandon the start in flight.
    LeaveSession {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Current view of the session.
    GetState {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
}

/// Coarse controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session open. A closed or failed room may still be on display.
    Idle,
    /// A start sequence is suspended.
    Starting,
    /// Room connected.
    InCall,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// State of the latest Room Session, if one was created.
    pub room_state: Option<RoomState>,
    pub room_id: Option<String>,
    pub participants: Vec<ParticipantSummary>,
    /// Number of local capture tracks held.
    pub local_tracks: usize,
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
    /// The single current error, cleared by the next intent.
    pub error: Option<SessionError>,
    /// Non-fatal notice, e.g. the room was closed by the remote side.
    pub notice: Option<SessionError>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// User-facing text for the current error, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(SessionError::client_message)
    }
}

/// Events published to UI subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Relayed from the Room Session.
    Room(RoomNotice),
    LocalTrackToggled { kind: TrackKind, enabled: bool },
    /// The remote side ended the room.
    ClosedByRemote { reason: Option<String> },
    /// The session failed after teardown.
    Failed(SessionError),
}
