//! Media room provider seam.
//!
//! The provider's signaling, SFU topology and codecs live behind this
//! interface. A connection yields a typed event stream instead of callback
//! registration, so nothing on the provider side can reach a render surface.

use crate::credential::SessionCredential;
use crate::errors::SessionError;
use crate::media::LocalTrack;
use async_trait::async_trait;
use common::types::{TrackHandle, TrackKind};
use thiserror::Error;
use tokio::sync::mpsc;

/// Options forwarded to the provider at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Ask the provider for dominant-speaker notifications.
    pub dominant_speaker: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            dominant_speaker: true,
        }
    }
}

/// Provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Unpublish failed: {0}")]
    Unpublish(String),

    #[error("Disconnect failed: {0}")]
    Disconnect(String),
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Connect(msg) => SessionError::RoomConnectFailed(msg),
            other => SessionError::UnexpectedProviderError(other.to_string()),
        }
    }
}

/// A publication as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePublication {
    pub sid: String,
    pub kind: TrackKind,
    /// Present once the track has been delivered to us.
    pub handle: Option<TrackHandle>,
}

/// A remote participant as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub identity: String,
    pub publications: Vec<RemotePublication>,
}

impl RemoteParticipant {
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            publications: Vec::new(),
        }
    }

    /// Add a delivered publication.
    #[must_use]
    pub fn with_subscribed(mut self, sid: impl Into<String>, handle: TrackHandle) -> Self {
        self.publications.push(RemotePublication {
            sid: sid.into(),
            kind: handle.kind(),
            handle: Some(handle),
        });
        self
    }

    /// Add an advertised, undelivered publication.
    #[must_use]
    pub fn with_published(mut self, sid: impl Into<String>, kind: TrackKind) -> Self {
        self.publications.push(RemotePublication {
            sid: sid.into(),
            kind,
            handle: None,
        });
        self
    }
}

/// Events delivered by a live connection, in provider order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    ParticipantConnected(RemoteParticipant),
    ParticipantDisconnected {
        identity: String,
    },
    TrackPublished {
        identity: String,
        sid: String,
        kind: TrackKind,
    },
    TrackSubscribed {
        identity: String,
        sid: String,
        handle: TrackHandle,
    },
    TrackUnsubscribed {
        identity: String,
        sid: String,
    },
    TrackUnpublished {
        identity: String,
        sid: String,
    },
    /// The provider closed the room.
    Disconnected {
        reason: Option<String>,
    },
    /// The provider raised an error outside any request.
    Error {
        message: String,
    },
}

impl RoomEvent {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            RoomEvent::ParticipantConnected(_) => "participant_connected",
            RoomEvent::ParticipantDisconnected { .. } => "participant_disconnected",
            RoomEvent::TrackPublished { .. } => "track_published",
            RoomEvent::TrackSubscribed { .. } => "track_subscribed",
            RoomEvent::TrackUnsubscribed { .. } => "track_unsubscribed",
            RoomEvent::TrackUnpublished { .. } => "track_unpublished",
            RoomEvent::Disconnected { .. } => "disconnected",
            RoomEvent::Error { .. } => "error",
        }
    }
}

/// A live connection to one room.
#[async_trait]
pub trait RoomConnection: Send + Sync {
    /// Withdraw our published tracks. Does not stop them.
    fn unpublish_local_tracks(&mut self) -> Result<(), ProviderError>;

    /// Leave the room.
    async fn disconnect(&mut self) -> Result<(), ProviderError>;
}

/// Everything a successful connect hands back.
pub struct RoomLink {
    pub connection: Box<dyn RoomConnection>,
    pub events: mpsc::UnboundedReceiver<RoomEvent>,
    /// Identity the provider assigned to us.
    pub local_identity: String,
    /// Participants already present, in arrival order.
    pub participants: Vec<RemoteParticipant>,
}

impl std::fmt::Debug for RoomLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomLink")
            .field("local_identity", &self.local_identity)
            .field("participants", &self.participants.len())
            .finish_non_exhaustive()
    }
}

/// The media room provider.
#[async_trait]
pub trait MediaRoomProvider: Send + Sync {
    /// Connect to the credential's room, publishing `local_tracks`.
    ///
    /// Timeouts are the provider's own.
    async fn connect(
        &self,
        credential: &SessionCredential,
        local_tracks: &[LocalTrack],
        options: &ConnectOptions,
    ) -> Result<RoomLink, ProviderError>;
}
