//! Common data types for the consultation client crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Role a user joins a consultation with.
///
/// Serialized in the wire form the credential endpoints expect (`PATIENT`, `DOCTOR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The patient side of the consultation.
    Patient,
    /// The clinician side of the consultation.
    Doctor,
}

impl Role {
    /// Returns the wire representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "PATIENT",
            Role::Doctor => "DOCTOR",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role string is not one of the recognized values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognized role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PATIENT" => Ok(Role::Patient),
            "DOCTOR" => Ok(Role::Doctor),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Microphone / remote audio.
    Audio,
    /// Camera / remote video.
    Video,
}

impl TrackKind {
    /// Returns the kind as a string for log fields and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a media track.
///
/// The id is assigned by whoever produced the track (capture layer for local
/// tracks, media-room provider for remote ones). Handles are cheap to clone and
/// compare by id and kind only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackHandle {
    id: String,
    kind: TrackKind,
}

impl TrackHandle {
    /// Wrap a producer-assigned track id.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Create a handle with a random id.
    #[must_use]
    pub fn generate(kind: TrackKind) -> Self {
        Self::new(format!("{}-{}", kind.as_str(), Uuid::new_v4()), kind)
    }

    /// Producer-assigned track id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Track kind.
    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.kind
    }
}

impl fmt::Display for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
