//! Consultation Client Library
//!
//! Client-side session lifecycle for a patient and a clinician joining a live
//! audio/video consultation after out-of-band admission:
//!
//! - Exchanging a short-lived session credential for a room
//! - Acquiring, gating and releasing local capture devices
//! - Connecting to a media room and tracking remote participants and tracks
//! - Reflecting subscribed tracks into render surfaces
//! - Deterministic teardown on every exit path
//!
//! # Architecture
//!
//! ```text
//! SessionController (actor, one per consultation view)
//! ├── CredentialExchange      (one network call, no retries)
//! ├── ConsultationHooks       (doctor start-call, end-call)
//! ├── LocalMediaController    (owns local tracks)
//! └── RoomSession             (one per start; state machine)
//!     ├── ParticipantRegistry (remote identity -> publications)
//!     └── RenderBinder        (only component touching presentation)
//! ```
//!
//! The media room provider, capture devices and render surfaces are
//! collaborators behind traits; this crate never implements a transport.
//!
//! # Modules
//!
//! - [`controller`] - Session Controller actor and its handle
//! - [`room`] - Room Session state machine and the provider seam
//! - [`registry`] - Participant Registry
//! - [`media`] - Local Media Controller and the capture device seam
//! - [`render`] - Render Binder
//! - [`credential`] - Credential Exchange
//! - [`consultation`] - Start/end call hooks
//! - [`config`] - Configuration from environment
//! - [`errors`] - Session error taxonomy

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod consultation;
pub mod controller;
pub mod credential;
pub mod errors;
pub mod media;
pub mod observability;
pub mod registry;
pub mod render;
pub mod room;
