//! Local Media Controller.
//!
//! Owns the local capture tracks (zero or one audio, zero or one video) for
//! their whole life: acquisition, the enabled gate, and release. The Room
//! Session only borrows clones of [`LocalTrack`] for publishing and never
//! stops them.

use crate::errors::SessionError;
use crate::observability::metrics;
use crate::render::{RenderBinder, SurfaceRef};
use async_trait::async_trait;
use common::types::{TrackHandle, TrackKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// What to capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub audio: bool,
    pub video: bool,
    /// Requested camera width in pixels.
    pub video_width: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            video_width: crate::config::DEFAULT_VIDEO_WIDTH,
        }
    }
}

/// Capture device failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No matching device: {0}")]
    NotFound(String),

    #[error("Device failure: {0}")]
    Other(String),
}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied(msg) => SessionError::DeviceAccessDenied(msg),
            DeviceError::NotFound(msg) | DeviceError::Other(msg) => {
                SessionError::DeviceUnavailable(msg)
            }
        }
    }
}

/// Platform capture devices (camera, microphone).
#[async_trait]
pub trait CaptureDevices: Send + Sync {
    /// Open capture for the requested kinds. May prompt for permission.
    async fn open(&self, constraints: &CaptureConstraints)
        -> Result<Vec<TrackHandle>, DeviceError>;

    /// Stop a track and free its device.
    fn stop(&self, handle: &TrackHandle) -> Result<(), DeviceError>;
}

/// A held capture track with its enabled gate.
///
/// Clones share the gate, so a publisher holding a clone observes toggles.
/// The gate never touches the device.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    handle: TrackHandle,
    enabled: Arc<AtomicBool>,
}

impl LocalTrack {
    fn new(handle: TrackHandle) -> Self {
        Self {
            handle,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    #[must_use]
    pub fn handle(&self) -> &TrackHandle {
        &self.handle
    }

    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.handle.kind()
    }

    /// Whether the track currently contributes to any publish.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

/// Zero-or-one audio track and zero-or-one video track.
#[derive(Debug, Clone, Default)]
pub struct LocalTrackSet {
    audio: Option<LocalTrack>,
    video: Option<LocalTrack>,
}

impl LocalTrackSet {
    #[must_use]
    pub fn get(&self, kind: TrackKind) -> Option<&LocalTrack> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    /// Clones of the held tracks, audio first.
    #[must_use]
    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.audio.iter().chain(self.video.iter()).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.audio.is_some()) + usize::from(self.video.is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&mut self, kind: TrackKind) -> &mut Option<LocalTrack> {
        match kind {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Video => &mut self.video,
        }
    }
}

/// Local Media Controller.
pub struct LocalMediaController {
    devices: Arc<dyn CaptureDevices>,
    binder: Arc<dyn RenderBinder>,
    tracks: Option<LocalTrackSet>,
    preview_attached: bool,
}

impl LocalMediaController {
    pub fn new(devices: Arc<dyn CaptureDevices>, binder: Arc<dyn RenderBinder>) -> Self {
        Self {
            devices,
            binder,
            tracks: None,
            preview_attached: false,
        }
    }

    /// Acquire capture tracks, or return the set already held.
    ///
    /// The video track is attached to the local preview surface.
    ///
    /// # Errors
    ///
    /// `DeviceAccessDenied` or `DeviceUnavailable`. Nothing is held on failure.
    #[instrument(skip_all, fields(audio = constraints.audio, video = constraints.video))]
    pub async fn acquire(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<&LocalTrackSet, SessionError> {
        if self.tracks.is_some() {
            debug!(target: "consult.media", "Tracks already held, reusing");
            return Ok(self.tracks.get_or_insert_with(LocalTrackSet::default));
        }

        let mut set = LocalTrackSet::default();

        if constraints.audio || constraints.video {
            let handles = self.devices.open(constraints).await.map_err(|e| {
                warn!(target: "consult.media", error = %e, "Capture acquisition failed");
                SessionError::from(e)
            })?;

            for handle in handles {
                let wanted = match handle.kind() {
                    TrackKind::Audio => constraints.audio,
                    TrackKind::Video => constraints.video,
                };
                let slot = set.slot(handle.kind());
                if wanted && slot.is_none() {
                    *slot = Some(LocalTrack::new(handle));
                } else {
                    debug!(target: "consult.media", track = %handle, "Stopping surplus track");
                    self.stop_track(&handle);
                }
            }
        }

        if let Some(video) = set.video.as_ref() {
            match self
                .binder
                .attach(&SurfaceRef::local_preview(), video.handle())
            {
                Ok(()) => self.preview_attached = true,
                Err(e) => {
                    warn!(target: "consult.media", error = %e, "Failed to attach local preview");
                }
            }
        }

        info!(
            target: "consult.media",
            audio = set.audio.is_some(),
            video = set.video.is_some(),
            "Local tracks acquired"
        );

        Ok(self.tracks.insert(set))
    }

    /// Set the enabled flag of the held track of `kind`.
    ///
    /// Returns the new flag, or `None` if no such track is held.
    pub fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> Option<bool> {
        let track = self.tracks.as_ref()?.get(kind)?;
        track.set_enabled(enabled);
        debug!(target: "consult.media", kind = %kind, enabled, "Track enabled flag set");
        Some(enabled)
    }

    /// Flip the enabled flag of the held track of `kind`.
    pub fn toggle(&mut self, kind: TrackKind) -> Option<bool> {
        let current = self.is_enabled(kind)?;
        self.set_enabled(kind, !current)
    }

    #[must_use]
    pub fn is_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.tracks
            .as_ref()
            .and_then(|set| set.get(kind))
            .map(LocalTrack::is_enabled)
    }

    #[must_use]
    pub fn tracks(&self) -> Option<&LocalTrackSet> {
        self.tracks.as_ref()
    }

    /// Tracks to publish at connect time.
    #[must_use]
    pub fn publishable(&self) -> Vec<LocalTrack> {
        self.tracks.as_ref().map(LocalTrackSet::tracks).unwrap_or_default()
    }

    #[must_use]
    pub fn held_track_count(&self) -> usize {
        self.tracks.as_ref().map_or(0, LocalTrackSet::len)
    }

    /// Detach the held video track from the local preview surface.
    ///
    /// Tracks stay live. Does nothing if the preview is not attached.
    pub fn detach_preview(&mut self) {
        if !self.preview_attached {
            return;
        }
        self.preview_attached = false;

        let Some(video) = self.tracks.as_ref().and_then(|set| set.get(TrackKind::Video)) else {
            return;
        };
        if let Err(e) = self
            .binder
            .detach(&SurfaceRef::local_preview(), video.handle())
        {
            warn!(target: "consult.media", error = %e, "Failed to detach local preview");
            metrics::record_teardown_step_failure("detach_preview");
        }
    }

    /// Detach the preview, then stop and free every held track.
    ///
    /// Idempotent. Failures are logged; every track is attempted.
    pub fn release(&mut self) {
        self.detach_preview();
        let Some(set) = self.tracks.take() else {
            return;
        };

        for track in set.tracks() {
            self.stop_track(track.handle());
        }

        info!(target: "consult.media", "Local tracks released");
    }

    fn stop_track(&self, handle: &TrackHandle) {
        if let Err(e) = self.devices.stop(handle) {
            warn!(target: "consult.media", track = %handle, error = %e, "Failed to stop track");
            metrics::record_teardown_step_failure("stop_track");
        }
    }
}

impl Drop for LocalMediaController {
    fn drop(&mut self) {
        self.release();
    }
}
