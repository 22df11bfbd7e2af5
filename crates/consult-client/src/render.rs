//! Render Binder.
//!
//! The only component allowed to touch presentation. Surfaces are opaque
//! references owned by the host UI; they may be unmounted at any time, so
//! binding against a missing surface is a no-op rather than an error.

use common::types::TrackHandle;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, trace};

/// Opaque reference to a display surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceRef(String);

impl SurfaceRef {
    /// Surface showing the local camera preview.
    #[must_use]
    pub fn local_preview() -> Self {
        Self("local:preview".to_string())
    }

    /// Surface for a remote participant's media.
    #[must_use]
    pub fn remote(identity: &str) -> Self {
        Self(format!("remote:{identity}"))
    }

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render failures. Never raised for a missing surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Render backend failed: {0}")]
    Backend(String),
}

/// Attaches and detaches track handles to display surfaces.
///
/// Calls are synchronous: they happen inside provider event handling, which
/// must not suspend.
pub trait RenderBinder: Send + Sync {
    /// Attach `handle` to `surface`. Missing surface is a no-op.
    fn attach(&self, surface: &SurfaceRef, handle: &TrackHandle) -> Result<(), RenderError>;

    /// Detach `handle` from `surface`. Missing surface or handle is a no-op.
    fn detach(&self, surface: &SurfaceRef, handle: &TrackHandle) -> Result<(), RenderError>;
}

/// In-memory binder tracking which handles are attached to which mounted surface.
///
/// Hosts mount surfaces as their views appear and unmount them as they go.
#[derive(Debug, Default)]
pub struct SurfaceBinder {
    surfaces: Mutex<HashMap<SurfaceRef, HashSet<TrackHandle>>>,
}

impl SurfaceBinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `surface` available for attachment.
    pub fn mount(&self, surface: SurfaceRef) {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(surface)
            .or_default();
    }

    /// Remove `surface`, dropping whatever was attached to it.
    pub fn unmount(&self, surface: &SurfaceRef) {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(surface);
    }

    /// Handles currently attached to `surface`.
    #[must_use]
    pub fn attached(&self, surface: &SurfaceRef) -> Vec<TrackHandle> {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(surface)
            .map(|handles| handles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of attachments across all surfaces.
    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashSet::len)
            .sum()
    }
}

impl RenderBinder for SurfaceBinder {
    fn attach(&self, surface: &SurfaceRef, handle: &TrackHandle) -> Result<(), RenderError> {
        let mut surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        match surfaces.get_mut(surface) {
            Some(handles) => {
                handles.insert(handle.clone());
                debug!(target: "consult.render", surface = %surface, track = %handle, "Track attached");
            }
            None => {
                trace!(target: "consult.render", surface = %surface, "Attach to missing surface ignored");
            }
        }
        Ok(())
    }

    fn detach(&self, surface: &SurfaceRef, handle: &TrackHandle) -> Result<(), RenderError> {
        let mut surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        match surfaces.get_mut(surface) {
            Some(handles) => {
                handles.remove(handle);
                debug!(target: "consult.render", surface = %surface, track = %handle, "Track detached");
            }
            None => {
                trace!(target: "consult.render", surface = %surface, "Detach from missing surface ignored");
            }
        }
        Ok(())
    }
}
