//! Render binder recording attach/detach calls.

use crate::journal::{Call, CallJournal};
use common::types::TrackHandle;
use consult_client::registry::ParticipantSummary;
use consult_client::render::{RenderBinder, RenderError, SurfaceRef};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

/// Binder recording every call into the journal and tracking live attachments.
///
/// With a roster attached, each remote detach also records whether the
/// participant was still listed, which is how detach-before-remove is checked.
#[derive(Debug, Default)]
pub struct RecordingBinder {
    journal: CallJournal,
    attached: Mutex<HashMap<(String, TrackHandle), usize>>,
    roster: Mutex<Option<watch::Receiver<Vec<ParticipantSummary>>>>,
    fail_detach: bool,
}

impl RecordingBinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Every detach reports failure (after being recorded).
    #[must_use]
    pub fn failing_detach(mut self) -> Self {
        self.fail_detach = true;
        self
    }

    /// Watch the registry roster from now on.
    pub fn observe_roster(&self, roster: watch::Receiver<Vec<ParticipantSummary>>) {
        *self.roster.lock().unwrap() = Some(roster);
    }

    /// Attachments currently in place.
    #[must_use]
    pub fn live_attachments(&self) -> usize {
        self.attached.lock().unwrap().values().sum()
    }

    #[must_use]
    pub fn attach_count(&self) -> usize {
        self.journal.count(|c| matches!(c, Call::Attach { .. }))
    }

    /// Attach calls targeting remote surfaces.
    #[must_use]
    pub fn remote_attach_count(&self) -> usize {
        self.journal
            .count(|c| matches!(c, Call::Attach { surface, .. } if surface.starts_with("remote:")))
    }

    #[must_use]
    pub fn detach_count(&self) -> usize {
        self.journal.count(|c| matches!(c, Call::Detach { .. }))
    }

    fn listed(&self, surface: &SurfaceRef) -> Option<bool> {
        let identity = surface.as_str().strip_prefix("remote:")?;
        let roster = self.roster.lock().unwrap();
        let roster = roster.as_ref()?;
        let listed = roster.borrow().iter().any(|p| p.identity == identity);
        Some(listed)
    }
}

impl RenderBinder for RecordingBinder {
    fn attach(&self, surface: &SurfaceRef, handle: &TrackHandle) -> Result<(), RenderError> {
        self.journal.record(Call::Attach {
            surface: surface.to_string(),
            handle: handle.clone(),
        });
        *self
            .attached
            .lock()
            .unwrap()
            .entry((surface.to_string(), handle.clone()))
            .or_default() += 1;
        Ok(())
    }

    fn detach(&self, surface: &SurfaceRef, handle: &TrackHandle) -> Result<(), RenderError> {
        self.journal.record(Call::Detach {
            surface: surface.to_string(),
            handle: handle.clone(),
            listed_in_roster: self.listed(surface),
        });
        self.attached
            .lock()
            .unwrap()
            .remove(&(surface.to_string(), handle.clone()));
        if self.fail_detach {
            return Err(RenderError::Backend("surface disposed".to_string()));
        }
        Ok(())
    }
}
