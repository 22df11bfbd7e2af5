//! Capture devices tracking which tracks are still live.

use crate::gate::Gate;
use crate::journal::{Call, CallJournal};
use async_trait::async_trait;
use common::types::{TrackHandle, TrackKind};
use consult_client::media::{CaptureConstraints, CaptureDevices, DeviceError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Availability {
    Granted,
    Denied,
    Missing,
}

/// Capture devices handing out fresh handles and tracking live ones.
#[derive(Debug, Clone)]
pub struct MockDevices {
    availability: Availability,
    fail_stop: bool,
    gate: Option<Gate>,
    live: Arc<Mutex<HashSet<TrackHandle>>>,
    opened: Arc<Mutex<u32>>,
    journal: CallJournal,
}

impl Default for MockDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevices {
    /// Camera and microphone present, permission granted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            availability: Availability::Granted,
            fail_stop: false,
            gate: None,
            live: Arc::new(Mutex::new(HashSet::new())),
            opened: Arc::new(Mutex::new(0)),
            journal: CallJournal::new(),
        }
    }

    /// The user refuses the permission prompt.
    #[must_use]
    pub fn denying() -> Self {
        Self {
            availability: Availability::Denied,
            ..Self::new()
        }
    }

    /// No camera or microphone attached.
    #[must_use]
    pub fn missing() -> Self {
        Self {
            availability: Availability::Missing,
            ..Self::new()
        }
    }

    /// Every `stop` reports failure (the track still ends).
    #[must_use]
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Suspend inside `open` (the permission prompt) until the gate opens.
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

    /// Tracks opened and not yet stopped.
    #[must_use]
    pub fn live_track_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    /// Number of `open` calls.
    #[must_use]
    pub fn open_count(&self) -> u32 {
        *self.opened.lock().unwrap()
    }
}

#[async_trait]
impl CaptureDevices for MockDevices {
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Vec<TrackHandle>, DeviceError> {
        self.journal.record(Call::OpenDevices);
        *self.opened.lock().unwrap() += 1;

        if let Some(gate) = &self.gate {
            gate.pass().await;
        }

        match self.availability {
            Availability::Denied => {
                return Err(DeviceError::PermissionDenied("NotAllowedError".to_string()))
            }
            Availability::Missing => {
                return Err(DeviceError::NotFound("NotFoundError".to_string()))
            }
            Availability::Granted => {}
        }

        let mut handles = Vec::new();
        if constraints.audio {
            handles.push(TrackHandle::generate(TrackKind::Audio));
        }
        if constraints.video {
            handles.push(TrackHandle::generate(TrackKind::Video));
        }

        self.live.lock().unwrap().extend(handles.iter().cloned());
        Ok(handles)
    }

    fn stop(&self, handle: &TrackHandle) -> Result<(), DeviceError> {
        self.journal.record(Call::StopTrack(handle.clone()));
        self.live.lock().unwrap().remove(handle);
        if self.fail_stop {
            return Err(DeviceError::Other("track already ended".to_string()));
        }
        Ok(())
    }
}
