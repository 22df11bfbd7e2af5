//! Shared ordered call log.

use common::types::{Role, TrackHandle};
use std::sync::{Arc, Mutex};

/// One observed collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exchange {
        id: String,
        user_id: String,
        role: Role,
    },
    StartCallHook {
        appointment_id: String,
        user_id: String,
    },
    EndCallHook {
        appointment_id: String,
        user_id: String,
    },
    OpenDevices,
    StopTrack(TrackHandle),
    Connect {
        room_id: String,
        published: usize,
    },
    Unpublish,
    ProviderDisconnect,
    Attach {
        surface: String,
        handle: TrackHandle,
    },
    Detach {
        surface: String,
        handle: TrackHandle,
        /// For remote surfaces with a roster attached: whether the roster still
        /// listed the participant when the detach happened.
        listed_in_roster: Option<bool>,
    },
}

impl Call {
    /// Whether this call leaves the process (exchange, hooks, provider).
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Call::Exchange { .. }
                | Call::StartCallHook { .. }
                | Call::EndCallHook { .. }
                | Call::Connect { .. }
                | Call::Unpublish
                | Call::ProviderDisconnect
        )
    }
}

/// Ordered log shared between mocks.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    /// Snapshot of every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    /// Index of the first call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|c| predicate(c))
    }

    /// Index of the last call matching `predicate`.
    pub fn last_position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.lock().unwrap().iter().rposition(|c| predicate(c))
    }

    /// Calls recorded from index `from` on.
    #[must_use]
    pub fn since(&self, from: usize) -> Vec<Call> {
        self.calls.lock().unwrap().iter().skip(from).cloned().collect()
    }
}
