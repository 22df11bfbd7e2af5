//! Hold a mock inside a suspension point.
//!
//! ```rust,ignore
//! let gate = Gate::new();
//! let exchange = MockExchange::returning("t1", "r1").with_gate(gate.clone());
//! // ... start the session in a task ...
//! gate.entered().await;   // exchange is now suspended
//! handle.leave_session(); // race it
//! gate.open();            // let it settle
//! ```

use std::sync::Arc;
use tokio::sync::Notify;

/// A one-shot barrier between a mock and the test.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    opened: Arc<Notify>,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the mock has reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the mock through.
    pub fn open(&self) {
        self.opened.notify_one();
    }

    /// Called by the mock: announce arrival and wait to be let through.
    pub async fn pass(&self) {
        self.entered.notify_one();
        self.opened.notified().await;
    }
}
