//! Ids, handles, participants and a session harness.

use crate::journal::CallJournal;
use crate::mock_devices::MockDevices;
use crate::mock_exchange::MockExchange;
use crate::mock_hooks::MockHooks;
use crate::mock_provider::MockProvider;
use crate::recording_binder::RecordingBinder;
use common::types::{TrackHandle, TrackKind};
use consult_client::controller::{
    SessionController, SessionControllerHandle, SessionDeps, SessionOptions,
};
use consult_client::room::RemoteParticipant;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const APPOINTMENT_ID: &str = "appt-1";
pub const PATIENT_ID: &str = "patient-7";
pub const DOCTOR_ID: &str = "doctor-1";
pub const TOKEN: &str = "t1";
pub const ROOM_ID: &str = "r1";

/// A remote video handle with a fixed id.
#[must_use]
pub fn video_handle(id: &str) -> TrackHandle {
    TrackHandle::new(id, TrackKind::Video)
}

/// A remote audio handle with a fixed id.
#[must_use]
pub fn audio_handle(id: &str) -> TrackHandle {
    TrackHandle::new(id, TrackKind::Audio)
}

/// `doctor-1` with one delivered video track `TR_v1`.
#[must_use]
pub fn doctor_with_video() -> RemoteParticipant {
    RemoteParticipant::new(DOCTOR_ID).with_subscribed("TR_v1", video_handle("doctor-video"))
}

/// Every collaborator of one controller, sharing one journal.
///
/// # Example
/// ```rust,ignore
/// let harness = SessionHarness::builder()
///     .with_participant(doctor_with_video())
///     .build();
/// let handle = harness.spawn();
/// ```
pub struct SessionHarness {
    pub journal: CallJournal,
    pub exchange: Arc<MockExchange>,
    pub hooks: Arc<MockHooks>,
    pub devices: Arc<MockDevices>,
    pub provider: Arc<MockProvider>,
    pub binder: Arc<RecordingBinder>,
    pub options: SessionOptions,
}

impl SessionHarness {
    #[must_use]
    pub fn builder() -> SessionHarnessBuilder {
        SessionHarnessBuilder::default()
    }

    /// Dependencies for a controller.
    #[must_use]
    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            exchange: Arc::clone(&self.exchange) as _,
            hooks: Arc::clone(&self.hooks) as _,
            devices: Arc::clone(&self.devices) as _,
            provider: Arc::clone(&self.provider) as _,
            binder: Arc::clone(&self.binder) as _,
        }
    }

    /// Spawn a controller and wire the binder to its roster.
    #[must_use]
    pub fn spawn(&self) -> (SessionControllerHandle, JoinHandle<()>) {
        let (handle, task) = SessionController::spawn(self.deps(), self.options.clone());
        self.binder.observe_roster(handle.roster());
        (handle, task)
    }
}

/// Builder for [`SessionHarness`]. Defaults to an exchange issuing `t1`/`r1`,
/// granted devices and an empty room.
#[derive(Default)]
pub struct SessionHarnessBuilder {
    exchange: Option<MockExchange>,
    hooks: Option<MockHooks>,
    devices: Option<MockDevices>,
    provider: Option<MockProvider>,
    binder: Option<RecordingBinder>,
    participants: Vec<RemoteParticipant>,
    options: SessionOptions,
}

impl SessionHarnessBuilder {
    #[must_use]
    pub fn exchange(mut self, exchange: MockExchange) -> Self {
        self.exchange = Some(exchange);
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: MockHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    #[must_use]
    pub fn devices(mut self, devices: MockDevices) -> Self {
        self.devices = Some(devices);
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: MockProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn binder(mut self, binder: RecordingBinder) -> Self {
        self.binder = Some(binder);
        self
    }

    /// Participant present when the room is joined.
    #[must_use]
    pub fn with_participant(mut self, participant: RemoteParticipant) -> Self {
        self.participants.push(participant);
        self
    }

    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn build(self) -> SessionHarness {
        let journal = CallJournal::new();

        let exchange = self
            .exchange
            .unwrap_or_else(|| MockExchange::returning(TOKEN, ROOM_ID))
            .with_journal(journal.clone());
        let hooks = self
            .hooks
            .unwrap_or_default()
            .with_journal(journal.clone());
        let devices = self
            .devices
            .unwrap_or_default()
            .with_journal(journal.clone());
        let provider = self
            .participants
            .into_iter()
            .fold(self.provider.unwrap_or_default(), MockProvider::with_participant)
            .with_journal(journal.clone());
        let binder = self
            .binder
            .unwrap_or_default()
            .with_journal(journal.clone());

        SessionHarness {
            journal,
            exchange: Arc::new(exchange),
            hooks: Arc::new(hooks),
            devices: Arc::new(devices),
            provider: Arc::new(provider),
            binder: Arc::new(binder),
            options: self.options,
        }
    }
}
