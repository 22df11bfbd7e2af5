//! # Consult Test Utilities
//!
//! Mock collaborators and fixtures for exercising the consultation client
//! without real devices, a real media room, or a real backend.
//!
//! Every mock can share one [`CallJournal`], so a test can assert the global
//! order of calls across collaborators (detach before unpublish before
//! disconnect before track stop).
//!
//! ## Modules
//!
//! - `journal` - Shared ordered call log
//! - `gate` - Hold a mock inside a suspension point until the test opens it
//! - `mock_exchange` - Scripted credential exchange
//! - `mock_hooks` - Recording consultation hooks
//! - `mock_devices` - Capture devices tracking which tracks are still live
//! - `mock_provider` - Media room provider with injectable events
//! - `recording_binder` - Render binder recording attach/detach
//! - `fixtures` - Ids, handles, participants and a session harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use consult_test_utils::fixtures::SessionHarness;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = SessionHarness::builder()
//!         .with_participant(doctor_with_video())
//!         .build();
//!     let (handle, _task) = harness.spawn();
//!
//!     handle.start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient).await.unwrap();
//!     assert_eq!(harness.binder.remote_attach_count(), 1);
//! }
//! ```

pub mod fixtures;
pub mod gate;
pub mod journal;
pub mod mock_devices;
pub mod mock_exchange;
pub mod mock_hooks;
pub mod mock_provider;
pub mod recording_binder;

pub use gate::Gate;
pub use journal::{Call, CallJournal};
pub use mock_devices::MockDevices;
pub use mock_exchange::MockExchange;
pub use mock_hooks::MockHooks;
pub use mock_provider::MockProvider;
pub use recording_binder::RecordingBinder;
