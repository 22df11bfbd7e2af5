//! Integration tests for intents racing a suspended start.
//!
//! Each test parks one collaborator behind a `Gate`, sends the racing intent,
//! then lets the collaborator settle.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::Role;
use consult_client::controller::{SessionControllerHandle, SessionPhase};
use consult_client::errors::SessionError;
use consult_client::room::RoomState;
use consult_test_utils::fixtures::{doctor_with_video, SessionHarness, APPOINTMENT_ID, PATIENT_ID};
use consult_test_utils::{Call, Gate, MockDevices, MockExchange, MockProvider};
use tokio::task::JoinHandle;

fn start_in_background(handle: &SessionControllerHandle) -> JoinHandle<Result<(), SessionError>> {
    let handle = handle.clone();
    tokio::spawn(async move {
        handle
            .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
            .await
    })
}

fn leave_in_background(handle: &SessionControllerHandle) -> JoinHandle<Result<(), SessionError>> {
    let handle = handle.clone();
    tokio::spawn(async move { handle.leave_session().await })
}

/// Returns once every intent sent before it has been taken off the mailbox.
async fn mailbox_drained(handle: &SessionControllerHandle) {
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::Starting);
}

#[tokio::test]
async fn test_leave_during_exchange_acquires_nothing() {
    let gate = Gate::new();
    let harness = SessionHarness::builder()
        .exchange(MockExchange::returning("t1", "r1").with_gate(gate.clone()))
        .build();
    let (handle, _task) = harness.spawn();

    let start = start_in_background(&handle);
    gate.entered().await;
    let leave = leave_in_background(&handle);
    tokio::task::yield_now().await;
    mailbox_drained(&handle).await;
    gate.open();

    assert_eq!(start.await.unwrap(), Err(SessionError::Cancelled));
    leave.await.unwrap().unwrap();

    assert_eq!(harness.devices.open_count(), 0);
    assert_eq!(harness.provider.connect_count(), 0);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::Idle);
    // Cancellation is not an error to show.
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_leave_during_device_prompt_releases_tracks() {
    let gate = Gate::new();
    let harness = SessionHarness::builder()
        .devices(MockDevices::new().with_gate(gate.clone()))
        .build();
    let (handle, _task) = harness.spawn();

    let start = start_in_background(&handle);
    gate.entered().await;
    let leave = leave_in_background(&handle);
    tokio::task::yield_now().await;
    mailbox_drained(&handle).await;
    gate.open();

    assert_eq!(start.await.unwrap(), Err(SessionError::Cancelled));
    leave.await.unwrap().unwrap();

    assert_eq!(harness.devices.live_track_count(), 0);
    assert_eq!(harness.provider.connect_count(), 0);
    assert_eq!(harness.binder.live_attachments(), 0);
}

#[tokio::test]
async fn test_leave_during_connect_disconnects_established_room() {
    let gate = Gate::new();
    let harness = SessionHarness::builder()
        .provider(MockProvider::new().with_gate(gate.clone()))
        .with_participant(doctor_with_video())
        .build();
    let (handle, _task) = harness.spawn();

    let start = start_in_background(&handle);
    gate.entered().await;
    let leave = leave_in_background(&handle);
    tokio::task::yield_now().await;
    mailbox_drained(&handle).await;
    gate.open();

    assert_eq!(start.await.unwrap(), Err(SessionError::Cancelled));
    leave.await.unwrap().unwrap();

    assert!(harness.journal.calls().contains(&Call::ProviderDisconnect));
    assert!(!harness.provider.is_connected());
    assert_eq!(harness.devices.live_track_count(), 0);
    assert_eq!(harness.binder.live_attachments(), 0);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert_eq!(state.room_state, Some(RoomState::Closed));
    assert!(state.participants.is_empty());
    assert!(handle.roster().borrow().is_empty());
}

#[tokio::test]
async fn test_second_start_during_start_is_rejected() {
    let gate = Gate::new();
    let harness = SessionHarness::builder()
        .exchange(MockExchange::returning("t1", "r1").with_gate(gate.clone()))
        .build();
    let (handle, _task) = harness.spawn();

    let first = start_in_background(&handle);
    gate.entered().await;

    let second = handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await;
    assert_eq!(second, Err(SessionError::SessionAlreadyInProgress));

    gate.open();
    first.await.unwrap().unwrap();

    assert_eq!(harness.exchange.call_count(), 1);
    assert_eq!(harness.provider.connect_count(), 1);
    assert_eq!(
        handle.get_state().await.unwrap().phase,
        SessionPhase::InCall
    );
}

#[tokio::test]
async fn test_toggle_during_start_applies_after_connect() {
    let gate = Gate::new();
    let harness = SessionHarness::builder()
        .provider(MockProvider::new().with_gate(gate.clone()))
        .build();
    let (handle, _task) = harness.spawn();

    let start = start_in_background(&handle);
    gate.entered().await;
    let toggle = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.toggle_audio().await })
    };
    tokio::task::yield_now().await;
    mailbox_drained(&handle).await;
    gate.open();

    start.await.unwrap().unwrap();
    assert_eq!(toggle.await.unwrap().unwrap(), Some(false));

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::InCall);
    assert_eq!(state.audio_enabled, Some(false));
}

#[tokio::test]
async fn test_unmount_during_start_releases_and_stops() {
    let gate = Gate::new();
    let harness = SessionHarness::builder()
        .devices(MockDevices::new().with_gate(gate.clone()))
        .build();
    let (handle, task) = harness.spawn();

    let start = start_in_background(&handle);
    gate.entered().await;
    handle.unmount();
    tokio::task::yield_now().await;
    gate.open();

    assert_eq!(start.await.unwrap(), Err(SessionError::Cancelled));
    task.await.unwrap();

    assert_eq!(harness.devices.live_track_count(), 0);
    assert_eq!(harness.provider.connect_count(), 0);
    assert!(handle.is_unmounted());
}
