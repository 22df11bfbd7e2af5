//! Integration tests for the session lifecycle.
//!
//! Drives a real `SessionController` against the mocks in
//! `consult-test-utils` and checks the observable call order.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::time::Duration;

use common::types::{Role, TrackKind};
use consult_client::controller::{SessionEvent, SessionPhase};
use consult_client::errors::SessionError;
use consult_client::room::{RemoteParticipant, RoomEvent, RoomNotice, RoomState};
use consult_test_utils::fixtures::{
    doctor_with_video, video_handle, SessionHarness, APPOINTMENT_ID, DOCTOR_ID, PATIENT_ID,
};
use consult_test_utils::{Call, MockDevices, MockExchange, MockHooks, MockProvider};
use tokio::sync::broadcast;

// ============================================================================
// Helpers
// ============================================================================

/// Wait for the first event matching `predicate`.
async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

// ============================================================================
// Start
// ============================================================================

#[tokio::test]
async fn test_patient_joins_room_with_doctor_present() {
    let harness = SessionHarness::builder()
        .with_participant(doctor_with_video())
        .build();
    let (handle, _task) = harness.spawn();

    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();

    let calls = harness.journal.calls();
    assert_eq!(
        calls.first(),
        Some(&Call::Exchange {
            id: APPOINTMENT_ID.to_string(),
            user_id: PATIENT_ID.to_string(),
            role: Role::Patient,
        })
    );
    assert!(calls.contains(&Call::Connect {
        room_id: "r1".to_string(),
        published: 2,
    }));
    // Patients never call the start-call hook.
    assert_eq!(harness.hooks.started_count(), 0);

    assert_eq!(harness.binder.remote_attach_count(), 1);
    assert!(calls.contains(&Call::Attach {
        surface: format!("remote:{DOCTOR_ID}"),
        handle: video_handle("doctor-video"),
    }));

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::InCall);
    assert_eq!(state.room_state, Some(RoomState::Connected));
    assert_eq!(state.room_id.as_deref(), Some("r1"));
    assert_eq!(state.participants.len(), 1);
    assert_eq!(state.participants[0].identity, DOCTOR_ID);
    assert_eq!(state.participants[0].subscribed, vec![TrackKind::Video]);
    assert_eq!(state.local_tracks, 2);
    assert!(state.connected_at.is_some());
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_empty_room_is_connected() {
    let harness = SessionHarness::builder().build();
    let (handle, _task) = harness.spawn();

    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.room_state, Some(RoomState::Connected));
    assert!(state.participants.is_empty());
    assert!(handle.roster().borrow().is_empty());
    assert_eq!(harness.binder.remote_attach_count(), 0);
}

#[tokio::test]
async fn test_doctor_start_calls_hook_before_acquiring_devices() {
    let harness = SessionHarness::builder().build();
    let (handle, _task) = harness.spawn();

    handle
        .start_session(APPOINTMENT_ID, DOCTOR_ID, Role::Doctor)
        .await
        .unwrap();

    let journal = &harness.journal;
    let hook = journal
        .position(|c| {
            *c == Call::StartCallHook {
                appointment_id: APPOINTMENT_ID.to_string(),
                user_id: DOCTOR_ID.to_string(),
            }
        })
        .unwrap();
    let exchange = journal.position(|c| matches!(c, Call::Exchange { .. })).unwrap();
    let open = journal.position(|c| *c == Call::OpenDevices).unwrap();
    assert!(exchange < hook);
    assert!(hook < open);
}

#[tokio::test]
async fn test_doctor_hook_failure_acquires_nothing() {
    let harness = SessionHarness::builder()
        .hooks(MockHooks::new().failing_start())
        .build();
    let (handle, _task) = harness.spawn();

    let result = handle
        .start_session(APPOINTMENT_ID, DOCTOR_ID, Role::Doctor)
        .await;

    assert!(matches!(result, Err(SessionError::StartCallFailed(_))));
    assert_eq!(harness.devices.open_count(), 0);
    assert_eq!(harness.provider.connect_count(), 0);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert_eq!(
        state.error_message().as_deref(),
        Some("Failed to start the consultation")
    );
}

#[tokio::test]
async fn test_exchange_rejection_connects_nothing() {
    let harness = SessionHarness::builder()
        .exchange(MockExchange::failing(SessionError::ExchangeRejected(
            "Status 403".to_string(),
        )))
        .build();
    let (handle, _task) = harness.spawn();

    let result = handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await;

    assert!(matches!(result, Err(SessionError::ExchangeRejected(_))));
    assert_eq!(harness.devices.open_count(), 0);
    assert_eq!(harness.provider.connect_count(), 0);
    assert_eq!(handle.get_state().await.unwrap().room_state, None);
}

#[tokio::test]
async fn test_device_denied_does_not_connect() {
    let harness = SessionHarness::builder()
        .devices(MockDevices::denying())
        .build();
    let (handle, _task) = harness.spawn();

    let result = handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await;

    assert!(matches!(result, Err(SessionError::DeviceAccessDenied(_))));
    assert_eq!(harness.provider.connect_count(), 0);
    assert_eq!(harness.devices.live_track_count(), 0);

    let state = handle.get_state().await.unwrap();
    assert_eq!(
        state.error_message().as_deref(),
        Some("Failed to access camera/microphone. Check permissions.")
    );
}

#[tokio::test]
async fn test_connect_failure_releases_tracks() {
    let harness = SessionHarness::builder()
        .provider(MockProvider::new().failing_connect())
        .with_participant(doctor_with_video())
        .build();
    let (handle, _task) = harness.spawn();

    let result = handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await;

    assert!(matches!(result, Err(SessionError::RoomConnectFailed(_))));
    assert_eq!(harness.devices.live_track_count(), 0);
    assert_eq!(harness.binder.live_attachments(), 0);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert_eq!(state.room_state, Some(RoomState::Failed));
    assert!(state.participants.is_empty());
    assert_eq!(state.local_tracks, 0);
}

#[tokio::test]
async fn test_second_start_in_call_is_rejected_without_error() {
    let harness = SessionHarness::builder().build();
    let (handle, _task) = harness.spawn();

    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();
    let result = handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await;

    assert_eq!(result, Err(SessionError::SessionAlreadyInProgress));
    assert_eq!(harness.exchange.call_count(), 1);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::InCall);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_new_session_after_leave_gets_fresh_room() {
    let harness = SessionHarness::builder()
        .with_participant(doctor_with_video())
        .build();
    let (handle, _task) = harness.spawn();

    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();
    handle.leave_session().await.unwrap();
    assert_eq!(
        handle.get_state().await.unwrap().room_state,
        Some(RoomState::Closed)
    );

    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.room_state, Some(RoomState::Connected));
    assert_eq!(state.participants.len(), 1);
    assert_eq!(harness.provider.connect_count(), 2);
    assert_eq!(harness.devices.live_track_count(), 2);
}

// ============================================================================
// In call
// ============================================================================

#[tokio::test]
async fn test_toggle_video_twice_restores_without_network() {
    let harness = SessionHarness::builder().build();
    let (handle, _task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();
    let mut events = handle.subscribe_events();
    let before = harness.journal.len();

    assert_eq!(handle.toggle_video().await.unwrap(), Some(false));
    let published_video = harness
        .provider
        .published()
        .into_iter()
        .find(|t| t.kind() == TrackKind::Video)
        .unwrap();
    assert!(!published_video.is_enabled());

    assert_eq!(handle.toggle_video().await.unwrap(), Some(true));
    assert!(published_video.is_enabled());

    assert!(harness.journal.since(before).iter().all(|c| !c.is_network()));
    assert_eq!(harness.devices.live_track_count(), 2);

    let toggled = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::LocalTrackToggled { .. })
    })
    .await;
    assert_eq!(
        toggled,
        SessionEvent::LocalTrackToggled {
            kind: TrackKind::Video,
            enabled: false,
        }
    );

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.video_enabled, Some(true));
    assert_eq!(state.audio_enabled, Some(true));
}

#[tokio::test]
async fn test_participant_joining_later_is_rendered() {
    let harness = SessionHarness::builder().build();
    let (handle, _task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();
    let mut events = handle.subscribe_events();

    assert!(harness
        .provider
        .emit(RoomEvent::ParticipantConnected(RemoteParticipant::new(DOCTOR_ID))));
    assert!(harness.provider.emit(RoomEvent::TrackSubscribed {
        identity: DOCTOR_ID.to_string(),
        sid: "TR_v1".to_string(),
        handle: video_handle("late-video"),
    }));
    // A replayed subscription for the same handle is ignored.
    assert!(harness.provider.emit(RoomEvent::TrackSubscribed {
        identity: DOCTOR_ID.to_string(),
        sid: "TR_v1".to_string(),
        handle: video_handle("late-video"),
    }));

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Room(RoomNotice::TrackAttached { .. }))
    })
    .await;
    let state = handle.get_state().await.unwrap();

    assert_eq!(harness.binder.remote_attach_count(), 1);
    assert_eq!(state.participants.len(), 1);
    assert_eq!(state.participants[0].subscribed, vec![TrackKind::Video]);
}

#[tokio::test]
async fn test_participant_left_detaches_before_removal() {
    let harness = SessionHarness::builder()
        .with_participant(doctor_with_video())
        .build();
    let (handle, _task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();
    let mut events = handle.subscribe_events();

    harness.provider.emit(RoomEvent::ParticipantDisconnected {
        identity: DOCTOR_ID.to_string(),
    });
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Room(RoomNotice::ParticipantLeft { .. }))
    })
    .await;

    let detach = harness
        .journal
        .calls()
        .into_iter()
        .find_map(|c| match c {
            Call::Detach {
                surface,
                listed_in_roster,
                ..
            } if surface == format!("remote:{DOCTOR_ID}") => Some(listed_in_roster),
            _ => None,
        })
        .unwrap();
    assert_eq!(detach, Some(true));
    assert!(handle.roster().borrow().is_empty());

    // The call itself goes on.
    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::InCall);
    assert!(state.participants.is_empty());
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_leave_runs_ordered_teardown() {
    let harness = SessionHarness::builder()
        .with_participant(doctor_with_video())
        .build();
    let (handle, _task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();
    let before = harness.journal.len();

    handle.leave_session().await.unwrap();

    let journal = &harness.journal;
    let remote_detach = journal
        .last_position(|c| matches!(c, Call::Detach { surface, .. } if surface.starts_with("remote:")))
        .unwrap();
    let preview_detach = journal
        .last_position(|c| matches!(c, Call::Detach { surface, .. } if surface == "local:preview"))
        .unwrap();
    let unpublish = journal.last_position(|c| *c == Call::Unpublish).unwrap();
    let disconnect = journal.last_position(|c| *c == Call::ProviderDisconnect).unwrap();
    let first_stop = journal
        .position(|c| matches!(c, Call::StopTrack(_)))
        .unwrap();

    assert!(remote_detach >= before);
    assert!(remote_detach < unpublish);
    assert!(preview_detach < unpublish);
    assert!(unpublish < disconnect);
    assert!(disconnect < first_stop);

    assert_eq!(harness.devices.live_track_count(), 0);
    assert_eq!(harness.binder.live_attachments(), 0);
    assert!(!harness.provider.is_connected());

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert_eq!(state.room_state, Some(RoomState::Closed));
    assert!(state.participants.is_empty());
    assert_eq!(state.local_tracks, 0);
    assert!(state.connected_at.is_none());
}

#[tokio::test]
async fn test_leave_twice_is_same_as_once() {
    let harness = SessionHarness::builder().build();
    let (handle, _task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();

    handle.leave_session().await.unwrap();
    let after_first = harness.journal.len();
    handle.leave_session().await.unwrap();

    assert_eq!(harness.journal.len(), after_first);
    assert_eq!(
        harness.journal.count(|c| matches!(c, Call::StopTrack(_))),
        2
    );
}

#[tokio::test]
async fn test_doctor_leave_calls_end_hook() {
    let harness = SessionHarness::builder()
        .hooks(MockHooks::new().failing_end())
        .build();
    let (handle, _task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, DOCTOR_ID, Role::Doctor)
        .await
        .unwrap();

    // A failing end hook does not fail the leave.
    handle.leave_session().await.unwrap();

    assert_eq!(harness.hooks.ended_count(), 1);
    let disconnect = harness
        .journal
        .position(|c| *c == Call::ProviderDisconnect)
        .unwrap();
    let end_hook = harness
        .journal
        .position(|c| matches!(c, Call::EndCallHook { .. }))
        .unwrap();
    assert!(disconnect < end_hook);
    assert!(handle.get_state().await.unwrap().error.is_none());
}

#[tokio::test]
async fn test_remote_close_tears_down_and_notifies() {
    let harness = SessionHarness::builder()
        .with_participant(doctor_with_video())
        .build();
    let (handle, _task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();
    let mut events = handle.subscribe_events();

    harness.provider.emit(RoomEvent::Disconnected {
        reason: Some("host ended".to_string()),
    });
    let closed = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ClosedByRemote { .. })
    })
    .await;
    assert_eq!(
        closed,
        SessionEvent::ClosedByRemote {
            reason: Some("host ended".to_string())
        }
    );

    assert_eq!(harness.devices.live_track_count(), 0);
    assert_eq!(harness.binder.live_attachments(), 0);
    assert_eq!(harness.hooks.ended_count(), 0);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert_eq!(state.room_state, Some(RoomState::Closed));
    assert!(state.error.is_none());
    assert_eq!(
        state.notice,
        Some(SessionError::RoomClosedByRemote("host ended".to_string()))
    );
}

#[tokio::test]
async fn test_provider_error_fails_session_after_teardown() {
    let harness = SessionHarness::builder()
        .provider(MockProvider::new().failing_unpublish())
        .with_participant(doctor_with_video())
        .build();
    let (handle, _task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();
    let mut events = handle.subscribe_events();

    harness.provider.emit(RoomEvent::Error {
        message: "ice failed".to_string(),
    });
    wait_for(&mut events, |e| matches!(e, SessionEvent::Failed(_))).await;

    // The unpublish failure did not stop the remaining steps.
    assert!(harness
        .journal
        .calls()
        .contains(&Call::ProviderDisconnect));
    assert_eq!(harness.devices.live_track_count(), 0);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.room_state, Some(RoomState::Failed));
    assert!(matches!(
        state.error,
        Some(SessionError::UnexpectedProviderError(_))
    ));
    assert!(state.participants.is_empty());
}

#[tokio::test]
async fn test_event_stream_loss_fails_session() {
    let harness = SessionHarness::builder().build();
    let (handle, _task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();
    let mut events = handle.subscribe_events();

    harness.provider.drop_event_stream();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Failed(_))).await;

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.room_state, Some(RoomState::Failed));
    assert_eq!(harness.devices.live_track_count(), 0);
}

#[tokio::test]
async fn test_unmount_in_call_tears_down() {
    let harness = SessionHarness::builder()
        .with_participant(doctor_with_video())
        .build();
    let (handle, task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();

    handle.unmount();
    task.await.unwrap();

    assert!(harness.journal.calls().contains(&Call::ProviderDisconnect));
    assert_eq!(harness.devices.live_track_count(), 0);
    assert_eq!(harness.binder.live_attachments(), 0);
}

#[tokio::test]
async fn test_dropping_every_handle_tears_down() {
    let harness = SessionHarness::builder().build();
    let (handle, task) = harness.spawn();
    handle
        .start_session(APPOINTMENT_ID, PATIENT_ID, Role::Patient)
        .await
        .unwrap();

    drop(handle);
    task.await.unwrap();

    assert_eq!(harness.devices.live_track_count(), 0);
    assert!(!harness.provider.is_connected());
}
