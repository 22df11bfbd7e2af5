//! Session Controller.
//!
//! A tokio actor sequencing Credential Exchange -> Local Media Controller ->
//! Room Session and relaying UI intents. It owns the single `RoomSession`
//! instance and the `LocalMediaController`; nothing else holds them.
//!
//! # Serialization
//!
//! Intents are processed one at a time. While a start sequence is suspended
//! (exchange, start-call hook, acquisition, connect) the mailbox keeps being
//! drained:
//!
//! - another start is rejected with `SessionAlreadyInProgress`
//! - a leave, cancellation or loss of every handle is recorded and honoured as
//!   soon as the current suspension settles
//! - toggles are applied once the start has settled
//! - state queries get a `Starting` snapshot
//!
//! Provider events are handled between intents, never during one.

mod messages;

pub use messages::{SessionEvent, SessionMessage, SessionPhase, SessionSnapshot};

use crate::consultation::ConsultationHooks;
use crate::credential::{CredentialExchange, CredentialRequest};
use crate::errors::SessionError;
use crate::media::{CaptureConstraints, CaptureDevices, LocalMediaController};
use crate::observability::metrics;
use crate::registry::ParticipantSummary;
use crate::render::RenderBinder;
use crate::room::{
    ConnectOptions, EventOutcome, MediaRoomProvider, RoomChannels, RoomEvent, RoomNotice,
    RoomSession, RoomState,
};
use chrono::{DateTime, Utc};
use common::types::{Role, TrackKind};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default channel buffer size for the controller mailbox.
const SESSION_CHANNEL_BUFFER: usize = 32;

/// Collaborators the controller drives.
#[derive(Clone)]
pub struct SessionDeps {
    pub exchange: Arc<dyn CredentialExchange>,
    pub hooks: Arc<dyn ConsultationHooks>,
    pub devices: Arc<dyn CaptureDevices>,
    pub provider: Arc<dyn MediaRoomProvider>,
    pub binder: Arc<dyn RenderBinder>,
}

/// Capture and connect settings for every session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub constraints: CaptureConstraints,
    pub connect: ConnectOptions,
    /// Capacity of the session event broadcast channel.
    pub event_buffer: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            connect: ConnectOptions::default(),
            event_buffer: crate::config::DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Handle to a `SessionController`.
#[derive(Clone)]
pub struct SessionControllerHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
    roster: watch::Receiver<Vec<ParticipantSummary>>,
}

impl SessionControllerHandle {
    /// Exchange a credential, acquire devices and connect.
    ///
    /// # Errors
    ///
    /// Any start failure. `Cancelled` if a leave or unmount overtook the start.
    pub async fn start_session(
        &self,
        meeting_or_appointment_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::StartSession {
                meeting_or_appointment_id: meeting_or_appointment_id.to_string(),
                user_id: user_id.to_string(),
                role,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Flip the microphone's enabled flag. `None` if no microphone is held.
    pub async fn toggle_audio(&self) -> Result<Option<bool>, SessionError> {
        self.toggle(TrackKind::Audio).await
    }

    /// Flip the camera's enabled flag. `None` if no camera is held.
    pub async fn toggle_video(&self) -> Result<Option<bool>, SessionError> {
        self.toggle(TrackKind::Video).await
    }

    async fn toggle(&self, kind: TrackKind) -> Result<Option<bool>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::ToggleTrack {
                kind,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Leave the session, or abandon a start in flight.
    pub async fn leave_session(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::LeaveSession { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current session view.
    pub async fn get_state(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Live participant roster.
    #[must_use]
    pub fn roster(&self) -> watch::Receiver<Vec<ParticipantSummary>> {
        self.roster.clone()
    }

    /// The owning view went away: tear everything down and stop the actor.
    pub fn unmount(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the controller was unmounted.
    #[must_use]
    pub fn is_unmounted(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Call identity kept for the end-call hook.
#[derive(Debug)]
struct ActiveCall {
    appointment_id: String,
    user_id: String,
}

/// Intents that arrived while a start was suspended.
#[derive(Default)]
struct PendingIntents {
    leaves: Vec<oneshot::Sender<Result<(), SessionError>>>,
    toggles: Vec<(TrackKind, oneshot::Sender<Result<Option<bool>, SessionError>>)>,
    /// Cancellation fired or every handle was dropped.
    unmount: bool,
}

impl PendingIntents {
    fn abort_requested(&self) -> bool {
        self.unmount || !self.leaves.is_empty()
    }
}

enum Flow {
    Continue,
    Stop,
}

/// The `SessionController` actor.
pub struct SessionController {
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    deps: SessionDeps,
    options: SessionOptions,
    media: LocalMediaController,
    /// Latest Room Session; kept after it closes so its state stays visible.
    room: Option<RoomSession>,
    active: Option<ActiveCall>,
    connected_at: Option<DateTime<Utc>>,
    last_error: Option<SessionError>,
    notice: Option<SessionError>,
    events: broadcast::Sender<SessionEvent>,
    channels: RoomChannels,
    notices: mpsc::UnboundedReceiver<RoomNotice>,
}

impl SessionController {
    /// Spawn a new controller.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        deps: SessionDeps,
        options: SessionOptions,
    ) -> (SessionControllerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (events, _) = broadcast::channel(options.event_buffer.max(1));
        let (roster_tx, roster_rx) = watch::channel(Vec::new());
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let actor = Self {
            receiver,
            cancel_token: cancel_token.clone(),
            media: LocalMediaController::new(
                Arc::clone(&deps.devices),
                Arc::clone(&deps.binder),
            ),
            deps,
            options,
            room: None,
            active: None,
            connected_at: None,
            last_error: None,
            notice: None,
            events: events.clone(),
            channels: RoomChannels {
                notices: notices_tx,
                roster: Arc::new(roster_tx),
            },
            notices: notices_rx,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionControllerHandle {
            sender,
            cancel_token,
            events,
            roster: roster_rx,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "consult.controller")]
    async fn run(mut self) {
        info!(target: "consult.controller", "SessionController started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "consult.controller", "SessionController unmounted");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            if let Flow::Stop = self.handle_message(message).await {
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "consult.controller",
                                "SessionController channel closed, exiting"
                            );
                            break;
                        }
                    }
                }

                event = next_room_event(&mut self.room) => {
                    self.handle_room_event(event).await;
                }
            }

            self.relay_notices();
        }

        self.shutdown().await;

        info!(target: "consult.controller", "SessionController stopped");
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: SessionMessage) -> Flow {
        match message {
            SessionMessage::StartSession {
                meeting_or_appointment_id,
                user_id,
                role,
                respond_to,
            } => {
                return self
                    .handle_start(&meeting_or_appointment_id, &user_id, role, respond_to)
                    .await;
            }

            SessionMessage::ToggleTrack { kind, respond_to } => {
                self.clear_messages();
                let enabled = self.toggle(kind);
                let _ = respond_to.send(Ok(enabled));
            }

            SessionMessage::LeaveSession { respond_to } => {
                self.clear_messages();
                self.leave().await;
                let _ = respond_to.send(Ok(()));
            }

            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }

        Flow::Continue
    }

    async fn handle_start(
        &mut self,
        meeting_or_appointment_id: &str,
        user_id: &str,
        role: Role,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    ) -> Flow {
        self.clear_messages();
        if self.in_call() {
            debug!(target: "consult.controller", "Start rejected, session already open");
            let _ = respond_to.send(Err(SessionError::SessionAlreadyInProgress));
            return Flow::Continue;
        }

        let mut pending = PendingIntents::default();
        let result = self
            .run_start(meeting_or_appointment_id, user_id, role, &mut pending)
            .await;

        match &result {
            Ok(()) => metrics::record_session_start("connected"),
            Err(SessionError::Cancelled) => {
                info!(target: "consult.controller", "Session start cancelled");
                metrics::record_session_start("cancelled");
            }
            Err(e) => {
                metrics::record_session_start(e.error_type());
                self.record_failure(e.clone());
            }
        }
        let _ = respond_to.send(result);
        self.relay_notices();

        for leave in pending.leaves {
            let _ = leave.send(Ok(()));
        }
        for (kind, respond_to) in pending.toggles {
            let enabled = self.toggle(kind);
            let _ = respond_to.send(Ok(enabled));
        }

        if pending.unmount {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    /// The start sequence. Every early return leaves no acquired resource behind.
    #[instrument(skip_all, fields(session_id = %Uuid::new_v4(), role = %role))]
    async fn run_start(
        &mut self,
        meeting_or_appointment_id: &str,
        user_id: &str,
        role: Role,
        pending: &mut PendingIntents,
    ) -> Result<(), SessionError> {
        let request = CredentialRequest::new(meeting_or_appointment_id, user_id, role)?;

        // A new session always gets a fresh Room Session.
        self.room = None;
        self.active = None;
        self.connected_at = None;
        let starting = SessionSnapshot {
            phase: SessionPhase::Starting,
            ..self.snapshot()
        };

        info!(target: "consult.controller", "Starting session");

        let exchange = Arc::clone(&self.deps.exchange);
        let credential = settle(
            exchange.exchange(&request),
            &mut self.receiver,
            &self.cancel_token,
            pending,
            &starting,
        )
        .await?;
        if pending.abort_requested() {
            return Err(SessionError::Cancelled);
        }

        if role == Role::Doctor {
            let hooks = Arc::clone(&self.deps.hooks);
            settle(
                hooks.call_started(&request.meeting_or_appointment_id, &request.user_id),
                &mut self.receiver,
                &self.cancel_token,
                pending,
                &starting,
            )
            .await?;
            if pending.abort_requested() {
                return Err(SessionError::Cancelled);
            }
        }

        let acquired = settle(
            self.media.acquire(&self.options.constraints),
            &mut self.receiver,
            &self.cancel_token,
            pending,
            &starting,
        )
        .await
        .map(|set| set.len());
        if let Err(e) = acquired {
            self.media.release();
            return Err(e);
        }
        if pending.abort_requested() {
            self.media.release();
            return Err(SessionError::Cancelled);
        }

        let mut room = RoomSession::new(Arc::clone(&self.deps.binder), self.channels.clone());
        let tracks = self.media.publishable();
        let provider = Arc::clone(&self.deps.provider);
        let connected = settle(
            room.connect(provider.as_ref(), credential, tracks, &self.options.connect),
            &mut self.receiver,
            &self.cancel_token,
            pending,
            &starting,
        )
        .await;

        if let Err(e) = connected {
            self.media.release();
            self.room = Some(room);
            return Err(e);
        }
        if pending.abort_requested() {
            info!(
                target: "consult.controller",
                "Leave arrived during connect, disconnecting"
            );
            room.disconnect(&mut self.media).await;
            self.room = Some(room);
            return Err(SessionError::Cancelled);
        }

        info!(
            target: "consult.controller",
            room_id = ?room.room_id(),
            participants = room.registry().len(),
            "Session connected"
        );
        self.room = Some(room);
        self.active = Some(ActiveCall {
            appointment_id: request.meeting_or_appointment_id,
            user_id: request.user_id,
        });
        self.connected_at = Some(Utc::now());
        Ok(())
    }

    fn toggle(&mut self, kind: TrackKind) -> Option<bool> {
        let enabled = self.media.toggle(kind)?;
        let _ = self
            .events
            .send(SessionEvent::LocalTrackToggled { kind, enabled });
        Some(enabled)
    }

    /// User-initiated leave. Outside a call this only releases local tracks.
    async fn leave(&mut self) {
        match self.room.as_mut() {
            Some(room) if room.state() == RoomState::Connected => {
                room.disconnect(&mut self.media).await;
                if let Some(call) = self.active.take() {
                    let hooks = Arc::clone(&self.deps.hooks);
                    if let Err(e) = hooks.call_ended(&call.appointment_id, &call.user_id).await {
                        warn!(target: "consult.controller", error = %e, "End-call hook failed");
                    }
                }
            }
            _ => self.media.release(),
        }
        self.active = None;
        self.connected_at = None;
    }

    async fn handle_room_event(&mut self, event: Option<RoomEvent>) {
        let Some(room) = self.room.as_mut() else {
            return;
        };

        let outcome = match event {
            Some(event) => room.handle_event(event),
            None => {
                warn!(target: "consult.controller", "Provider event stream closed");
                EventOutcome::Failed(SessionError::UnexpectedProviderError(
                    "provider event stream closed".to_string(),
                ))
            }
        };

        match outcome {
            EventOutcome::Continue => {}
            EventOutcome::RemoteClosed { reason } => {
                room.close_by_remote(&mut self.media).await;
                self.active = None;
                self.connected_at = None;
                if let Some(reason) = reason.as_ref() {
                    self.notice = Some(SessionError::RoomClosedByRemote(reason.clone()));
                }
                let _ = self.events.send(SessionEvent::ClosedByRemote { reason });
            }
            EventOutcome::Failed(err) => {
                room.fail(&mut self.media).await;
                self.active = None;
                self.connected_at = None;
                self.record_failure(err.clone());
                let _ = self.events.send(SessionEvent::Failed(err));
            }
        }
    }

    /// Unmount: the full disconnect path, whether or not a call was established.
    async fn shutdown(&mut self) {
        if let Some(room) = self.room.as_mut() {
            if room.state() == RoomState::Connected {
                room.disconnect(&mut self.media).await;
            }
        }
        self.media.release();
        self.active = None;
        self.relay_notices();
    }

    fn in_call(&self) -> bool {
        self.room
            .as_ref()
            .is_some_and(|room| room.state() == RoomState::Connected)
    }

    fn clear_messages(&mut self) {
        self.last_error = None;
        self.notice = None;
    }

    fn record_failure(&mut self, err: SessionError) {
        warn!(
            target: "consult.controller",
            error_type = err.error_type(),
            error = %err,
            "Session error"
        );
        metrics::record_error(err.error_type());
        self.last_error = Some(err);
    }

    fn relay_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            let _ = self.events.send(SessionEvent::Room(notice));
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let room = self.room.as_ref();
        SessionSnapshot {
            phase: if self.in_call() {
                SessionPhase::InCall
            } else {
                SessionPhase::Idle
            },
            room_state: room.map(RoomSession::state),
            room_id: room.and_then(|r| r.room_id().map(str::to_string)),
            participants: room.map(|r| r.registry().summaries()).unwrap_or_default(),
            local_tracks: self.media.held_track_count(),
            audio_enabled: self.media.is_enabled(TrackKind::Audio),
            video_enabled: self.media.is_enabled(TrackKind::Video),
            error: self.last_error.clone(),
            notice: self.notice.clone(),
            connected_at: self.connected_at,
        }
    }
}

/// Next event of the current room, pending forever without one.
async fn next_room_event(room: &mut Option<RoomSession>) -> Option<RoomEvent> {
    match room {
        Some(room) => room.next_event().await,
        None => std::future::pending().await,
    }
}

/// Drive `fut` to completion while answering the mailbox.
///
/// The future is never dropped early: a leave or unmount is only recorded in
/// `pending`, and the caller decides what to undo once `fut` has settled.
async fn settle<F: Future>(
    fut: F,
    receiver: &mut mpsc::Receiver<SessionMessage>,
    cancel_token: &CancellationToken,
    pending: &mut PendingIntents,
    starting: &SessionSnapshot,
) -> F::Output {
    tokio::pin!(fut);

    loop {
        tokio::select! {
            biased;

            output = &mut fut => return output,

            () = cancel_token.cancelled(), if !pending.unmount => {
                debug!(target: "consult.controller", "Unmount during start recorded");
                pending.unmount = true;
            }

            msg = receiver.recv(), if !pending.unmount => {
                match msg {
                    Some(SessionMessage::StartSession { respond_to, .. }) => {
                        let _ = respond_to.send(Err(SessionError::SessionAlreadyInProgress));
                    }
                    Some(SessionMessage::ToggleTrack { kind, respond_to }) => {
                        pending.toggles.push((kind, respond_to));
                    }
                    Some(SessionMessage::LeaveSession { respond_to }) => {
                        debug!(target: "consult.controller", "Leave during start recorded");
                        pending.leaves.push(respond_to);
                    }
                    Some(SessionMessage::GetState { respond_to }) => {
                        let _ = respond_to.send(starting.clone());
                    }
                    None => {
                        pending.unmount = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::consultation::NoopHooks;
    use crate::credential::SessionCredential;
    use crate::media::DeviceError;
    use crate::render::SurfaceBinder;
    use crate::room::{ProviderError, RoomLink};
    use async_trait::async_trait;
    use common::types::TrackHandle;

    struct RejectingExchange;

    #[async_trait]
    impl CredentialExchange for RejectingExchange {
        async fn exchange(
            &self,
            _: &CredentialRequest,
        ) -> Result<SessionCredential, SessionError> {
            Err(SessionError::ExchangeUnavailable("connection refused".to_string()))
        }
    }

    struct NoDevices;

    #[async_trait]
    impl CaptureDevices for NoDevices {
        async fn open(&self, _: &CaptureConstraints) -> Result<Vec<TrackHandle>, DeviceError> {
            Err(DeviceError::NotFound("no camera".to_string()))
        }

        fn stop(&self, _: &TrackHandle) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    struct UnreachableProvider;

    #[async_trait]
    impl MediaRoomProvider for UnreachableProvider {
        async fn connect(
            &self,
            _: &SessionCredential,
            _: &[crate::media::LocalTrack],
            _: &ConnectOptions,
        ) -> Result<RoomLink, ProviderError> {
            Err(ProviderError::Connect("unreachable".to_string()))
        }
    }

    fn spawn() -> (SessionControllerHandle, JoinHandle<()>) {
        SessionController::spawn(
            SessionDeps {
                exchange: Arc::new(RejectingExchange),
                hooks: Arc::new(NoopHooks),
                devices: Arc::new(NoDevices),
                provider: Arc::new(UnreachableProvider),
                binder: Arc::new(SurfaceBinder::new()),
            },
            SessionOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_idle_snapshot() {
        let (handle, _task) = spawn();

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(state.room_state, None);
        assert_eq!(state.local_tracks, 0);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_exchange_failure_is_surfaced_then_cleared_by_next_intent() {
        let (handle, _task) = spawn();

        let result = handle.start_session("appt-1", "patient-7", Role::Patient).await;
        assert!(matches!(result, Err(SessionError::ExchangeUnavailable(_))));

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(
            state.error_message().as_deref(),
            Some("Could not reach the consultation service, please try again")
        );

        assert_eq!(handle.toggle_audio().await.unwrap(), None);
        assert!(handle.get_state().await.unwrap().error.is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let (handle, _task) = spawn();

        let result = handle.start_session("  ", "patient-7", Role::Patient).await;
        assert!(matches!(result, Err(SessionError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_leave_when_idle_is_ok() {
        let (handle, _task) = spawn();
        handle.leave_session().await.unwrap();
        assert_eq!(handle.get_state().await.unwrap().phase, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_unmount_stops_actor() {
        let (handle, task) = spawn();

        handle.unmount();
        task.await.unwrap();

        assert!(handle.is_unmounted());
        assert!(matches!(
            handle.get_state().await,
            Err(SessionError::Internal(_))
        ));
    }
}
