use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::proto::{
    now_ms, AttachmentId, HistoryEntry, OutputChannel, OutputEvent, SessionId, ViewerId,
};
use crate::transport::SessionHost;

use super::directory::SessionDirectory;
use super::history::HistoryFetcher;
use super::mux::{OutputMux, RecvError, StreamEvent};
use super::relay::{spawn_relay, RelayMsg};

/// Why an attachment ended up in [`AttachmentState::Error`]. Distinguishes
/// "your session ended" from "network blip" so the UI can offer the right
/// recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachFailure {
    NotFound,
    Transport(String),
    Timeout,
    RemoteTermination,
}

impl From<&SessionError> for AttachFailure {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => AttachFailure::NotFound,
            SessionError::RemoteTermination(_) => AttachFailure::RemoteTermination,
            SessionError::Timeout(_) => AttachFailure::Timeout,
            other => AttachFailure::Transport(other.to_string()),
        }
    }
}

/// Per-surface connection lifecycle. `Error` is terminal for this
/// attachment instance; retry means creating a new attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentState {
    Disconnected,
    Connecting,
    ReplayingHistory,
    Live,
    Detaching,
    Error(AttachFailure),
}

impl AttachmentState {
    fn name(&self) -> &'static str {
        match self {
            AttachmentState::Disconnected => "disconnected",
            AttachmentState::Connecting => "connecting",
            AttachmentState::ReplayingHistory => "replaying_history",
            AttachmentState::Live => "live",
            AttachmentState::Detaching => "detaching",
            AttachmentState::Error(_) => "error",
        }
    }
}

/// What the attachment calls back into: the rendering collaborator.
///
/// The surface paints bytes and chrome; it must not infer protocol state
/// from byte content. History entries arrive in original order, strictly
/// before the first live event.
pub trait TerminalSurface: Send + Sync {
    fn on_history_entry(&self, entry: &HistoryEntry);
    fn on_live_event(&self, event: &OutputEvent);
    fn on_state_changed(&self, state: &AttachmentState);

    /// A single input/resize/control delivery failed. Informational; the
    /// attachment stays live.
    fn on_input_error(&self, error: &SessionError) {
        let _ = error;
    }
}

struct AttachmentInner {
    id: AttachmentId,
    session: SessionId,
    viewer: ViewerId,
    host: Arc<dyn SessionHost>,
    surface: Arc<dyn TerminalSurface>,
    state_tx: watch::Sender<AttachmentState>,
    relay_tx: mpsc::Sender<RelayMsg>,
    cancel: CancellationToken,
    detached: AtomicBool,
    /// Whether this attachment currently holds a viewer registration on the
    /// host. Swapped to false by whoever takes responsibility for the leave
    /// call, so leave happens exactly once.
    joined: AtomicBool,
    /// The connect/live task. `detach` awaits it after cancelling, so an
    /// in-flight join is fully settled before detach returns.
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl AttachmentInner {
    fn state(&self) -> AttachmentState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, state: AttachmentState) {
        tracing::debug!(
            attachment = %self.id,
            session = %self.session,
            state = state.name(),
            "state change"
        );
        self.state_tx.send_replace(state.clone());
        self.surface.on_state_changed(&state);
    }

    /// Enter the terminal `Error` state, unless a detach already won the
    /// race (a stale failure must not overwrite `Disconnected`).
    fn fail(&self, failure: AttachFailure) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::info!(
            attachment = %self.id,
            session = %self.session,
            failure = ?failure,
            "attachment failed"
        );
        self.set_state(AttachmentState::Error(failure));
    }

    async fn leave_best_effort(&self) {
        if !self.joined.swap(false, Ordering::SeqCst) {
            return;
        }
        self.notify_leave().await;
    }

    /// Settle a join whose outcome was never observed. The host may or may
    /// not have registered the viewer; leaving an unregistered viewer is a
    /// no-op there, so an explicit leave resolves it either way.
    async fn leave_unconditional(&self) {
        self.joined.store(false, Ordering::SeqCst);
        self.notify_leave().await;
    }

    async fn notify_leave(&self) {
        if let Err(e) = self.host.leave_session(&self.session, self.viewer).await {
            tracing::warn!(
                session = %self.session,
                viewer = %self.viewer,
                error = %e,
                "leave notification failed"
            );
        }
    }

    async fn detach(&self) {
        // Second and later calls are no-ops.
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }

        let transition = !matches!(
            self.state(),
            AttachmentState::Error(_) | AttachmentState::Disconnected
        );
        if transition {
            self.set_state(AttachmentState::Detaching);
        }

        // Cancel the connect/live task and wait for it to settle: an
        // abandoned in-flight join must resolve to a leave before a
        // re-attach by the same viewer is allowed to join again.
        self.cancel.cancel();
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.leave_best_effort().await;

        if transition {
            self.set_state(AttachmentState::Disconnected);
        }
        tracing::info!(attachment = %self.id, session = %self.session, "detached");
    }
}

/// One display surface's connection to one session. Owned exclusively by
/// the surface that created it.
pub struct Attachment {
    inner: Arc<AttachmentInner>,
}

impl Attachment {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        session: SessionId,
        viewer: ViewerId,
        host: Arc<dyn SessionHost>,
        directory: Arc<SessionDirectory>,
        mux: Arc<OutputMux>,
        history: Arc<HistoryFetcher>,
        surface: Arc<dyn TerminalSurface>,
        config: &ClientConfig,
    ) -> Result<Self, SessionError> {
        if session.is_empty() {
            return Err(SessionError::InvalidSession);
        }

        let cancel = CancellationToken::new();
        let relay_tx = spawn_relay(
            host.clone(),
            session.clone(),
            surface.clone(),
            cancel.clone(),
            config.relay_capacity,
        );
        let (state_tx, _) = watch::channel(AttachmentState::Disconnected);

        let inner = Arc::new(AttachmentInner {
            id: AttachmentId::new(),
            session,
            viewer,
            host,
            surface,
            state_tx,
            relay_tx,
            cancel,
            detached: AtomicBool::new(false),
            joined: AtomicBool::new(false),
            task: StdMutex::new(None),
        });

        let task = tokio::spawn(run_attachment(
            inner.clone(),
            directory,
            mux,
            history,
            config.connect_timeout(),
            config.history_timeout(),
            config.history_limit,
        ));
        *inner.task.lock().unwrap() = Some(task);

        Ok(Self { inner })
    }

    pub fn id(&self) -> AttachmentId {
        self.inner.id
    }

    pub fn session(&self) -> &SessionId {
        &self.inner.session
    }

    pub fn viewer(&self) -> ViewerId {
        self.inner.viewer
    }

    pub fn state(&self) -> AttachmentState {
        self.inner.state()
    }

    /// Observe state transitions, e.g. to await `Live`.
    pub fn subscribe_state(&self) -> watch::Receiver<AttachmentState> {
        self.inner.state_tx.subscribe()
    }

    /// Forward keystrokes to the session. Preserves per-attachment call
    /// order; a delivery failure surfaces via `on_input_error` without
    /// touching the connection state.
    pub fn send_input(&self, data: Bytes) -> Result<(), SessionError> {
        self.enqueue(RelayMsg::Input(data))
    }

    /// Inbound call from the renderer when its surface changed size.
    pub fn request_resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        self.enqueue(RelayMsg::Resize { rows, cols })
    }

    pub fn send_interrupt(&self) -> Result<(), SessionError> {
        self.enqueue(RelayMsg::Interrupt)
    }

    pub fn send_eof(&self) -> Result<(), SessionError> {
        self.enqueue(RelayMsg::Eof)
    }

    fn enqueue(&self, msg: RelayMsg) -> Result<(), SessionError> {
        if self.inner.state() != AttachmentState::Live {
            return Err(SessionError::NotLive);
        }
        self.inner
            .relay_tx
            .try_send(msg)
            .map_err(|_| SessionError::InputDelivery("relay queue full".to_string()))
    }

    /// Leave the session without affecting it or its other viewers.
    /// Idempotent; never fails from the caller's point of view, the local
    /// resources are released regardless of host acknowledgment.
    pub async fn detach(&self) {
        self.inner.detach().await;
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if self.inner.detached.load(Ordering::SeqCst) {
            return;
        }
        // Surface teardown without an explicit detach still detaches.
        let inner = self.inner.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { inner.detach().await });
        } else {
            inner.cancel.cancel();
        }
    }
}

/// Connect sequence and live loop, as one task per attachment.
///
/// Seam strategy: subscribe to the multiplexer *before* fetching history,
/// then drop every live event whose seq is covered by the replay. The
/// subscription buffers whatever arrives during the fetch, so nothing can
/// fall in the gap; the seq filter removes the overlap.
async fn run_attachment(
    inner: Arc<AttachmentInner>,
    directory: Arc<SessionDirectory>,
    mux: Arc<OutputMux>,
    history: Arc<HistoryFetcher>,
    connect_timeout: Duration,
    history_timeout: Duration,
    history_limit: usize,
) {
    // Detach may complete before this task first runs; stay Disconnected.
    if inner.cancel.is_cancelled() {
        return;
    }
    inner.set_state(AttachmentState::Connecting);

    let meta = tokio::select! {
        // A response landing after detach is stale, discard it.
        _ = inner.cancel.cancelled() => return,
        res = timeout(connect_timeout, directory.get(&inner.session)) => match res {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                inner.fail(AttachFailure::from(&e));
                return;
            }
            Err(_) => {
                inner.fail(AttachFailure::Timeout);
                return;
            }
        },
    };

    tokio::select! {
        _ = inner.cancel.cancelled() => {
            // Detach raced the join and its outcome was never observed;
            // settle before detach is allowed to return.
            inner.leave_unconditional().await;
            return;
        }
        res = timeout(
            connect_timeout,
            inner.host.join_session(&inner.session, inner.viewer),
        ) => match res {
            Ok(Ok(())) => inner.joined.store(true, Ordering::SeqCst),
            Ok(Err(e)) => {
                inner.fail(AttachFailure::from(&SessionError::from(e)));
                return;
            }
            Err(_) => {
                inner.fail(AttachFailure::Timeout);
                return;
            }
        },
    }
    if inner.cancel.is_cancelled() {
        inner.leave_best_effort().await;
        return;
    }

    let mut sub = mux.subscribe(&inner.session).await;

    inner.set_state(AttachmentState::ReplayingHistory);
    let entries = tokio::select! {
        // Detach awaits this task and then issues the leave itself.
        _ = inner.cancel.cancelled() => return,
        res = timeout(
            history_timeout,
            history.fetch(&inner.session, history_limit),
        ) => match res {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                inner.leave_best_effort().await;
                inner.fail(AttachFailure::from(&e));
                return;
            }
            Err(_) => {
                inner.leave_best_effort().await;
                inner.fail(AttachFailure::Timeout);
                return;
            }
        },
    };

    let mut last_seq = 0u64;
    for entry in &entries {
        inner.surface.on_history_entry(entry);
        last_seq = entry.seq;
    }

    tracing::info!(
        attachment = %inner.id,
        session = %inner.session,
        command = %meta.command,
        replayed = entries.len(),
        "attachment live"
    );
    inner.set_state(AttachmentState::Live);

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            recv = sub.recv() => match recv {
                Ok(StreamEvent::Output(event)) => {
                    // Replay overlap: already written from history.
                    if event.seq <= last_seq {
                        continue;
                    }
                    last_seq = event.seq;
                    inner.surface.on_live_event(&event);
                }
                Ok(StreamEvent::Terminated { .. }) => {
                    // The viewer set died with the session; nothing to leave.
                    inner.joined.store(false, Ordering::SeqCst);
                    inner.fail(AttachFailure::RemoteTermination);
                    return;
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(
                        session = %inner.session,
                        dropped = n,
                        "subscriber lagging, dropped events"
                    );
                    inner.surface.on_live_event(&gap_notice(&inner.session, last_seq + 1, n));
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// Synthetic marker injected where a lagging subscriber lost events.
/// Takes the first dropped position as its seq, which never collides with
/// a delivered event, so a seq-deduplicating surface still renders it.
fn gap_notice(session: &SessionId, first_missing: u64, dropped: u64) -> OutputEvent {
    OutputEvent {
        session: session.clone(),
        seq: first_missing,
        timestamp_ms: now_ms(),
        channel: OutputChannel::SystemNotice,
        payload: Bytes::from(format!(
            "\r\n\x1b[2m[output dropped: {} events]\x1b[0m\r\n",
            dropped
        )),
    }
}
