#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, Notify};

use termgrid::proto::now_ms;
use termgrid::{
    AttachmentState, CreateSession, GridId, HistoryEntry, HostEvent, OutputChannel, OutputEvent,
    SessionError, SessionHost, SessionId, SessionInfo, TerminalSurface, TransportError, ViewerId,
};

/// One host-side call that carries user intent, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    Input(Vec<u8>),
    Resize(u16, u16),
    Interrupt,
    Eof,
}

struct FakeSession {
    info: SessionInfo,
    seq: u64,
    history: Vec<HistoryEntry>,
}

/// In-memory session host: the transport collaborator as a test double.
///
/// Keeps an authoritative per-session history with monotonic sequence
/// numbers and pushes every emission on the client's event stream, so the
/// replay/live seam can be exercised deterministically (the `hold_*` gates
/// park a host call until the test releases it).
pub struct FakeHost {
    sessions: Mutex<HashMap<SessionId, FakeSession>>,
    events_tx: mpsc::Sender<HostEvent>,
    next_id: AtomicU64,
    describe_gate: Mutex<Option<Arc<Notify>>>,
    join_gate: Mutex<Option<Arc<Notify>>>,
    history_gate: Mutex<Option<Arc<Notify>>>,
    pub fail_listing: AtomicBool,
    pub fail_input: AtomicBool,
    pub join_calls: AtomicUsize,
    pub leave_calls: AtomicUsize,
    ops: StdMutex<Vec<HostOp>>,
}

impl FakeHost {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<HostEvent>) {
        // RUST_LOG=debug makes test failures traceable.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let (events_tx, events_rx) = mpsc::channel(256);
        let host = Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            events_tx,
            next_id: AtomicU64::new(1),
            describe_gate: Mutex::new(None),
            join_gate: Mutex::new(None),
            history_gate: Mutex::new(None),
            fail_listing: AtomicBool::new(false),
            fail_input: AtomicBool::new(false),
            join_calls: AtomicUsize::new(0),
            leave_calls: AtomicUsize::new(0),
            ops: StdMutex::new(Vec::new()),
        });
        (host, events_rx)
    }

    fn make_info(id: &str, command: &str, grid: Option<&str>) -> SessionInfo {
        SessionInfo {
            id: SessionId::from(id),
            command: command.to_string(),
            working_dir: "/work".to_string(),
            created_ms: now_ms(),
            last_activity_ms: now_ms(),
            grid: grid.map(GridId::from),
            viewers: Vec::new(),
        }
    }

    /// Seed a session without going through `create_session`.
    pub async fn add_session(&self, id: &str) -> SessionId {
        self.add_session_in_grid(id, None).await
    }

    pub async fn add_session_in_grid(&self, id: &str, grid: Option<&str>) -> SessionId {
        let info = Self::make_info(id, "/bin/bash", grid);
        let sid = info.id.clone();
        self.sessions.lock().await.insert(
            sid.clone(),
            FakeSession {
                info,
                seq: 0,
                history: Vec::new(),
            },
        );
        sid
    }

    /// Emit one output chunk: appended to the authoritative history and
    /// pushed on the client event stream. Returns the assigned seq.
    pub async fn emit(&self, id: &SessionId, channel: OutputChannel, payload: &[u8]) -> u64 {
        let event = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions.get_mut(id).expect("emit to unknown session");
            session.seq += 1;
            session.info.last_activity_ms = now_ms();
            let event = OutputEvent {
                session: id.clone(),
                seq: session.seq,
                timestamp_ms: now_ms(),
                channel,
                payload: Bytes::copy_from_slice(payload),
            };
            session.history.push(event.clone());
            event
        };
        let seq = event.seq;
        self.events_tx
            .send(HostEvent::Output(event))
            .await
            .expect("event stream closed");
        seq
    }

    /// Host-initiated termination: the session disappears and the push
    /// stream carries the notice.
    pub async fn push_terminated(&self, id: &SessionId, exit_code: i32) {
        self.sessions.lock().await.remove(id);
        self.events_tx
            .send(HostEvent::SessionTerminated {
                session: id.clone(),
                exit_code: Some(exit_code),
            })
            .await
            .expect("event stream closed");
    }

    pub async fn viewers(&self, id: &SessionId) -> Vec<ViewerId> {
        self.sessions
            .lock()
            .await
            .get(id)
            .map(|s| s.info.viewers.clone())
            .unwrap_or_default()
    }

    pub fn ops(&self) -> Vec<HostOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Park the next `describe_session` call until released.
    pub async fn hold_describe(&self) {
        *self.describe_gate.lock().await = Some(Arc::new(Notify::new()));
    }

    pub async fn release_describe(&self) {
        if let Some(gate) = self.describe_gate.lock().await.take() {
            gate.notify_one();
        }
    }

    /// Park the next `join_session` call until released. The call counter
    /// still ticks before the gate, so a test can observe the in-flight join.
    pub async fn hold_join(&self) {
        *self.join_gate.lock().await = Some(Arc::new(Notify::new()));
    }

    pub async fn release_join(&self) {
        if let Some(gate) = self.join_gate.lock().await.take() {
            gate.notify_one();
        }
    }

    /// Park the next `fetch_history` call until released.
    pub async fn hold_history(&self) {
        *self.history_gate.lock().await = Some(Arc::new(Notify::new()));
    }

    pub async fn release_history(&self) {
        if let Some(gate) = self.history_gate.lock().await.take() {
            gate.notify_one();
        }
    }

    async fn wait_gate(gate: &Mutex<Option<Arc<Notify>>>) {
        let pending = gate.lock().await.clone();
        if let Some(notify) = pending {
            notify.notified().await;
        }
    }
}

#[async_trait]
impl SessionHost for FakeHost {
    async fn create_session(&self, req: CreateSession) -> Result<SessionInfo, TransportError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("session-{}", n);
        let mut info = Self::make_info(
            &id,
            req.command.as_deref().unwrap_or("/bin/bash"),
            req.grid.as_ref().map(GridId::as_str),
        );
        info.working_dir = req.working_dir;
        self.sessions.lock().await.insert(
            info.id.clone(),
            FakeSession {
                info: info.clone(),
                seq: 0,
                history: Vec::new(),
            },
        );
        Ok(info)
    }

    async fn terminate_session(&self, session: &SessionId) -> Result<(), TransportError> {
        self.sessions
            .lock()
            .await
            .remove(session)
            .map(|_| ())
            .ok_or_else(|| TransportError::NotFound(session.clone()))
    }

    async fn list_sessions(
        &self,
        scope: Option<&GridId>,
    ) -> Result<Vec<SessionInfo>, TransportError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(TransportError::Failure("listing unavailable".to_string()));
        }
        Ok(self
            .sessions
            .lock()
            .await
            .values()
            .filter(|s| scope.is_none() || s.info.grid.as_ref() == scope)
            .map(|s| s.info.clone())
            .collect())
    }

    async fn list_active(
        &self,
        scope: Option<&GridId>,
    ) -> Result<Vec<SessionInfo>, TransportError> {
        Ok(self
            .list_sessions(scope)
            .await?
            .into_iter()
            .filter(SessionInfo::is_active)
            .collect())
    }

    async fn describe_session(&self, session: &SessionId) -> Result<SessionInfo, TransportError> {
        Self::wait_gate(&self.describe_gate).await;
        self.sessions
            .lock()
            .await
            .get(session)
            .map(|s| s.info.clone())
            .ok_or_else(|| TransportError::NotFound(session.clone()))
    }

    async fn join_session(
        &self,
        session: &SessionId,
        viewer: ViewerId,
    ) -> Result<(), TransportError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        Self::wait_gate(&self.join_gate).await;
        let mut sessions = self.sessions.lock().await;
        let s = sessions
            .get_mut(session)
            .ok_or_else(|| TransportError::NotFound(session.clone()))?;
        // Deliberately no de-dup: a dangling registration must show up.
        s.info.viewers.push(viewer);
        Ok(())
    }

    async fn leave_session(
        &self,
        session: &SessionId,
        viewer: ViewerId,
    ) -> Result<(), TransportError> {
        self.leave_calls.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock().await;
        let s = sessions
            .get_mut(session)
            .ok_or_else(|| TransportError::NotFound(session.clone()))?;
        if let Some(pos) = s.info.viewers.iter().position(|v| *v == viewer) {
            s.info.viewers.remove(pos);
        }
        Ok(())
    }

    async fn fetch_history(
        &self,
        session: &SessionId,
        max_entries: usize,
    ) -> Result<Vec<HistoryEntry>, TransportError> {
        Self::wait_gate(&self.history_gate).await;
        let sessions = self.sessions.lock().await;
        let s = sessions
            .get(session)
            .ok_or_else(|| TransportError::NotFound(session.clone()))?;
        let start = s.history.len().saturating_sub(max_entries);
        Ok(s.history[start..].to_vec())
    }

    async fn send_input(&self, session: &SessionId, data: Bytes) -> Result<(), TransportError> {
        if self.fail_input.load(Ordering::SeqCst) {
            return Err(TransportError::Failure("input channel broken".to_string()));
        }
        if !self.sessions.lock().await.contains_key(session) {
            return Err(TransportError::NotFound(session.clone()));
        }
        self.ops.lock().unwrap().push(HostOp::Input(data.to_vec()));
        Ok(())
    }

    async fn send_resize(
        &self,
        session: &SessionId,
        rows: u16,
        cols: u16,
    ) -> Result<(), TransportError> {
        if !self.sessions.lock().await.contains_key(session) {
            return Err(TransportError::NotFound(session.clone()));
        }
        self.ops.lock().unwrap().push(HostOp::Resize(rows, cols));
        Ok(())
    }

    async fn send_interrupt(&self, session: &SessionId) -> Result<(), TransportError> {
        if !self.sessions.lock().await.contains_key(session) {
            return Err(TransportError::NotFound(session.clone()));
        }
        self.ops.lock().unwrap().push(HostOp::Interrupt);
        Ok(())
    }

    async fn send_eof(&self, session: &SessionId) -> Result<(), TransportError> {
        if !self.sessions.lock().await.contains_key(session) {
            return Err(TransportError::NotFound(session.clone()));
        }
        self.ops.lock().unwrap().push(HostOp::Eof);
        Ok(())
    }
}

/// Surface double that records every callback.
#[derive(Default)]
pub struct RecordingSurface {
    pub history: StdMutex<Vec<HistoryEntry>>,
    pub live: StdMutex<Vec<OutputEvent>>,
    pub states: StdMutex<Vec<AttachmentState>>,
    pub input_errors: StdMutex<Vec<String>>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn history_seqs(&self) -> Vec<u64> {
        self.history.lock().unwrap().iter().map(|e| e.seq).collect()
    }

    pub fn live_seqs(&self) -> Vec<u64> {
        self.live.lock().unwrap().iter().map(|e| e.seq).collect()
    }

    pub fn saw_state(&self, state: &AttachmentState) -> bool {
        self.states.lock().unwrap().iter().any(|s| s == state)
    }

    /// Replayed history followed by live output, as the user would see it.
    pub fn combined_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for e in self.history.lock().unwrap().iter() {
            out.extend_from_slice(&e.payload);
        }
        for e in self.live.lock().unwrap().iter() {
            out.extend_from_slice(&e.payload);
        }
        out
    }
}

impl TerminalSurface for RecordingSurface {
    fn on_history_entry(&self, entry: &HistoryEntry) {
        self.history.lock().unwrap().push(entry.clone());
    }

    fn on_live_event(&self, event: &OutputEvent) {
        self.live.lock().unwrap().push(event.clone());
    }

    fn on_state_changed(&self, state: &AttachmentState) {
        self.states.lock().unwrap().push(state.clone());
    }

    fn on_input_error(&self, error: &SessionError) {
        self.input_errors.lock().unwrap().push(error.to_string());
    }
}

/// Poll until `f` holds, failing the test after five seconds.
pub async fn eventually(f: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if f() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within timeout");
}
