use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::proto::{
    CreateSession, GridId, HistoryEntry, SessionId, SessionInfo, ViewerId,
    ERR_SESSION_NOT_FOUND, ERR_SESSION_TERMINATED, ERR_TRANSPORT_FAILURE,
};

/// Failure of a single host round-trip.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("session '{0}' not found")]
    NotFound(SessionId),
    #[error("session '{0}' was terminated")]
    Terminated(SessionId),
    #[error("transport failure: {0}")]
    Failure(String),
}

impl TransportError {
    /// Stable error code, for logs and concrete wire encodings.
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::NotFound(_) => ERR_SESSION_NOT_FOUND,
            TransportError::Terminated(_) => ERR_SESSION_TERMINATED,
            TransportError::Failure(_) => ERR_TRANSPORT_FAILURE,
        }
    }
}

/// The session host as seen from the client.
///
/// Request/response commands are at-most-once per call with explicit
/// success/failure. Push events arrive on a separate per-client stream
/// (an `mpsc::Receiver<HostEvent>` handed to `SessionClient::new`), which
/// the host keeps ordered per session and delivers at-least-once; the
/// client de-duplicates only at the replay/live seam.
///
/// Implementations wrap a concrete channel (unix socket, websocket, ...);
/// the engine never sees the wire encoding.
#[async_trait]
pub trait SessionHost: Send + Sync {
    async fn create_session(&self, req: CreateSession) -> Result<SessionInfo, TransportError>;

    /// Stops the session process. The only operation that destroys a
    /// session; detaching viewers never does.
    async fn terminate_session(&self, session: &SessionId) -> Result<(), TransportError>;

    /// All sessions, optionally grid-scoped, active and background alike.
    async fn list_sessions(&self, scope: Option<&GridId>)
        -> Result<Vec<SessionInfo>, TransportError>;

    /// Only sessions with at least one attached viewer.
    async fn list_active(&self, scope: Option<&GridId>)
        -> Result<Vec<SessionInfo>, TransportError>;

    async fn describe_session(&self, session: &SessionId)
        -> Result<SessionInfo, TransportError>;

    /// Registers a viewer in the session's viewer set.
    async fn join_session(&self, session: &SessionId, viewer: ViewerId)
        -> Result<(), TransportError>;

    /// Removes a viewer from the session's viewer set. The session keeps
    /// running even when the set empties.
    async fn leave_session(&self, session: &SessionId, viewer: ViewerId)
        -> Result<(), TransportError>;

    /// The most recent `max_entries` output entries, oldest first. A
    /// session with no output yet yields an empty vec, not an error.
    async fn fetch_history(&self, session: &SessionId, max_entries: usize)
        -> Result<Vec<HistoryEntry>, TransportError>;

    async fn send_input(&self, session: &SessionId, data: Bytes) -> Result<(), TransportError>;

    async fn send_resize(&self, session: &SessionId, rows: u16, cols: u16)
        -> Result<(), TransportError>;

    async fn send_interrupt(&self, session: &SessionId) -> Result<(), TransportError>;

    async fn send_eof(&self, session: &SessionId) -> Result<(), TransportError>;
}
