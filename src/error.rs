use std::time::Duration;

use thiserror::Error;

use crate::proto::SessionId;
use crate::transport::TransportError;

/// Client-facing error taxonomy.
///
/// `RemoteTermination` is a lifecycle outcome ("your session ended"), not a
/// channel problem; `Transport` means the session may well still be running.
/// `InputDelivery` is per-call and never changes an attachment's state.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The host does not know this session id. Not retryable without
    /// recreating the session.
    #[error("session '{0}' not found")]
    NotFound(SessionId),

    #[error("transport failure: {0}")]
    Transport(String),

    /// The host reports the session process exited.
    #[error("session '{0}' was terminated by the host")]
    RemoteTermination(SessionId),

    /// A single input/resize/control call failed.
    #[error("input delivery failed: {0}")]
    InputDelivery(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Session id was empty at connect time.
    #[error("session id must not be empty")]
    InvalidSession,

    /// The attachment is not in the `Live` state.
    #[error("attachment is not live")]
    NotLive,
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotFound(id) => SessionError::NotFound(id),
            TransportError::Terminated(id) => SessionError::RemoteTermination(id),
            TransportError::Failure(msg) => SessionError::Transport(msg),
        }
    }
}
