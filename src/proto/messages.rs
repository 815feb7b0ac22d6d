use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ──────────────────────────────────────────────

/// Opaque host-assigned session identifier. Stable for the lifetime of the
/// session process on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Optional grouping id ("grid") a session may be scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridId(String);

impl GridId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GridId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies a viewing user toward the host. One viewer may hold several
/// attachments over time, but appears in a session's viewer set at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(Uuid);

impl ViewerId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies one attachment instance (one display surface's connection to
/// one session). Never reused across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(Uuid);

impl AttachmentId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Sessions ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    /// Shell or command descriptor assigned by the host.
    pub command: String,
    pub working_dir: String,
    pub created_ms: u64,
    pub last_activity_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridId>,
    /// Currently attached viewers. Empty means the session is running in
    /// the background.
    #[serde(default)]
    pub viewers: Vec<ViewerId>,
}

impl SessionInfo {
    pub fn is_active(&self) -> bool {
        !self.viewers.is_empty()
    }
}

/// Request payload for creating a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridId>,
    /// Initial command to run. The host falls back to its default shell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    pub working_dir: String,
}

// ── Output events ────────────────────────────────────────────

/// Classification of an output payload. Affects rendering only; the
/// multiplexer never reorders across channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannel {
    Stdout,
    Stderr,
    UserEcho,
    SystemNotice,
}

/// One chunk of session output, live-pushed or replayed from history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEvent {
    pub session: SessionId,
    /// Host-side emission counter, monotonic per session. The replay/live
    /// seam de-duplicates on this.
    pub seq: u64,
    pub timestamp_ms: u64,
    pub channel: OutputChannel,
    pub payload: Bytes,
}

/// Structurally an [`OutputEvent`]; differs only in provenance (backward
/// history query instead of live push).
pub type HistoryEntry = OutputEvent;

// ── Events (host → client push stream) ───────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Output(OutputEvent),
    SessionTerminated {
        session: SessionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
}

// ── Error codes ──────────────────────────────────────────────

pub const ERR_SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
pub const ERR_SESSION_TERMINATED: &str = "SESSION_TERMINATED";
pub const ERR_TRANSPORT_FAILURE: &str = "TRANSPORT_FAILURE";

/// Milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
