//! Client engine for shared, persistent terminal sessions.
//!
//! A session is a host-resident PTY process that outlives its viewers:
//! several surfaces can watch and drive it at once, and it keeps running in
//! the background when the last one detaches. This crate implements the
//! client side of that protocol: the session directory, the per-surface
//! attachment state machine with exact history replay (no duplicated or
//! dropped bytes at the replay/live seam), ordered output fan-out, and
//! input/control forwarding.
//!
//! The host is reached through the [`transport::SessionHost`] trait plus a
//! push-event stream; wire encoding and server-side process supervision
//! live behind that seam. Rendering lives behind the
//! [`session::TerminalSurface`] trait.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use termgrid::{ClientConfig, SessionClient, SessionId};
//! # async fn example(host: Arc<dyn termgrid::SessionHost>, events: tokio::sync::mpsc::Receiver<termgrid::HostEvent>, surface: Arc<dyn termgrid::TerminalSurface>) -> Result<(), termgrid::SessionError> {
//! let client = SessionClient::new(host, events, ClientConfig::default());
//! client.list(None).await?;
//! let attachment = client.attach(SessionId::from("abc123"), surface)?;
//! // ... surface receives history, then live output ...
//! attachment.detach().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod proto;
pub mod session;
pub mod transport;

pub use config::{ClientConfig, ConfigError, DEFAULT_HISTORY_LIMIT};
pub use error::SessionError;
pub use proto::{
    AttachmentId, CreateSession, GridId, HistoryEntry, HostEvent, OutputChannel, OutputEvent,
    SessionId, SessionInfo, ViewerId,
};
pub use session::{
    AttachFailure, Attachment, AttachmentState, DirectoryEntry, OutputMux, ResizeCoalescer,
    SessionClient, SessionDirectory, SessionState, StreamEvent, TerminalSurface,
};
pub use transport::{SessionHost, TransportError};
