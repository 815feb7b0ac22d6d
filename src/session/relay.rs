use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::proto::SessionId;
use crate::transport::SessionHost;

use super::attachment::TerminalSurface;

/// One queued input or control signal.
#[derive(Debug)]
pub(crate) enum RelayMsg {
    Input(Bytes),
    Resize { rows: u16, cols: u16 },
    Interrupt,
    Eof,
}

/// Spawn the per-attachment relay task: a single consumer draining one
/// bounded queue, so everything one user sends reaches the host in call
/// order. Fire-and-forget from the attachment's perspective; a failed call
/// is surfaced through `on_input_error` and the task keeps going.
pub(crate) fn spawn_relay(
    host: Arc<dyn SessionHost>,
    session: SessionId,
    surface: Arc<dyn TerminalSurface>,
    cancel: CancellationToken,
    capacity: usize,
) -> mpsc::Sender<RelayMsg> {
    let (tx, mut rx) = mpsc::channel::<RelayMsg>(capacity);

    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            let result = match msg {
                RelayMsg::Input(data) => host.send_input(&session, data).await,
                RelayMsg::Resize { rows, cols } => {
                    host.send_resize(&session, rows, cols).await
                }
                RelayMsg::Interrupt => host.send_interrupt(&session).await,
                RelayMsg::Eof => host.send_eof(&session).await,
            };

            if let Err(e) = result {
                tracing::warn!(session = %session, error = %e, "input delivery failed");
                surface.on_input_error(&SessionError::InputDelivery(e.to_string()));
            }
        }
    });

    tx
}

/// Collapse-to-latest policy for resize storms from continuous container
/// resize observation. Applied by the surface owner at the caller boundary;
/// the relay itself never debounces.
///
/// `offer` passes a size through immediately when the window since the last
/// emitted size has elapsed, otherwise stashes it; `settle` yields the
/// stashed final size once the burst is over.
pub struct ResizeCoalescer {
    window: Duration,
    last_emit: Option<Instant>,
    pending: Option<(u16, u16)>,
}

impl ResizeCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: None,
            pending: None,
        }
    }

    pub fn offer(&mut self, rows: u16, cols: u16) -> Option<(u16, u16)> {
        let now = Instant::now();
        match self.last_emit {
            Some(t) if now.duration_since(t) < self.window => {
                self.pending = Some((rows, cols));
                None
            }
            _ => {
                self.last_emit = Some(now);
                self.pending = None;
                Some((rows, cols))
            }
        }
    }

    /// The latest stashed size, if a burst left one behind.
    pub fn settle(&mut self) -> Option<(u16, u16)> {
        let size = self.pending.take()?;
        self.last_emit = Some(Instant::now());
        Some(size)
    }
}
