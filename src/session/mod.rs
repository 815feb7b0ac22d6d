mod attachment;
mod directory;
mod history;
mod mux;
mod relay;

pub use attachment::{AttachFailure, Attachment, AttachmentState, TerminalSurface};
pub use directory::{DirectoryEntry, SessionDirectory, SessionState};
pub use history::HistoryFetcher;
pub use mux::{OutputMux, RecvError, StreamEvent, Subscription};
pub use relay::ResizeCoalescer;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::proto::{CreateSession, GridId, HostEvent, SessionId, SessionInfo, ViewerId};
use crate::transport::SessionHost;

/// Entry point for everything a client does with sessions: lifecycle
/// commands, the shared directory, and attaching surfaces.
///
/// Holds the host handle, the session directory, and the output
/// multiplexer, and pumps the host's push-event stream into them.
/// Attachments created through [`SessionClient::attach`] are independent;
/// they share nothing but the multiplexer's dispatch order.
pub struct SessionClient {
    host: Arc<dyn SessionHost>,
    config: ClientConfig,
    viewer: ViewerId,
    directory: Arc<SessionDirectory>,
    mux: Arc<OutputMux>,
    history: Arc<HistoryFetcher>,
    pump: JoinHandle<()>,
}

impl SessionClient {
    pub fn new(
        host: Arc<dyn SessionHost>,
        events: mpsc::Receiver<HostEvent>,
        config: ClientConfig,
    ) -> Self {
        let directory = Arc::new(SessionDirectory::new(host.clone()));
        let mux = Arc::new(OutputMux::new(config.mux_capacity));
        let history = Arc::new(HistoryFetcher::new(host.clone()));
        let pump = tokio::spawn(pump_events(events, directory.clone(), mux.clone()));

        Self {
            host,
            config,
            viewer: ViewerId::new(),
            directory,
            mux,
            history,
            pump,
        }
    }

    /// The viewer identity this client registers with sessions.
    pub fn viewer(&self) -> ViewerId {
        self.viewer
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub async fn create(&self, req: CreateSession) -> Result<SessionInfo, SessionError> {
        let info = self.host.create_session(req).await?;
        tracing::info!(session = %info.id, command = %info.command, "created session");
        self.directory.admit(info.clone()).await;
        Ok(info)
    }

    /// Stop the session process. Unlike detach, this destroys the session;
    /// every attachment to it transitions to the terminated error state.
    pub async fn terminate(&self, session: &SessionId) -> Result<(), SessionError> {
        self.host.terminate_session(session).await?;
        self.directory.remove(session).await;
        // Fan out locally too; the host's own push may race this call.
        self.mux
            .dispatch(StreamEvent::Terminated {
                session: session.clone(),
                exit_code: None,
            })
            .await;
        tracing::info!(session = %session, "terminated session");
        Ok(())
    }

    /// Refresh and return the session list, classified active/background.
    pub async fn list(
        &self,
        scope: Option<&GridId>,
    ) -> Result<Vec<DirectoryEntry>, SessionError> {
        self.directory.refresh(scope).await
    }

    /// Attach a display surface to a session. Returns immediately; the
    /// attachment connects in the background and reports progress through
    /// the surface callbacks and its state watch.
    pub fn attach(
        &self,
        session: SessionId,
        surface: Arc<dyn TerminalSurface>,
    ) -> Result<Attachment, SessionError> {
        Attachment::spawn(
            session,
            self.viewer,
            self.host.clone(),
            self.directory.clone(),
            self.mux.clone(),
            self.history.clone(),
            surface,
            &self.config,
        )
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Route host push events: output feeds the multiplexer (and bumps
/// last-activity), termination empties the directory entry and closes the
/// session's fan-out stream.
async fn pump_events(
    mut events: mpsc::Receiver<HostEvent>,
    directory: Arc<SessionDirectory>,
    mux: Arc<OutputMux>,
) {
    while let Some(event) = events.recv().await {
        match event {
            HostEvent::Output(output) => {
                directory
                    .note_activity(&output.session, output.timestamp_ms)
                    .await;
                mux.dispatch(StreamEvent::Output(output)).await;
            }
            HostEvent::SessionTerminated { session, exit_code } => {
                tracing::info!(session = %session, code = ?exit_code, "host reported session terminated");
                directory.remove(&session).await;
                mux.dispatch(StreamEvent::Terminated { session, exit_code })
                    .await;
            }
        }
    }
    tracing::debug!("host event stream closed");
}
