use std::collections::HashMap;

use tokio::sync::{broadcast, Mutex};

pub use tokio::sync::broadcast::error::RecvError;

use crate::proto::{OutputEvent, SessionId};

/// What a subscriber receives: ordered session output, or the terminal
/// notice that the session's process is gone.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Output(OutputEvent),
    Terminated {
        session: SessionId,
        exit_code: Option<i32>,
    },
}

impl StreamEvent {
    pub fn session(&self) -> &SessionId {
        match self {
            StreamEvent::Output(ev) => &ev.session,
            StreamEvent::Terminated { session, .. } => session,
        }
    }
}

/// Fans session events out to every live subscriber of that session, in
/// dispatch order. Holds only subscription topology, no session state.
///
/// One broadcast channel per session; `dispatch` is a non-blocking send, so
/// a slow subscriber never stalls delivery to anyone else. Overload policy
/// is the channel's bounded ring with drop-oldest: a subscriber more than
/// `capacity` events behind sees [`RecvError::Lagged`] and continues from
/// the newest retained event.
pub struct OutputMux {
    capacity: usize,
    channels: Mutex<HashMap<SessionId, broadcast::Sender<StreamEvent>>>,
}

impl OutputMux {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to a session's event stream. Dropping the returned
    /// [`Subscription`] unsubscribes.
    pub async fn subscribe(&self, session: &SessionId) -> Subscription {
        let mut channels = self.channels.lock().await;
        let tx = channels
            .entry(session.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Subscription {
            session: session.clone(),
            rx: tx.subscribe(),
        }
    }

    /// Deliver an event to every current subscriber of its session.
    /// Events for sessions nobody watches are dropped.
    pub async fn dispatch(&self, event: StreamEvent) {
        let mut channels = self.channels.lock().await;
        let session = event.session().clone();
        let terminated = matches!(event, StreamEvent::Terminated { .. });

        if let Some(tx) = channels.get(&session) {
            if tx.receiver_count() == 0 {
                channels.remove(&session);
            } else {
                // Send only fails with zero receivers, checked above.
                let _ = tx.send(event);
            }
        }

        // The terminated notice is the last event a session ever fans out.
        if terminated {
            channels.remove(&session);
        }
    }

    pub async fn subscriber_count(&self, session: &SessionId) -> usize {
        self.channels
            .lock()
            .await
            .get(session)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

/// Handle to one subscriber's position in a session's event stream.
pub struct Subscription {
    session: SessionId,
    rx: broadcast::Receiver<StreamEvent>,
}

impl Subscription {
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub async fn recv(&mut self) -> Result<StreamEvent, RecvError> {
        self.rx.recv().await
    }
}
