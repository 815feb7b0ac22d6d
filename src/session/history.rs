use std::sync::Arc;

use crate::error::SessionError;
use crate::proto::{HistoryEntry, SessionId};
use crate::transport::SessionHost;

/// Fetches the bounded tail of a session's prior output for replay.
///
/// A pure relay with truncation policy: nothing is cached beyond the call,
/// and truncation always drops from the front so the most recent context
/// survives. An empty result is success (a fresh session has no history).
pub struct HistoryFetcher {
    host: Arc<dyn SessionHost>,
}

impl HistoryFetcher {
    pub(crate) fn new(host: Arc<dyn SessionHost>) -> Self {
        Self { host }
    }

    pub async fn fetch(
        &self,
        session: &SessionId,
        max_entries: usize,
    ) -> Result<Vec<HistoryEntry>, SessionError> {
        let mut entries = self.host.fetch_history(session, max_entries).await?;
        let dropped = truncate_front(&mut entries, max_entries);
        if dropped > 0 {
            tracing::debug!(
                session = %session,
                dropped = dropped,
                kept = entries.len(),
                "replay window truncated"
            );
        }
        Ok(entries)
    }
}

/// Keep the newest `max` entries, dropping from the front. Returns how many
/// were dropped. Hosts are asked for at most `max`, but may over-return.
pub(crate) fn truncate_front(entries: &mut Vec<HistoryEntry>, max: usize) -> usize {
    if entries.len() <= max {
        return 0;
    }
    let excess = entries.len() - max;
    entries.drain(..excess);
    excess
}
