use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::SessionError;
use crate::proto::{GridId, SessionId, SessionInfo};
use crate::transport::SessionHost;

/// Whether a session currently has attached viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Background,
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub info: SessionInfo,
    pub state: SessionState,
}

impl DirectoryEntry {
    fn classify(info: SessionInfo) -> Self {
        let state = if info.is_active() {
            SessionState::Active
        } else {
            SessionState::Background
        };
        Self { info, state }
    }
}

/// Client-side cache of known sessions.
///
/// Read-shared by all attachments; written only by its own refresh/get and
/// by the client's event pump. Never mutates session state on the host.
pub struct SessionDirectory {
    host: Arc<dyn SessionHost>,
    cache: RwLock<HashMap<SessionId, SessionInfo>>,
}

impl SessionDirectory {
    pub(crate) fn new(host: Arc<dyn SessionHost>) -> Self {
        Self {
            host,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Retrieve the full (or grid-scoped) session list and classify each
    /// session active/background.
    ///
    /// Built from two host queries unioned on session id, with the
    /// active-only record winning on overlap (it carries the fresher viewer
    /// set). On failure the previous cache is left intact: stale but
    /// available beats empty.
    pub async fn refresh(
        &self,
        scope: Option<&GridId>,
    ) -> Result<Vec<DirectoryEntry>, SessionError> {
        let all = self.host.list_sessions(scope).await?;
        let active = self.host.list_active(scope).await?;

        let mut merged: HashMap<SessionId, SessionInfo> =
            all.into_iter().map(|s| (s.id.clone(), s)).collect();
        for s in active {
            merged.insert(s.id.clone(), s);
        }

        {
            let mut cache = self.cache.write().await;
            if let Some(scope) = scope {
                // Scoped refresh is authoritative for that grid only:
                // cached entries in the grid that the host no longer lists
                // are evicted, everything outside it is untouched.
                cache.retain(|id, info| {
                    info.grid.as_ref() != Some(scope) || merged.contains_key(id)
                });
                for (id, info) in &merged {
                    cache.insert(id.clone(), info.clone());
                }
            } else {
                *cache = merged.clone();
            }
        }

        tracing::debug!(scope = ?scope.map(GridId::as_str), count = merged.len(), "directory refreshed");

        let mut entries: Vec<DirectoryEntry> =
            merged.into_values().map(DirectoryEntry::classify).collect();
        entries.sort_by(|a, b| a.info.created_ms.cmp(&b.info.created_ms));
        Ok(entries)
    }

    /// Session metadata from cache, falling back to a host query.
    pub async fn get(&self, session: &SessionId) -> Result<SessionInfo, SessionError> {
        if let Some(info) = self.cache.read().await.get(session) {
            return Ok(info.clone());
        }
        let info = self.host.describe_session(session).await?;
        self.cache
            .write()
            .await
            .insert(info.id.clone(), info.clone());
        Ok(info)
    }

    /// Current cache contents, classified. Does not touch the host.
    pub async fn snapshot(&self) -> Vec<DirectoryEntry> {
        let cache = self.cache.read().await;
        let mut entries: Vec<DirectoryEntry> = cache
            .values()
            .cloned()
            .map(DirectoryEntry::classify)
            .collect();
        entries.sort_by(|a, b| a.info.created_ms.cmp(&b.info.created_ms));
        entries
    }

    pub(crate) async fn admit(&self, info: SessionInfo) {
        self.cache.write().await.insert(info.id.clone(), info);
    }

    pub(crate) async fn remove(&self, session: &SessionId) {
        self.cache.write().await.remove(session);
    }

    pub(crate) async fn note_activity(&self, session: &SessionId, timestamp_ms: u64) {
        if let Some(info) = self.cache.write().await.get_mut(session) {
            info.last_activity_ms = info.last_activity_ms.max(timestamp_ms);
        }
    }
}
