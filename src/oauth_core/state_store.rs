//! Session-scoped storage for in-flight login attempts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Lifetime of an unused pending login.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// What must survive the redirect round trip for one login attempt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub provider_id: String,
    pub state: String,
    pub pkce_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLogin")
            .field("provider_id", &self.provider_id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Storage keyed by an opaque session identifier.
///
/// Backends that talk to a remote store report their failures as
/// [`AuthError::TransportFailure`].
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Stores `pending` for `session_id`, replacing any earlier attempt of that session.
    async fn put(&self, session_id: &str, pending: PendingLogin, ttl: Duration) -> Result<(), AuthError>;

    /// Removes and returns the pending login. Expired entries are never returned.
    async fn take(&self, session_id: &str) -> Result<Option<PendingLogin>, AuthError>;

    /// Drops expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, AuthError>;
}

#[derive(Clone)]
struct Entry {
    pending: PendingLogin,
    expires_at: DateTime<Utc>,
}

/// In-memory [`StateStore`] for single-process deployments and tests.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn put(&self, session_id: &str, pending: PendingLogin, ttl: Duration) -> Result<(), AuthError> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| pending.created_at.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::InvalidRequest("state ttl out of range".into()))?;
        self.entries.insert(session_id.to_string(), Entry { pending, expires_at });
        Ok(())
    }

    async fn take(&self, session_id: &str) -> Result<Option<PendingLogin>, AuthError> {
        let now = Utc::now();
        Ok(self
            .entries
            .remove(session_id)
            .map(|(_, entry)| entry)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.pending))
    }

    async fn purge_expired(&self) -> Result<usize, AuthError> {
        let now = Utc::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = entry.expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        Ok(removed)
    }
}
