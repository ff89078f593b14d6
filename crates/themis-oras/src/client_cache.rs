//! Per-reference repository client cache.
//!
//! Maps canonical reference strings to authenticated repository clients
//! and their credential expiry. Entries are inserted only after a
//! successful registry interaction proves the client's credentials, and
//! evicted on any registry error for the reference: the Distribution
//! protocol does not reliably distinguish expired from wrong
//! credentials, so eviction trades a cheap rebuild for correctness.

use crate::client::RepositoryClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A cached repository client with its credential expiry.
#[derive(Debug, Clone)]
pub struct ClientEntry {
    /// The authenticated client.
    pub client: Arc<RepositoryClient>,

    /// When the credentials behind the client expire; `None` means they
    /// do not expire by time.
    pub expires_on: Option<DateTime<Utc>>,
}

impl ClientEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.map_or(true, |expiry| expiry > now)
    }
}

/// Thread-safe mapping from reference string to client entry.
#[derive(Debug, Default)]
pub struct RepositoryClientCache {
    entries: RwLock<HashMap<String, ClientEntry>>,
}

impl RepositoryClientCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live entry for `reference`, if any. Expired entries
    /// are dropped so a later insert can replace them.
    pub async fn get(&self, reference: &str) -> Option<ClientEntry> {
        let now = Utc::now();

        {
            let entries = self.entries.read().await;
            match entries.get(reference) {
                Some(entry) if entry.is_live(now) => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // The entry expired; remove it under the write lock, re-checking
        // in case a racing writer already replaced it.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(reference) {
            if entry.is_live(now) {
                return Some(entry.clone());
            }
            debug!(reference, "Dropping expired repository client");
            entries.remove(reference);
        }
        None
    }

    /// Inserts an entry for `reference` if none is present. Concurrent
    /// builders may race here; the first insert wins and losers are
    /// discarded, which is fine because client construction is cheap.
    pub async fn add(&self, reference: &str, entry: ClientEntry) {
        self.entries
            .write()
            .await
            .entry(reference.to_string())
            .or_insert(entry);
    }

    /// Removes the entry for `reference` unconditionally.
    pub async fn evict(&self, reference: &str) {
        if self.entries.write().await.remove(reference).is_some() {
            debug!(reference, "Evicted repository client after registry error");
        }
    }

    /// Number of cached entries, live or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
