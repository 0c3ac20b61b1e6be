use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::StoreConfig,
    error::{Result, StoreError},
    session::{PagePayload, Session, payload_size},
};

/// Point-in-time resource usage of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub sessions: usize,
    pub payload_bytes: usize,
    pub max_sessions: usize,
    pub max_payload_bytes: usize,
}

/// Trait for registering and resolving document sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Register a decoded document and return its new session id.
    async fn create(&self, pages: Vec<PagePayload>) -> Result<String>;
    /// Resolve a live session and refresh its recency.
    async fn get(&self, id: &str) -> Result<Arc<Session>>;
    /// Remove a session. Removing an unknown id is not an error.
    async fn evict(&self, id: &str) -> Result<()>;
    async fn stats(&self) -> Result<StoreStats>;
}

/// In-memory implementation of SessionStore with LRU eviction and TTL expiry.
///
/// Lookups go straight to the sharded map. Inserts and removals additionally
/// take the admission lock, which also guards the aggregate byte counter,
/// so limits are enforced exactly under concurrent creates.
pub struct InMemorySessionStore {
    sessions: DashMap<String, Arc<Session>>,
    admission: Mutex<usize>,
    clock: AtomicU64,
    config: StoreConfig,
}

impl InMemorySessionStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sessions: DashMap::new(),
            admission: Mutex::new(0),
            clock: AtomicU64::new(0),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Reclaim every session whose TTL has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut total = self.lock_admission();
        self.reclaim_expired(&mut total)
    }

    /// Periodically purge expired sessions until the store is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let every = self.config.reap_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Session store dropped, stopping reaper");
                    break;
                };
                let reclaimed = store.purge_expired();
                if reclaimed > 0 {
                    info!(
                        "Reclaimed {} expired sessions, {} remaining",
                        reclaimed,
                        store.len()
                    );
                }
            }
        })
    }

    fn next_tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock_admission(&self) -> MutexGuard<'_, usize> {
        self.admission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, pages: Vec<PagePayload>) -> Result<String> {
        if pages.is_empty() {
            return Err(StoreError::InvalidInput(
                "document contains no pages".to_string(),
            ));
        }

        let required = payload_size(&pages);
        let limit = self.config.max_payload_bytes;
        if required > limit {
            return Err(StoreError::CapacityExceeded { required, limit });
        }

        let mut total = self.lock_admission();
        self.reclaim_expired(&mut total);

        while self.sessions.len() >= self.config.max_sessions || *total + required > limit {
            let Some(victim) = self.least_recently_used() else {
                return Err(StoreError::CapacityExceeded { required, limit });
            };
            if self.remove_locked(&mut total, &victim) {
                info!("Evicted least recently used session {}", victim);
            }
        }

        let id = self.fresh_id();
        let session = Arc::new(Session::new(id.clone(), pages, self.next_tick()));
        *total += required;
        self.sessions.insert(id.clone(), session);

        Ok(id)
    }

    fn lookup(&self, id: &str) -> Result<Arc<Session>> {
        if id.trim().is_empty() {
            return Err(StoreError::InvalidInput("session id is required".to_string()));
        }

        let session = self
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if session.is_expired(self.config.ttl) {
            let mut total = self.lock_admission();
            if self.remove_expired_locked(&mut total, id) {
                debug!("Session {} expired on access", id);
            }
            return Err(StoreError::NotFound(id.to_string()));
        }

        session.touch(self.next_tick());
        Ok(session)
    }

    fn fresh_id(&self) -> String {
        loop {
            let candidate = Uuid::new_v4().to_string();
            if !self.sessions.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn least_recently_used(&self) -> Option<String> {
        self.sessions
            .iter()
            .min_by_key(|entry| entry.value().recency())
            .map(|entry| entry.key().clone())
    }

    fn reclaim_expired(&self, total: &mut usize) -> usize {
        let ttl = self.config.ttl;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_expired(ttl))
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .iter()
            .filter(|id| self.remove_expired_locked(total, id))
            .count()
    }

    fn remove_locked(&self, total: &mut usize, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                *total -= session.payload_bytes();
                true
            }
            None => false,
        }
    }

    // Re-checks expiry so a session touched since it was judged stale survives.
    fn remove_expired_locked(&self, total: &mut usize, id: &str) -> bool {
        let ttl = self.config.ttl;
        match self
            .sessions
            .remove_if(id, |_, session| session.is_expired(ttl))
        {
            Some((_, session)) => {
                *total -= session.payload_bytes();
                true
            }
            None => false,
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
            admission: Mutex::new(0),
            clock: AtomicU64::new(0),
            config: StoreConfig::default(),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, pages: Vec<PagePayload>) -> Result<String> {
        let page_count = pages.len();
        let id = self.insert(pages)?;
        info!(
            "Session {} created with {} pages. Total sessions: {}",
            id,
            page_count,
            self.len()
        );
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Arc<Session>> {
        self.lookup(id)
    }

    async fn evict(&self, id: &str) -> Result<()> {
        let mut total = self.lock_admission();
        if self.remove_locked(&mut total, id) {
            info!("Session {} evicted", id);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let total = self.lock_admission();
        Ok(StoreStats {
            sessions: self.sessions.len(),
            payload_bytes: *total,
            max_sessions: self.config.max_sessions,
            max_payload_bytes: self.config.max_payload_bytes,
        })
    }
}
