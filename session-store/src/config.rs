use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, StoreError};

pub const DEFAULT_MAX_SESSIONS: usize = 256;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 512 * 1024 * 1024;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Resource limits and expiry policy for an [`InMemorySessionStore`](crate::InMemorySessionStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of live sessions.
    pub max_sessions: usize,
    /// Maximum aggregate size of all stored page payloads.
    pub max_payload_bytes: usize,
    /// Sessions not accessed for this long are treated as gone.
    pub ttl: Duration,
    /// How often the background reaper reclaims expired sessions.
    pub reap_interval: Duration,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            ttl: DEFAULT_TTL,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval = reap_interval;
        self
    }

    /// Reject limits that would make the store unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(StoreError::InvalidConfig(
                "max_sessions must be greater than zero".to_string(),
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(StoreError::InvalidConfig(
                "max_payload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.ttl.is_zero() {
            return Err(StoreError::InvalidConfig(
                "ttl must be greater than zero".to_string(),
            ));
        }
        if self.reap_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "reap_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
