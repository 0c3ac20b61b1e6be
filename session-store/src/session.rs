use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One decoded page of an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePayload {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl PagePayload {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
        }
    }

    pub fn png(data: Vec<u8>) -> Self {
        Self::new("image/png", data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct AccessStamp {
    tick: u64,
    at: Instant,
    wall: DateTime<Utc>,
}

impl AccessStamp {
    fn now(tick: u64) -> Self {
        Self {
            tick,
            at: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// A document context bound to an opaque identifier.
///
/// Pages are write-once. Only the access stamp changes after creation, and
/// concurrent touches resolve last-writer-wins.
#[derive(Debug)]
pub struct Session {
    id: String,
    pages: Vec<PagePayload>,
    payload_bytes: usize,
    created_at: DateTime<Utc>,
    access: Mutex<AccessStamp>,
}

impl Session {
    pub(crate) fn new(id: String, pages: Vec<PagePayload>, tick: u64) -> Self {
        let payload_bytes = payload_size(&pages);
        let stamp = AccessStamp::now(tick);
        Self {
            id,
            pages,
            payload_bytes,
            created_at: stamp.wall,
            access: Mutex::new(stamp),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pages(&self) -> &[PagePayload] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.stamp().wall
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            page_count: self.page_count(),
            payload_bytes: self.payload_bytes,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at(),
        }
    }

    pub(crate) fn touch(&self, tick: u64) {
        let mut stamp = self.access.lock().unwrap_or_else(PoisonError::into_inner);
        *stamp = AccessStamp::now(tick);
    }

    pub(crate) fn recency(&self) -> u64 {
        self.stamp().tick
    }

    pub(crate) fn is_expired(&self, ttl: Duration) -> bool {
        self.stamp().at.elapsed() > ttl
    }

    fn stamp(&self) -> AccessStamp {
        *self.access.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializable snapshot of a session's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub page_count: usize,
    pub payload_bytes: usize,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

pub(crate) fn payload_size(pages: &[PagePayload]) -> usize {
    pages.iter().map(PagePayload::len).sum()
}
