//! Bounded, concurrency-safe registry of conversational document contexts.
//!
//! A session binds an unguessable identifier to the ordered page images of an
//! uploaded document. Pages are immutable once stored; the store enforces a
//! maximum session count, a maximum aggregate payload size and an idle TTL,
//! evicting the least recently accessed session when a new one does not fit.
//!
//! ```rust,ignore
//! use session_store::{InMemorySessionStore, PagePayload, SessionStore, StoreConfig};
//!
//! let store = InMemorySessionStore::new(StoreConfig::new().with_max_sessions(64))?;
//! let id = store.create(vec![PagePayload::png(png_bytes)]).await?;
//! let session = store.get(&id).await?;
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use session::{PagePayload, Session, SessionInfo};
pub use storage::{InMemorySessionStore, SessionStore, StoreStats};
