//! # Spec Cache
//!
//! Holds the most recently loaded [`SchemaDocument`]. Readers take a
//! snapshot (an `Arc` clone under a short read lock) and validate against it
//! without holding the lock; the refresher publishes a new document by
//! swapping the pointer under the write lock. A reader therefore sees either
//! the old document or the new one in full, never a mix.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::document::SchemaDocument;

/// A loaded document and when it was loaded.
#[derive(Debug)]
pub struct CachedSpec {
    /// The document.
    pub document: SchemaDocument,
    /// Monotonic load time, used for expiry.
    pub loaded_at: Instant,
    /// Wall-clock load time, for display.
    pub loaded_at_utc: DateTime<Utc>,
}

impl CachedSpec {
    /// Wrap a freshly loaded document.
    pub fn new(document: SchemaDocument) -> Self {
        Self {
            document,
            loaded_at: Instant::now(),
            loaded_at_utc: Utc::now(),
        }
    }

    /// Time since the document was loaded.
    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }

    /// Whether the document's age has reached `ttl`.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.is_stale_at(Instant::now(), ttl)
    }

    /// Whether the document's age has reached `ttl` as of `now`.
    pub fn is_stale_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.loaded_at) >= ttl
    }

    /// Time left until the document goes stale, zero if it already has.
    pub fn remaining(&self, ttl: Duration) -> Duration {
        ttl.saturating_sub(self.age())
    }
}

/// Shared, swappable holder of the current document.
#[derive(Debug, Default)]
pub struct SpecCache {
    current: RwLock<Option<Arc<CachedSpec>>>,
}

impl SpecCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current document, if one has ever been loaded.
    pub fn snapshot(&self) -> Option<Arc<CachedSpec>> {
        self.current.read().clone()
    }

    /// Publish a new document, returning the one it replaced.
    pub fn replace(&self, document: SchemaDocument) -> Option<Arc<CachedSpec>> {
        let next = Arc::new(CachedSpec::new(document));
        self.current.write().replace(next)
    }

    /// Whether a document has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}
