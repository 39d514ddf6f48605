//! Storage item catalog
//!
//! Recordings are written to, and played back from, items allocated by a media
//! repository. When the repository cannot be reached the session falls back to
//! a local file item so recording still works.

pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use http::HttpRepositoryCatalog;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryCatalog;

use crate::engine::MediaProfile;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Item metadata passed to the repository on creation
pub type ItemMetadata = HashMap<String, String>;

/// Item as returned by the repository: an opaque id and a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryItem {
    pub id: String,
    pub url: String,
}

/// Where a session's storage item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOrigin {
    /// Allocated by the repository
    Catalog,
    /// Synthesized locally because the repository was unavailable
    Fallback,
}

/// Storage item bound to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageItem {
    pub id: String,
    pub write_url: String,
    pub origin: ItemOrigin,
}

impl StorageItem {
    pub fn from_catalog(item: RepositoryItem) -> Self {
        Self {
            id: item.id,
            write_url: item.url,
            origin: ItemOrigin::Catalog,
        }
    }

    pub fn from_fallback(item: RepositoryItem) -> Self {
        Self {
            id: item.id,
            write_url: item.url,
            origin: ItemOrigin::Fallback,
        }
    }
}

/// Repository that allocates and resolves storage items
#[async_trait]
pub trait StorageCatalog: Send + Sync {
    /// Allocate a new item to record into
    ///
    /// Returns [`Error::CatalogUnavailable`] when the backing service cannot be reached.
    async fn create_item(&self, metadata: &ItemMetadata) -> Result<RepositoryItem>;

    /// Resolve the read URL of an existing item
    async fn read_item(&self, id: &str) -> Result<RepositoryItem>;
}

/// Catalog used when no repository is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCatalog;

#[async_trait]
impl StorageCatalog for OfflineCatalog {
    async fn create_item(&self, _metadata: &ItemMetadata) -> Result<RepositoryItem> {
        Err(Error::CatalogUnavailable("no repository configured".to_string()))
    }

    async fn read_item(&self, id: &str) -> Result<RepositoryItem> {
        Err(Error::CatalogUnavailable(format!(
            "no repository configured to resolve item {}",
            id
        )))
    }
}

static LAST_FALLBACK_ID: AtomicU64 = AtomicU64::new(0);

/// Millisecond timestamp, bumped so two items never share an id
fn next_fallback_id() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let mut last = LAST_FALLBACK_ID.load(Ordering::SeqCst);
    loop {
        let next = now.max(last + 1);
        match LAST_FALLBACK_ID.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Local file item: `file://{dir}/{millis}.{ext}`
pub fn fallback_item(dir: &str, profile: MediaProfile) -> RepositoryItem {
    let id = next_fallback_id().to_string();
    let dir = dir.trim_end_matches('/');
    let url = format!("file://{}/{}.{}", dir, id, profile.extension());
    RepositoryItem { id, url }
}
