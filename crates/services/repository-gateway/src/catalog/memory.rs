//! In-memory catalog for tests and local runs

use super::{ItemMetadata, RepositoryItem, StorageCatalog};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    next_id: u64,
    items: HashMap<String, ItemMetadata>,
}

/// Catalog keeping items in a map
///
/// Write URLs look like `memory://repo/{id}/upload` and read URLs like
/// `memory://repo/{id}`, so callers can tell which one they were handed.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    inner: Arc<Mutex<Inner>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the repository going down (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn write_url(id: &str) -> String {
        format!("memory://repo/{}/upload", id)
    }

    pub fn read_url(id: &str) -> String {
        format!("memory://repo/{}", id)
    }

    pub fn item_count(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Metadata an item was created with
    pub fn metadata(&self, id: &str) -> Option<ItemMetadata> {
        self.inner.lock().items.get(id).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::CatalogUnavailable("memory catalog offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageCatalog for MemoryCatalog {
    async fn create_item(&self, metadata: &ItemMetadata) -> Result<RepositoryItem> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = format!("item-{}", inner.next_id);
        inner.items.insert(id.clone(), metadata.clone());
        Ok(RepositoryItem {
            url: Self::write_url(&id),
            id,
        })
    }

    async fn read_item(&self, id: &str) -> Result<RepositoryItem> {
        self.check_available()?;
        if !self.inner.lock().items.contains_key(id) {
            return Err(Error::CatalogUnavailable(format!("item {} not found", id)));
        }
        Ok(RepositoryItem {
            id: id.to_string(),
            url: Self::read_url(id),
        })
    }
}
