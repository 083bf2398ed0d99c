//! Catalog items and identity resolution.
//!
//! The pipeline receives bare book names from the filesystem side and links
//! them to catalog items with [`resolve_identity`].

mod matcher;
mod sqlite;
mod types;

pub use matcher::{match_title, normalize_tokens, resolve_identity, token_overlap, MATCH_THRESHOLD};
pub use sqlite::SqliteCatalog;
pub use types::*;

use crate::database::StoreError;

/// Trait for catalog item storage.
pub trait CatalogStore: Send + Sync {
    /// Get an item by id.
    fn get(&self, id: i64) -> Result<Option<CatalogItem>, StoreError>;

    /// Get the first item whose title equals `title` exactly.
    fn find_by_title(&self, title: &str) -> Result<Option<CatalogItem>, StoreError>;

    /// All titles, for identity resolution.
    fn titles(&self) -> Result<Vec<CatalogTitle>, StoreError>;

    /// Set or clear the item's backup pointer.
    fn set_backup_path(&self, id: i64, backup_path: Option<&str>) -> Result<(), StoreError>;

    /// Increment the retention counter, returning the new value.
    fn increment_conversion_attempts(&self, id: i64) -> Result<u32, StoreError>;

    /// Insert an item. The ingestion service normally does this.
    fn insert(&self, title: &str) -> Result<CatalogItem, StoreError>;
}
