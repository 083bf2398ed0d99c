//! Catalog item types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog item as seen by the conversion pipeline.
///
/// The ingestion service owns the row. The pipeline only reads the title and
/// maintains the backup pointer and the retention counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub title: String,
    /// The live backup snapshot for this item, if any.
    pub conversion_backup_path: Option<String>,
    /// Successful conversions performed from the current snapshot.
    pub conversion_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal projection used by identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTitle {
    pub id: i64,
    pub title: String,
}
