//! Typed wire models for the mirror CMS.
//!
//! Each mirror collection has its own explicit schema (module item, category
//! reference, tag reference) so field mapping is total and checked at compile
//! time rather than probing dynamic property sets at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A module item as the mirror holds it. `updated_at` is maintained by the
/// CMS on every write; this engine never sets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorModule {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub summary: Option<String>,
    pub body: String,
    /// Reference id into the category collection.
    pub category: Option<String>,
    /// Reference ids into the tag collection.
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Single-valued reference target for a module's category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
}

/// Multi-valued reference target for a module's tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagRef {
    pub id: String,
    pub name: String,
}

/// The mapped field set written to the mirror on a push. Everything here has
/// already been resolved to mirror-side representation (reference ids, not
/// display names).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MirrorFields {
    pub slug: String,
    pub title: String,
    pub summary: Option<String>,
    pub body: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

/// Wire envelope for a single item response.
#[derive(Debug, Deserialize)]
pub struct ItemEnvelope<T> {
    pub item: T,
}

/// Wire envelope for a list response.
#[derive(Debug, Deserialize)]
pub struct ListEnvelope<T> {
    pub items: Vec<T>,
}

/// Create responses carry only the new item's id.
#[derive(Debug, Deserialize)]
pub struct CreatedItem {
    pub id: String,
}
