//! Input models used by the primary-store repository.
//!
//! Keep these structs focused on what a single SQL statement needs. Business
//! logic lives in higher layers.

use crate::model::ModuleStatus;

/// A module to insert into the primary store, authored locally (as opposed to
/// a record created by a pull, which always starts as a draft).
#[derive(Debug, Clone)]
pub struct NewModule {
    pub slug: String,
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub body: String,
    pub enrichment: Option<serde_json::Value>,
    pub status: ModuleStatus,
}
