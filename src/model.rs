//! Domain types shared across the reconciliation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Draft,
    Published,
    Archived,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Draft => "draft",
            ModuleStatus::Published => "published",
            ModuleStatus::Archived => "archived",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ModuleStatus::Draft),
            "published" => Some(ModuleStatus::Published),
            "archived" => Some(ModuleStatus::Archived),
            _ => None,
        }
    }
}

/// A content module as held by the primary store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    /// Stable join key across both stores. Immutable once assigned.
    pub slug: String,
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub body: String,
    /// Opaque enrichment payload produced upstream. Never crosses to the mirror.
    pub enrichment: Option<serde_json::Value>,
    pub status: ModuleStatus,
    /// Foreign identifier into the mirror store, set once a push succeeds.
    /// Cleared only by the explicit deletion flow.
    pub mirror_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// The subset of module fields that crosses over from the mirror on a pull.
/// Primary-only columns (`status`, `enrichment`, `mirror_id`) are absent on
/// purpose: a pull never touches them on an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDraft {
    pub slug: String,
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Push,
    Pull,
    None,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Push => "push",
            SyncAction::Pull => "pull",
            SyncAction::None => "none",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral per-pass decision. Never persisted; always re-derived from the
/// two stores' current timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDecision {
    pub action: SyncAction,
    pub reason: &'static str,
}

/// Read-only projection of one module's reconciliation state.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub slug: String,
    pub in_primary: bool,
    pub in_mirror: bool,
    pub needs_sync: bool,
    pub direction: SyncAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub slug: String,
    pub action: SyncAction,
    pub error: String,
}

/// Aggregate outcome of one reconciliation pass (single module or full catalog).
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub run_id: Uuid,
    pub processed: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub noop: u32,
    pub failures: Vec<SyncFailure>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            processed: 0,
            succeeded: 0,
            failed: 0,
            noop: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_action(&mut self, action: SyncAction) {
        self.processed += 1;
        match action {
            SyncAction::Push | SyncAction::Pull => self.succeeded += 1,
            SyncAction::None => self.noop += 1,
        }
    }

    pub fn record_failure(&mut self, slug: &str, action: SyncAction, error: &SyncError) {
        self.processed += 1;
        self.failed += 1;
        self.failures.push(SyncFailure {
            slug: slug.to_string(),
            action,
            error: error.to_string(),
        });
    }
}

impl Default for BatchResult {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    Primary,
    Mirror,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Store::Primary => f.write_str("primary"),
            Store::Mirror => f.write_str("mirror"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Category,
    Tag,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::Category => f.write_str("category"),
            RefKind::Tag => f.write_str("tag"),
        }
    }
}

/// Per-module error taxonomy. Each variant is caught at the module boundary
/// inside the orchestrator and turned into a `BatchResult` failure entry;
/// none of them aborts a batch.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The store could not be reached. Distinct from "absent": an unreachable
    /// store must never be read as a deletion.
    #[error("{store} store unreachable: {reason}")]
    Lookup { store: Store, reason: String },

    /// A category or tag has no counterpart reference in the mirror.
    #[error("no mirror reference for {kind} '{name}'")]
    Mapping { kind: RefKind, name: String },

    /// A create/update failed after bounded retries.
    #[error("write to {store} store failed after {attempts} attempt(s): {reason}")]
    Write {
        store: Store,
        attempts: u32,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ModuleStatus::Draft,
            ModuleStatus::Published,
            ModuleStatus::Archived,
        ] {
            assert_eq!(ModuleStatus::parse_status(status.as_str()), Some(status));
        }
        assert_eq!(ModuleStatus::parse_status("bogus"), None);
    }

    #[test]
    fn batch_result_counts() {
        let mut result = BatchResult::new();
        result.record_action(SyncAction::Push);
        result.record_action(SyncAction::None);
        result.record_failure(
            "a",
            SyncAction::Push,
            &SyncError::Mapping {
                kind: RefKind::Category,
                name: "ghost".into(),
            },
        );
        assert_eq!(result.processed, 3);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.noop, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].slug, "a");
        assert!(result.failures[0].error.contains("ghost"));
    }
}
