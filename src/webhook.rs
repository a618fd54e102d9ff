//! Inbound webhook handling: a mirror-side publish/update event triggers a
//! single-module reconciliation.
//!
//! Malformed, unrecognized, or badly-signed events are acknowledged as no-ops
//! rather than errors: surfacing them as failures would make the sending
//! system retry indefinitely.

use crate::cms::CmsService;
use crate::db::{self, Pool};
use crate::model::BatchResult;
use crate::orchestrator::SyncOrchestrator;
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

const RECOGNIZED_EVENTS: [&str; 2] = ["item.published", "item.updated"];

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug)]
pub enum WebhookOutcome {
    Synced { slug: String, result: BatchResult },
    Ignored { reason: String },
}

pub struct WebhookIngestor {
    pool: Pool,
    cms: Arc<dyn CmsService>,
    orchestrator: Arc<SyncOrchestrator>,
    secret: Option<String>,
}

impl WebhookIngestor {
    pub fn new(
        pool: Pool,
        cms: Arc<dyn CmsService>,
        orchestrator: Arc<SyncOrchestrator>,
        secret: Option<String>,
    ) -> Self {
        Self {
            pool,
            cms,
            orchestrator,
            secret,
        }
    }

    /// Validate the event and, if it names a known mirror item, run a
    /// single-module reconciliation for the corresponding slug.
    pub async fn ingest(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        if let Some(expected) = &self.secret {
            if event.secret.as_deref() != Some(expected.as_str()) {
                return self.ignore("webhook secret mismatch");
            }
        }

        if !RECOGNIZED_EVENTS.contains(&event.event_type.as_str()) {
            return self.ignore(&format!("unrecognized event type '{}'", event.event_type));
        }

        let Some(item_id) = event.item_id.as_deref() else {
            return self.ignore("event has no item id");
        };

        // Resolve the mirror item to a slug: cheap primary lookup first, CMS
        // fetch for items we have never pushed.
        let slug = match db::find_slug_by_mirror_id(&self.pool, item_id).await? {
            Some(slug) => slug,
            None => match self.cms.fetch_module(item_id).await? {
                Some(item) => item.slug,
                None => {
                    return self.ignore(&format!("mirror item {} not found", item_id));
                }
            },
        };

        info!(slug, item_id, event_type = event.event_type, "webhook event dispatching sync");
        let result = self.orchestrator.sync_one(&slug).await?;
        Ok(WebhookOutcome::Synced { slug, result })
    }

    fn ignore(&self, reason: &str) -> Result<WebhookOutcome> {
        info!(reason, "webhook event ignored");
        Ok(WebhookOutcome::Ignored {
            reason: reason.to_string(),
        })
    }
}
