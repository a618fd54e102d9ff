//! Batch reconciliation: iterate the module universe, resolve a direction
//! per slug, and dispatch the corresponding one-way copy.
//!
//! No intermediate state is persisted between or during runs; a run aborted
//! at any iteration boundary leaves nothing to clean up, and re-running is
//! always safe because push and pull are idempotent upserts.

use crate::cms::CmsService;
use crate::config::Config;
use crate::db::{self, Pool};
use crate::locator;
use crate::mapper::{FieldMapper, ReferenceIndex};
use crate::model::{BatchResult, ModuleStatus, SyncAction, SyncError, SyncStatus};
use crate::resolve;
use crate::sync::{self, RetryPolicy};
use anyhow::{anyhow, Context, Result};
use chrono::Duration as ChronoDuration;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A per-module failure paired with the action that was being attempted when
/// it happened, for the batch report.
struct ModuleFailure {
    action: SyncAction,
    error: SyncError,
}

pub struct SyncOrchestrator {
    pool: Pool,
    cms: Arc<dyn CmsService>,
    tolerance: ChronoDuration,
    retry: RetryPolicy,
    cancel: Arc<AtomicBool>,
}

impl SyncOrchestrator {
    pub fn new(pool: Pool, cms: Arc<dyn CmsService>, cfg: &Config) -> Self {
        Self {
            pool,
            cms,
            tolerance: ChronoDuration::seconds(cfg.app.tolerance_seconds as i64),
            retry: RetryPolicy::new(
                cfg.app.retry_attempts,
                Duration::from_millis(cfg.app.retry_base_ms),
            ),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked at each iteration boundary of `sync_all`. Setting it
    /// aborts the run between modules; the partial result is returned.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Fetch the mirror's reference collections and build the field mapper.
    /// Failing here is fatal for the whole pass, not per-module: without the
    /// index nothing can be mapped in either direction.
    async fn load_mapper(&self) -> Result<FieldMapper> {
        let categories = self
            .cms
            .list_categories()
            .await
            .context("failed to load mirror category references")?;
        let tags = self
            .cms
            .list_tags()
            .await
            .context("failed to load mirror tag references")?;
        Ok(FieldMapper::new(ReferenceIndex::new(categories, tags)))
    }

    /// Reconcile a single module end to end: locate, decide, execute.
    async fn reconcile(&self, mapper: &FieldMapper, slug: &str) -> Result<SyncAction, ModuleFailure> {
        let located = locator::locate(&self.pool, self.cms.as_ref(), slug)
            .await
            .map_err(|error| ModuleFailure {
                action: SyncAction::None,
                error,
            })?;

        let decision = resolve::decide(
            located.primary.as_present().map(|m| m.updated_at),
            located.mirror.as_present().map(|i| i.updated_at),
            self.tolerance,
        );
        debug!(slug, action = %decision.action, reason = decision.reason, "direction resolved");

        match decision.action {
            SyncAction::Push => match located.primary.as_present() {
                Some(module) if module.status == ModuleStatus::Published => {
                    sync::push_module(&self.pool, self.cms.as_ref(), mapper, &self.retry, module)
                        .await
                        .map_err(|error| ModuleFailure {
                            action: SyncAction::Push,
                            error,
                        })?;
                    Ok(SyncAction::Push)
                }
                Some(module) => {
                    // The mirror never holds unpublished drafts; the publish
                    // gate lives here, in the caller, not in the resolver.
                    debug!(slug, status = module.status.as_str(), "push suppressed for unpublished module");
                    Ok(SyncAction::None)
                }
                None => Ok(SyncAction::None),
            },
            SyncAction::Pull => match located.mirror.as_present() {
                Some(item) => {
                    sync::pull_module(&self.pool, mapper, &self.retry, item)
                        .await
                        .map_err(|error| ModuleFailure {
                            action: SyncAction::Pull,
                            error,
                        })?;
                    Ok(SyncAction::Pull)
                }
                None => Ok(SyncAction::None),
            },
            SyncAction::None => Ok(SyncAction::None),
        }
    }

    /// Reconcile one module, used by manual sync and webhook dispatch.
    #[instrument(skip(self))]
    pub async fn sync_one(&self, slug: &str) -> Result<BatchResult> {
        let mapper = self.load_mapper().await?;
        let mut result = BatchResult::new();
        info!(run_id = %result.run_id, slug, "reconciling single module");
        match self.reconcile(&mapper, slug).await {
            Ok(action) => result.record_action(action),
            Err(failure) => {
                warn!(slug, action = %failure.action, error = %failure.error, "module reconciliation failed");
                result.record_failure(slug, failure.action, &failure.error);
            }
        }
        Ok(result)
    }

    /// Reconcile the full catalog: the union of published primary modules
    /// and everything the mirror holds. Modules are processed sequentially
    /// and independently; one failure never aborts the rest.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<BatchResult> {
        // Fatal problems (bad credentials, store entirely down) surface once
        // here instead of failing every module individually.
        db::ping(&self.pool)
            .await
            .context("primary store pre-flight failed")?;
        self.cms
            .check_auth()
            .await
            .context("mirror store pre-flight failed")?;

        let mapper = self.load_mapper().await?;

        let mut slugs: BTreeSet<String> = db::list_published_slugs(&self.pool)
            .await?
            .into_iter()
            .collect();
        for item in self
            .cms
            .list_modules()
            .await
            .context("failed to list mirror modules")?
        {
            slugs.insert(item.slug);
        }

        let mut result = BatchResult::new();
        info!(run_id = %result.run_id, candidates = slugs.len(), "starting full reconciliation pass");

        for slug in slugs {
            if self.cancel.load(Ordering::Relaxed) {
                warn!(run_id = %result.run_id, "reconciliation cancelled; returning partial result");
                break;
            }
            match self.reconcile(&mapper, &slug).await {
                Ok(action) => result.record_action(action),
                Err(failure) => {
                    warn!(slug, action = %failure.action, error = %failure.error, "module reconciliation failed");
                    result.record_failure(&slug, failure.action, &failure.error);
                }
            }
        }

        info!(
            run_id = %result.run_id,
            processed = result.processed,
            succeeded = result.succeeded,
            failed = result.failed,
            noop = result.noop,
            "reconciliation pass finished"
        );
        Ok(result)
    }

    /// Read-only projection of locate + decide. No writes.
    #[instrument(skip(self))]
    pub async fn sync_status(&self, slug: &str) -> Result<SyncStatus> {
        let located = locator::locate(&self.pool, self.cms.as_ref(), slug).await?;
        let decision = resolve::decide(
            located.primary.as_present().map(|m| m.updated_at),
            located.mirror.as_present().map(|i| i.updated_at),
            self.tolerance,
        );
        Ok(SyncStatus {
            slug: slug.to_string(),
            in_primary: located.primary.is_present(),
            in_mirror: located.mirror.is_present(),
            needs_sync: decision.action != SyncAction::None,
            direction: decision.action,
        })
    }

    /// Explicit deletion flow: remove the mirror item and clear the primary
    /// record's `mirror_id`. The only path that ever clears it.
    #[instrument(skip(self))]
    pub async fn delete_mirror(&self, slug: &str) -> Result<()> {
        let module = db::get_module_by_slug(&self.pool, slug)
            .await?
            .ok_or_else(|| anyhow!("module {} not found in primary store", slug))?;

        match module.mirror_id.as_deref() {
            Some(mirror_id) => {
                self.cms
                    .delete_module(mirror_id)
                    .await
                    .context("failed to delete mirror item")?;
                db::clear_mirror_id(&self.pool, slug).await?;
                info!(slug, mirror_id, "mirror item deleted and linkage cleared");
            }
            None => {
                info!(slug, "module has no mirror linkage; nothing to delete");
            }
        }
        Ok(())
    }
}
