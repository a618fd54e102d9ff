//! Push and pull execution: the one-way copies resolved by the decision
//! table. Both directions isolate failures per module and retry transient
//! write failures a bounded number of times with exponential backoff.

use crate::cms::model::MirrorModule;
use crate::cms::CmsService;
use crate::db::{self, Pool};
use crate::mapper::FieldMapper;
use crate::model::{Module, Store, SyncError};
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Always >= 1.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Exponential backoff: base * 2^(attempt-1), capped at one minute.
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(10);
        let raw = self.base_delay.saturating_mul(factor);
        raw.min(Duration::from_secs(60))
    }
}

/// Run `op` until it succeeds or the policy is exhausted, then surface the
/// last error as a `Write` failure for the given store.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    store: Store,
    op: F,
) -> Result<T, SyncError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.attempts {
                    return Err(SyncError::Write {
                        store,
                        attempts: attempt,
                        reason: format!("{err:#}"),
                    });
                }
                let delay = policy.delay(attempt);
                warn!(
                    %store,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %format!("{err:#}"),
                    "write failed; backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Primary → mirror. Create-or-update the mirror item; a stale `mirror_id`
/// (item deleted mirror-side) falls through to a fresh create whose id the
/// primary record adopts. After the write, the primary row is re-stamped so
/// both timestamps land inside the tolerance window; the re-stamp only
/// applies if the row still carries the timestamp this pass acted on, so an
/// edit that lands mid-push keeps its newer timestamp and re-syncs next pass.
pub async fn push_module(
    pool: &Pool,
    cms: &dyn CmsService,
    mapper: &FieldMapper,
    policy: &RetryPolicy,
    module: &Module,
) -> Result<(), SyncError> {
    // Mapping is checked before anything is written: a module with an
    // unmappable category or tag leaves the mirror untouched.
    let fields = mapper.to_mirror_fields(module)?;

    let adopted_id = match module.mirror_id.as_deref() {
        Some(mirror_id) => {
            let updated =
                with_retry(policy, Store::Mirror, || cms.update_module(mirror_id, &fields)).await?;
            if updated {
                None
            } else {
                warn!(slug = %module.slug, mirror_id, "mirror item gone; re-creating");
                Some(with_retry(policy, Store::Mirror, || cms.create_module(&fields)).await?)
            }
        }
        None => Some(with_retry(policy, Store::Mirror, || cms.create_module(&fields)).await?),
    };

    if let Some(id) = &adopted_id {
        with_retry(policy, Store::Primary, || {
            db::set_mirror_id(pool, &module.slug, id)
        })
        .await?;
    }

    let aligned = with_retry(policy, Store::Primary, || {
        db::align_updated_at(pool, &module.slug, module.updated_at, Utc::now())
    })
    .await?;
    if !aligned {
        info!(slug = %module.slug, "primary row changed during push; timestamp kept for next pass");
    }

    info!(slug = %module.slug, created = adopted_id.is_some(), "pushed module to mirror");
    Ok(())
}

/// Mirror → primary. A new slug lands as a draft (pulled content has not
/// passed this system's publish gate); an existing record gets its content
/// fields replaced while primary-only fields stay put. The primary row takes
/// the mirror's timestamp so the next pass resolves to no action.
pub async fn pull_module(
    pool: &Pool,
    mapper: &FieldMapper,
    policy: &RetryPolicy,
    item: &MirrorModule,
) -> Result<(), SyncError> {
    let draft = mapper.to_primary_fields(item)?;

    let existing = db::get_module_by_slug(pool, &draft.slug)
        .await
        .map_err(|err| SyncError::Lookup {
            store: Store::Primary,
            reason: format!("{err:#}"),
        })?;

    if existing.is_some() {
        with_retry(policy, Store::Primary, || {
            db::update_pulled_module(pool, &draft, &item.id, item.updated_at)
        })
        .await?;
    } else {
        with_retry(policy, Store::Primary, || async {
            db::create_pulled_module(pool, &draft, &item.id, item.updated_at)
                .await
                .map(|_| ())
        })
        .await?;
    }

    info!(slug = %draft.slug, created = existing.is_none(), "pulled module from mirror");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), Store::Mirror, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("transient"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_exhaustion_reports_write_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(3), Store::Mirror, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("down"))
        })
        .await;
        match result.unwrap_err() {
            SyncError::Write {
                store, attempts, ..
            } => {
                assert_eq!(store, Store::Mirror);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected write failure, got {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
        let huge = RetryPolicy::new(5, Duration::from_secs(50));
        assert_eq!(huge.delay(4), Duration::from_secs(60));
    }
}
