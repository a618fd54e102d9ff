//! Per-module presence resolution across both stores.
//!
//! Every store query yields a three-valued outcome: present, absent, or (via
//! `Err`) unreachable. An unreachable store aborts that module's pass as a
//! `Lookup` error; it is never read as "the record doesn't exist there",
//! which would invite spurious one-sided syncs during an outage.

use crate::cms::model::MirrorModule;
use crate::cms::CmsService;
use crate::db::{self, Pool};
use crate::model::{Module, Store, SyncError};
use tracing::debug;

#[derive(Debug, Clone)]
pub enum StoreLookup<T> {
    Present(T),
    Absent,
}

impl<T> StoreLookup<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, StoreLookup::Present(_))
    }

    pub fn as_present(&self) -> Option<&T> {
        match self {
            StoreLookup::Present(v) => Some(v),
            StoreLookup::Absent => None,
        }
    }
}

impl<T> From<Option<T>> for StoreLookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => StoreLookup::Present(v),
            None => StoreLookup::Absent,
        }
    }
}

/// Both sides of one module's state, as found right now.
#[derive(Debug, Clone)]
pub struct Located {
    pub primary: StoreLookup<Module>,
    pub mirror: StoreLookup<MirrorModule>,
}

/// Resolve a module's presence and timestamps in both stores.
///
/// Mirror-side lookup goes by the primary record's `mirror_id` when one is
/// set; a stale id (item deleted mirror-side) falls back to a slug query, as
/// does the no-primary-record case, which is what catches items created
/// out-of-band directly in the CMS.
pub async fn locate(pool: &Pool, cms: &dyn CmsService, slug: &str) -> Result<Located, SyncError> {
    let primary = db::get_module_by_slug(pool, slug)
        .await
        .map_err(|err| SyncError::Lookup {
            store: Store::Primary,
            reason: format!("{err:#}"),
        })?;

    let mirror = match primary.as_ref().and_then(|m| m.mirror_id.as_deref()) {
        Some(mirror_id) => {
            let by_id = cms
                .fetch_module(mirror_id)
                .await
                .map_err(|err| SyncError::Lookup {
                    store: Store::Mirror,
                    reason: format!("{err:#}"),
                })?;
            match by_id {
                Some(item) => Some(item),
                None => {
                    debug!(slug, mirror_id, "mirror id is stale; falling back to slug lookup");
                    find_by_slug(cms, slug).await?
                }
            }
        }
        None => find_by_slug(cms, slug).await?,
    };

    Ok(Located {
        primary: primary.into(),
        mirror: mirror.into(),
    })
}

async fn find_by_slug(cms: &dyn CmsService, slug: &str) -> Result<Option<MirrorModule>, SyncError> {
    cms.find_module_by_slug(slug)
        .await
        .map_err(|err| SyncError::Lookup {
            store: Store::Mirror,
            reason: format!("{err:#}"),
        })
}
