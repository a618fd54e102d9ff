//! Direction resolution: the pure decision table at the heart of the engine.
//!
//! Given the last-modified timestamps of a module in each store, decide which
//! way content flows. No I/O here; the orchestrator feeds in whatever the
//! locator found.

use crate::model::{SyncAction, SyncDecision};
use chrono::{DateTime, Duration, Utc};

/// Evaluate the decision table. `tolerance` is the "same time" band: two
/// timestamps within it count as equal, so clock skew between the stores
/// cannot produce an endless push/pull loop. Precedence is exactly:
/// presence beats timestamps, primary-newer beats mirror-newer.
pub fn decide(
    primary: Option<DateTime<Utc>>,
    mirror: Option<DateTime<Utc>>,
    tolerance: Duration,
) -> SyncDecision {
    match (primary, mirror) {
        (Some(_), None) => SyncDecision {
            action: SyncAction::Push,
            reason: "present only in primary store",
        },
        (None, Some(_)) => SyncDecision {
            action: SyncAction::Pull,
            reason: "present only in mirror store",
        },
        (Some(p), Some(m)) => {
            let skew = p - m;
            if skew > tolerance {
                SyncDecision {
                    action: SyncAction::Push,
                    reason: "primary is newer",
                }
            } else if -skew > tolerance {
                SyncDecision {
                    action: SyncAction::Pull,
                    reason: "mirror is newer",
                }
            } else {
                SyncDecision {
                    action: SyncAction::None,
                    reason: "timestamps equal within tolerance",
                }
            }
        }
        (None, None) => SyncDecision {
            action: SyncAction::None,
            reason: "absent from both stores",
        },
    }
}
