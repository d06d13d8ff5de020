//! Sync engine configuration.

use serde::{Deserialize, Serialize};

/// How overlapping mutations against one key are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Persist calls for one key run one at a time, in `mutate` call order.
    ///
    /// A failed mutation reverts the cache only when no later optimistic
    /// edit is queued behind it. Otherwise the later edit stays visible and
    /// a revert, if it comes, goes back to the last confirmed value.
    #[default]
    SerializePerKey,
    /// Every mutation persists immediately and reverts to the value it
    /// replaced. A slow failure can clobber a newer optimistic edit.
    Independent,
}

/// Runtime options for `SyncEngine`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub conflict_policy: ConflictPolicy,
}

impl SyncConfig {
    pub fn with_policy(conflict_policy: ConflictPolicy) -> Self {
        Self { conflict_policy }
    }
}
