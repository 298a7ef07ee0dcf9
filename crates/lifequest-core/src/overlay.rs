//! Requests for the presentation layer.
//!
//! The session emits these instead of driving UI directly; a single renderer
//! matches on the variant.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayRequest {
    /// Show a dialogue node of a quest.
    Dialogue {
        quest: String,
        node: usize,
        npc: String,
        text: String,
        choices: Vec<String>,
    },
    /// A quest was completed and its reward paid out.
    QuestCompleted {
        quest: String,
        xp: u64,
        item: Option<String>,
    },
    LevelUp { from: u32, to: u32 },
    ZoneUnlocked { zone: String },
    ItemAcquired { item: String },
    /// A save attempt failed; more attempts will follow.
    SaveFailed { attempt: u32, reason: String },
    /// Retries are exhausted; progress is no longer being persisted.
    PersistentSaveUnavailable { reason: String },
}

impl OverlayRequest {
    /// Whether the request should interrupt play rather than show as a toast.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            OverlayRequest::Dialogue { .. } | OverlayRequest::PersistentSaveUnavailable { .. }
        )
    }
}
