//! Player record and its validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Coarse life-phase bucket gating which content is offered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Primary school years; the starting stage.
    #[default]
    Elementary,
    /// Middle school.
    Middle,
    /// High school and adult life.
    #[serde(alias = "Adult", alias = "High/Adult")]
    High,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Elementary => "Elementary",
            Stage::Middle => "Middle",
            Stage::High => "High",
        };
        f.pad(s)
    }
}

/// In-memory record of a single player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    /// Account email; unique key for server-backed saves.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Accumulated experience points.
    pub xp: u64,
    /// Current level (>= 1), derived from `xp`.
    pub level: u32,
    /// Current life stage.
    #[serde(default)]
    pub stage: Stage,
    /// Quest flags recorded so far.
    #[serde(default)]
    pub completed_quests: BTreeSet<String>,
    /// Items in pickup order.
    #[serde(default)]
    pub inventory: Vec<String>,
}

impl PlayerInfo {
    /// Fresh level-1 player with no progress.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            xp: 0,
            level: 1,
            stage: Stage::Elementary,
            completed_quests: BTreeSet::new(),
            inventory: Vec::new(),
        }
    }

    /// Builder-style stage override.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn has_completed(&self, quest: &str) -> bool {
        self.completed_quests.contains(quest)
    }
}

impl Default for PlayerInfo {
    fn default() -> Self {
        Self::new("Player", "player@localhost")
    }
}

/// Validation errors for player invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Name is empty or whitespace.
    #[error("player name must not be empty")]
    EmptyName,
    /// Email lacks a local part, an `@`, or a domain.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    /// Level must start at 1.
    #[error("level must be >= 1")]
    ZeroLevel,
    /// Inventory entries must be non-empty identifiers.
    #[error("inventory contains an empty item id")]
    EmptyItem,
}

fn validate_email(email: &str) -> Result<(), ValidationError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.trim().is_empty() && !domain.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidEmail(email.to_string())),
    }
}

/// Validate a player record before it is persisted or accepted from the wire.
pub fn validate_player(p: &PlayerInfo) -> Result<(), ValidationError> {
    if p.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    validate_email(&p.email)?;
    if p.level == 0 {
        return Err(ValidationError::ZeroLevel);
    }
    if p.inventory.iter().any(|i| i.trim().is_empty()) {
        return Err(ValidationError::EmptyItem);
    }
    Ok(())
}
