#![deny(warnings)]

//! Core domain models and progression rules for LifeQuest.
//!
//! This crate defines the serializable player state, the quest catalog and
//! the pure functions that advance a player: XP grants, level recomputation
//! and zone unlocks. Nothing in here performs I/O.

pub mod catalog;
pub mod overlay;
pub mod player;
pub mod progression;
pub mod zones;

pub use catalog::{CatalogError, Choice, DialogueNode, Quest, QuestCatalog, Reward};
pub use overlay::OverlayRequest;
pub use player::{validate_player, PlayerInfo, Stage, ValidationError};
pub use progression::{
    apply_quest_effect, level_for_xp, level_progress, next_level_threshold, BattleOutcome,
    LevelCurve, LevelProgress, QuestEffect,
};
pub use zones::{recompute_locked_zones, LockedZones, Requirement, ZoneRule, ZoneRules};
