//! Static quest content: NPC dialogue, choice effects and rewards.
//!
//! Content is authored in YAML and loaded once. A built-in catalog for the
//! Elementary hub ships with the crate.

use crate::player::Stage;
use crate::progression::QuestEffect;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const BUILTIN_QUESTS: &str = include_str!("../../../assets/quests.yaml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog: {0}")]
    Parse(String),
    #[error("duplicate quest id: {0}")]
    DuplicateQuest(String),
    #[error("quest {0} has no dialogue")]
    EmptyDialogue(String),
    #[error("quest {quest} node {node} has no choices")]
    NoChoices { quest: String, node: usize },
    #[error("unknown quest: {0}")]
    UnknownQuest(String),
    #[error("quest {quest} has no dialogue node {node} / choice {choice}")]
    NoSuchChoice {
        quest: String,
        node: usize,
        choice: usize,
    },
}

/// One selectable answer in a dialogue node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    #[serde(default)]
    pub effect: QuestEffect,
}

/// A line spoken by the quest NPC plus the player's possible replies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub text: String,
    pub choices: Vec<Choice>,
}

/// Payout on quest completion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    #[serde(default)]
    pub xp: u64,
    #[serde(default)]
    pub item: Option<String>,
}

/// Immutable quest definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    /// Quest id; also the flag recorded on completion.
    pub id: String,
    pub stage: Stage,
    pub npc: String,
    pub zone: String,
    pub dialogue: Vec<DialogueNode>,
    #[serde(default)]
    pub reward: Reward,
}

#[derive(Deserialize)]
struct CatalogFile {
    quests: Vec<Quest>,
}

/// Validated set of quests keyed by id.
#[derive(Clone, Debug, Default)]
pub struct QuestCatalog {
    quests: BTreeMap<String, Quest>,
}

impl QuestCatalog {
    /// Build a catalog from already-parsed quests.
    pub fn from_quests(quests: Vec<Quest>) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for q in quests {
            validate_quest(&q)?;
            if map.contains_key(&q.id) {
                return Err(CatalogError::DuplicateQuest(q.id));
            }
            map.insert(q.id.clone(), q);
        }
        Ok(Self { quests: map })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_yaml::from_str(text).map_err(|e| CatalogError::Parse(e.to_string()))?;
        let catalog = Self::from_quests(file.quests)?;
        debug!(quests = catalog.len(), "quest catalog loaded");
        Ok(catalog)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// The catalog bundled with the game.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_QUESTS)
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Quest> {
        self.quests.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.quests.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Quest> {
        self.quests.values()
    }

    pub fn for_stage(&self, stage: Stage) -> Vec<&Quest> {
        self.quests.values().filter(|q| q.stage == stage).collect()
    }

    pub fn in_zone(&self, zone: &str) -> Vec<&Quest> {
        self.quests.values().filter(|q| q.zone == zone).collect()
    }

    /// Quests for `stage` whose flag has not been recorded yet.
    pub fn available(&self, stage: Stage, completed: &BTreeSet<String>) -> Vec<&Quest> {
        self.quests
            .values()
            .filter(|q| q.stage == stage && !completed.contains(&q.id))
            .collect()
    }

    /// Effect of picking `choice` at dialogue `node` of `quest_id`.
    pub fn choose(&self, quest_id: &str, node: usize, choice: usize) -> Result<&QuestEffect, CatalogError> {
        let quest = self
            .get(quest_id)
            .ok_or_else(|| CatalogError::UnknownQuest(quest_id.to_string()))?;
        quest
            .dialogue
            .get(node)
            .and_then(|n| n.choices.get(choice))
            .map(|c| &c.effect)
            .ok_or_else(|| CatalogError::NoSuchChoice {
                quest: quest_id.to_string(),
                node,
                choice,
            })
    }
}

fn validate_quest(q: &Quest) -> Result<(), CatalogError> {
    if q.id.trim().is_empty() {
        return Err(CatalogError::Parse("quest id must not be empty".into()));
    }
    if q.dialogue.is_empty() {
        return Err(CatalogError::EmptyDialogue(q.id.clone()));
    }
    for (i, node) in q.dialogue.iter().enumerate() {
        if node.choices.is_empty() {
            return Err(CatalogError::NoChoices {
                quest: q.id.clone(),
                node: i,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_covers_every_unlock_flag() {
        let cat = QuestCatalog::builtin().unwrap();
        for flag in [
            "HomeworkFound",
            "BullyDefeated",
            "EmpathyGiven",
            "MindfulnessWin",
            "ExamPassed",
            "MentorSupport",
        ] {
            assert!(cat.contains(flag), "missing quest {flag}");
        }
        assert!(!cat.for_stage(Stage::Elementary).is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let yaml = r#"
quests:
  - id: A
    stage: Elementary
    npc: Teacher
    zone: School
    dialogue:
      - text: hi
        choices: [{ text: ok }]
  - id: A
    stage: Elementary
    npc: Teacher
    zone: School
    dialogue:
      - text: hi
        choices: [{ text: ok }]
"#;
        assert!(matches!(
            QuestCatalog::from_yaml_str(yaml),
            Err(CatalogError::DuplicateQuest(id)) if id == "A"
        ));
    }

    #[test]
    fn empty_choice_list_is_rejected() {
        let yaml = r#"
quests:
  - id: B
    stage: Middle
    npc: Coach
    zone: Gym
    dialogue:
      - text: hi
        choices: []
"#;
        assert!(matches!(
            QuestCatalog::from_yaml_str(yaml),
            Err(CatalogError::NoChoices { node: 0, .. })
        ));
    }

    #[test]
    fn choose_returns_effect_or_error() {
        let yaml = r#"
quests:
  - id: C
    stage: Elementary
    npc: Librarian
    zone: School
    dialogue:
      - text: Need help?
        choices:
          - text: Sure
            effect: { xp: 25, quest: C }
          - text: Not now
"#;
        let cat = QuestCatalog::from_yaml_str(yaml).unwrap();
        assert_eq!(cat.choose("C", 0, 0).unwrap(), &QuestEffect::flag(25, "C"));
        assert_eq!(cat.choose("C", 0, 1).unwrap(), &QuestEffect::default());
        assert!(matches!(cat.choose("C", 1, 0), Err(CatalogError::NoSuchChoice { .. })));
        assert!(matches!(cat.choose("Z", 0, 0), Err(CatalogError::UnknownQuest(_))));
    }

    #[test]
    fn available_skips_completed() {
        let cat = QuestCatalog::builtin().unwrap();
        let mut done = BTreeSet::new();
        let before = cat.available(Stage::Elementary, &done).len();
        done.insert("HomeworkFound".to_string());
        assert_eq!(cat.available(Stage::Elementary, &done).len(), before - 1);
    }
}
