//! Zone locks and the rules that lift them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Quest-flag condition attached to a zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Every listed flag must be recorded.
    All(Vec<String>),
    /// At least one listed flag must be recorded.
    Any(Vec<String>),
}

impl Requirement {
    pub fn is_met(&self, completed: &BTreeSet<String>) -> bool {
        match self {
            Requirement::All(flags) => flags.iter().all(|f| completed.contains(f)),
            Requirement::Any(flags) => flags.iter().any(|f| completed.contains(f)),
        }
    }
}

/// Unlock condition for one zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRule {
    pub zone: String,
    pub requirement: Requirement,
}

/// Static unlock table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRules {
    rules: Vec<ZoneRule>,
}

fn flags(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl ZoneRules {
    pub fn new(rules: Vec<ZoneRule>) -> Self {
        Self { rules }
    }

    /// The Elementary-stage hub table.
    pub fn standard() -> Self {
        Self::new(vec![
            ZoneRule {
                zone: "Park".into(),
                requirement: Requirement::All(flags(&["HomeworkFound", "BullyDefeated"])),
            },
            ZoneRule {
                zone: "Home".into(),
                requirement: Requirement::All(flags(&["EmpathyGiven", "MindfulnessWin"])),
            },
            ZoneRule {
                zone: "Battle".into(),
                requirement: Requirement::Any(flags(&["ExamPassed", "MentorSupport"])),
            },
        ])
    }

    pub fn rule_for(&self, zone: &str) -> Option<&ZoneRule> {
        self.rules.iter().find(|r| r.zone == zone)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoneRule> {
        self.rules.iter()
    }

    /// Every zone named in the table; the initial lock set of a new game.
    pub fn all_zones(&self) -> LockedZones {
        LockedZones(self.rules.iter().map(|r| r.zone.clone()).collect())
    }
}

impl Default for ZoneRules {
    fn default() -> Self {
        Self::standard()
    }
}

/// Zones the player cannot enter yet.
///
/// Only shrinks: there is no way to lock a zone again once removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockedZones(BTreeSet<String>);

impl LockedZones {
    /// Initial lock set for a new game under `rules`.
    pub fn initial(rules: &ZoneRules) -> Self {
        rules.all_zones()
    }

    pub fn is_locked(&self, zone: &str) -> bool {
        self.0.contains(zone)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Zones locked in `self` but no longer locked in `after`.
    pub fn unlocked_since(&self, after: &LockedZones) -> Vec<String> {
        self.0.difference(&after.0).cloned().collect()
    }
}

/// Remove every zone whose rule is satisfied by `completed`.
///
/// Zones without a rule stay locked. Applying the function twice yields the
/// same set as applying it once.
pub fn recompute_locked_zones(
    completed: &BTreeSet<String>,
    locked: &LockedZones,
    rules: &ZoneRules,
) -> LockedZones {
    let remaining = locked
        .0
        .iter()
        .filter(|zone| match rules.rule_for(zone) {
            Some(rule) => !rule.requirement.is_met(completed),
            None => true,
        })
        .cloned()
        .collect();
    LockedZones(remaining)
}
