//! The game session: single owner of the mutable player state.

use crate::autosave::{AutoSave, SaveStatus, Snapshot};
use lifequest_core::{
    apply_quest_effect, level_progress, recompute_locked_zones, BattleOutcome, CatalogError,
    LevelCurve, LevelProgress, LockedZones, OverlayRequest, PlayerInfo, Quest, QuestCatalog,
    QuestEffect, Stage, ZoneRules,
};
use persistence::{KeyValueStore, PersistError, SaveKey, SaveManager};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("quest {0} is already completed")]
    AlreadyCompleted(String),
    #[error("quest {quest} is in locked zone {zone}")]
    ZoneLocked { quest: String, zone: String },
    #[error("quest {quest} belongs to stage {required}, player is in {current}")]
    WrongStage {
        quest: String,
        required: String,
        current: String,
    },
}

/// Owns the player, the zone locks and the optional autosave handle.
///
/// Every mutation recomputes derived state, queues overlay requests and
/// publishes a snapshot for persistence.
pub struct GameSession {
    player: PlayerInfo,
    locked: LockedZones,
    rules: ZoneRules,
    catalog: Arc<QuestCatalog>,
    curve: LevelCurve,
    revision: u64,
    overlays: Vec<OverlayRequest>,
    autosave: Option<AutoSave>,
}

impl GameSession {
    /// Start a session for `player` (new or loaded). Zone locks are derived
    /// from the player's recorded quest flags.
    pub fn new(player: PlayerInfo, catalog: Arc<QuestCatalog>, rules: ZoneRules, curve: LevelCurve) -> Self {
        let locked = recompute_locked_zones(&player.completed_quests, &LockedZones::initial(&rules), &rules);
        Self {
            player,
            locked,
            rules,
            catalog,
            curve,
            revision: 0,
            overlays: Vec::new(),
            autosave: None,
        }
    }

    /// Fresh player at level 1 with every zone locked.
    pub fn new_game(
        name: impl Into<String>,
        email: impl Into<String>,
        stage: Stage,
        catalog: Arc<QuestCatalog>,
        curve: LevelCurve,
    ) -> Self {
        Self::new(PlayerInfo::new(name, email).with_stage(stage), catalog, ZoneRules::standard(), curve)
    }

    /// Continue from the save under `key`, or from a default player when the
    /// save is missing or unreadable.
    pub fn resume<S: KeyValueStore>(
        saves: &SaveManager<S>,
        key: &SaveKey,
        catalog: Arc<QuestCatalog>,
        curve: LevelCurve,
    ) -> Self {
        let player = load_player(saves, key).unwrap_or_default();
        Self::new(player, catalog, ZoneRules::standard(), curve)
    }

    /// Attach a running autosave; the current state is published at once.
    pub fn with_autosave(mut self, autosave: AutoSave) -> Self {
        self.autosave = Some(autosave);
        self.touch();
        self
    }

    pub fn player(&self) -> &PlayerInfo {
        &self.player
    }

    pub fn locked_zones(&self) -> &LockedZones {
        &self.locked
    }

    pub fn catalog(&self) -> &QuestCatalog {
        &self.catalog
    }

    /// Number of mutations since the session started.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn progress(&self) -> LevelProgress {
        level_progress(self.player.xp, self.player.level)
    }

    pub fn save_status(&self) -> Option<SaveStatus> {
        self.autosave.as_ref().map(AutoSave::status)
    }

    /// Quests the player can pick up right now.
    pub fn available_quests(&self) -> Vec<&Quest> {
        self.catalog
            .available(self.player.stage, &self.player.completed_quests)
            .into_iter()
            .filter(|q| !self.locked.is_locked(&q.zone))
            .collect()
    }

    /// Apply a raw effect (dialogue choice, scripted event, battle).
    pub fn apply_effect(&mut self, effect: &QuestEffect) {
        if let Some(q) = &effect.quest {
            if !self.catalog.contains(q) {
                warn!(quest = %q, "recording quest flag that is not in the catalog");
            }
        }
        let newly_recorded = effect
            .quest
            .as_ref()
            .filter(|q| !self.player.has_completed(q))
            .cloned();
        self.advance(effect);
        if let Some(id) = newly_recorded {
            self.pay_reward(&id);
        }
        self.touch();
    }

    /// Show the first dialogue node of a quest.
    pub fn open_dialogue(&mut self, quest_id: &str) -> Result<(), SessionError> {
        let quest = self.accessible_quest(quest_id)?;
        let request = dialogue_request(&quest, 0);
        if let Some(r) = request {
            self.overlays.push(r);
        }
        Ok(())
    }

    /// Pick `choice` at `node` of a quest's dialogue.
    ///
    /// Returns the index of the next node, if the dialogue continues.
    pub fn choose_dialogue(&mut self, quest_id: &str, node: usize, choice: usize) -> Result<Option<usize>, SessionError> {
        let quest = self.accessible_quest(quest_id)?;
        let effect = self.catalog.choose(quest_id, node, choice)?.clone();
        self.apply_effect(&effect);
        let next = node + 1;
        match dialogue_request(&quest, next) {
            Some(r) => {
                self.overlays.push(r);
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Mark a catalog quest complete outside of dialogue and pay its reward.
    pub fn complete_quest(&mut self, quest_id: &str) -> Result<(), SessionError> {
        let quest = self.accessible_quest(quest_id)?;
        if self.player.has_completed(&quest.id) {
            return Err(SessionError::AlreadyCompleted(quest.id));
        }
        self.apply_effect(&QuestEffect::flag(0, quest.id));
        Ok(())
    }

    pub fn record_battle(&mut self, outcome: &BattleOutcome) {
        info!(?outcome, "battle finished");
        self.apply_effect(&outcome.effect());
    }

    pub fn add_item(&mut self, item: impl Into<String>) {
        let item = item.into();
        self.player.inventory.push(item.clone());
        self.overlays.push(OverlayRequest::ItemAcquired { item });
        self.touch();
    }

    /// Pending overlay requests, including save notifications.
    pub fn drain_overlays(&mut self) -> Vec<OverlayRequest> {
        let mut out = std::mem::take(&mut self.overlays);
        if let Some(auto) = self.autosave.as_mut() {
            out.extend(auto.drain_notices());
        }
        out
    }

    /// Flush pending saves and stop the autosave task.
    pub async fn shutdown(mut self) -> (PlayerInfo, Option<SaveStatus>) {
        let status = match self.autosave.take() {
            Some(auto) => {
                let (status, notices) = auto.shutdown().await;
                for n in notices {
                    warn!(?n, "undelivered save notification at shutdown");
                }
                Some(status)
            }
            None => None,
        };
        (self.player, status)
    }

    fn accessible_quest(&self, quest_id: &str) -> Result<Quest, SessionError> {
        let quest = self
            .catalog
            .get(quest_id)
            .ok_or_else(|| CatalogError::UnknownQuest(quest_id.to_string()))?;
        if quest.stage != self.player.stage {
            return Err(SessionError::WrongStage {
                quest: quest.id.clone(),
                required: quest.stage.to_string(),
                current: self.player.stage.to_string(),
            });
        }
        if self.locked.is_locked(&quest.zone) {
            return Err(SessionError::ZoneLocked {
                quest: quest.id.clone(),
                zone: quest.zone.clone(),
            });
        }
        Ok(quest.clone())
    }

    /// Apply progression rules without rewards or publishing.
    fn advance(&mut self, effect: &QuestEffect) {
        let before = self.player.level;
        let next = apply_quest_effect(&self.player, effect, self.curve);
        if next.level > before {
            info!(from = before, to = next.level, "level up");
            self.overlays.push(OverlayRequest::LevelUp {
                from: before,
                to: next.level,
            });
        }
        let locked = recompute_locked_zones(&next.completed_quests, &self.locked, &self.rules);
        for zone in self.locked.unlocked_since(&locked) {
            info!(%zone, "zone unlocked");
            self.overlays.push(OverlayRequest::ZoneUnlocked { zone });
        }
        self.player = next;
        self.locked = locked;
    }

    fn pay_reward(&mut self, quest_id: &str) {
        let Some(reward) = self.catalog.get(quest_id).map(|q| q.reward.clone()) else {
            return;
        };
        self.advance(&QuestEffect::xp(reward.xp));
        if let Some(item) = &reward.item {
            self.player.inventory.push(item.clone());
        }
        info!(quest = %quest_id, xp = reward.xp, "quest completed");
        self.overlays.push(OverlayRequest::QuestCompleted {
            quest: quest_id.to_string(),
            xp: reward.xp,
            item: reward.item,
        });
    }

    fn touch(&mut self) {
        self.revision += 1;
        if let Some(auto) = &self.autosave {
            auto.publish(Snapshot {
                revision: self.revision,
                player: self.player.clone(),
            });
        }
    }
}

fn dialogue_request(quest: &Quest, node: usize) -> Option<OverlayRequest> {
    quest.dialogue.get(node).map(|n| OverlayRequest::Dialogue {
        quest: quest.id.clone(),
        node,
        npc: quest.npc.clone(),
        text: n.text.clone(),
        choices: n.choices.iter().map(|c| c.text.clone()).collect(),
    })
}

/// Load the player stored under `key`, or `None` when there is nothing
/// usable. Corrupt saves are logged and ignored.
pub fn load_player<S: KeyValueStore>(saves: &SaveManager<S>, key: &SaveKey) -> Option<PlayerInfo> {
    match saves.load(key) {
        Ok(p) => Some(p),
        Err(PersistError::NotFound(_)) => {
            info!(%key, "no save found, starting fresh");
            None
        }
        Err(PersistError::Corrupt { key, reason }) => {
            warn!(%key, %reason, "save is corrupted, starting fresh");
            None
        }
        Err(e) => {
            error!(%key, error = %e, "failed to load save, starting fresh");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutoSaveConfig, RetryConfig};
    use persistence::MemoryStore;
    use std::sync::Mutex;

    fn session() -> GameSession {
        GameSession::new_game(
            "Ava",
            "ava@example.com",
            Stage::Elementary,
            Arc::new(QuestCatalog::builtin().unwrap()),
            LevelCurve::SingleStep,
        )
    }

    #[test]
    fn dialogue_completion_pays_reward_once() {
        let mut s = session();
        s.open_dialogue("BullyDefeated").unwrap();
        assert_eq!(s.choose_dialogue("BullyDefeated", 0, 0).unwrap(), None);
        let p = s.player();
        assert!(p.has_completed("BullyDefeated"));
        // 40 from the choice + 60 reward
        assert_eq!(p.xp, 100);
        assert_eq!(p.level, 2);
        assert_eq!(p.inventory, vec!["Courage Badge".to_string()]);

        let overlays = s.drain_overlays();
        assert!(matches!(overlays[0], OverlayRequest::Dialogue { node: 0, .. }));
        assert!(overlays.contains(&OverlayRequest::QuestCompleted {
            quest: "BullyDefeated".into(),
            xp: 60,
            item: Some("Courage Badge".into()),
        }));
        assert!(overlays.contains(&OverlayRequest::LevelUp { from: 1, to: 2 }));

        // Replaying the choice grants the choice XP but no second reward.
        s.choose_dialogue("BullyDefeated", 0, 0).unwrap();
        assert_eq!(s.player().xp, 140);
        assert_eq!(s.player().inventory.len(), 1);
        assert!(matches!(
            s.complete_quest("BullyDefeated"),
            Err(SessionError::AlreadyCompleted(_))
        ));
    }

    #[test]
    fn multi_node_dialogue_advances() {
        let mut s = session();
        assert_eq!(s.choose_dialogue("HomeworkFound", 0, 0).unwrap(), Some(1));
        assert!(!s.player().has_completed("HomeworkFound"));
        assert_eq!(s.choose_dialogue("HomeworkFound", 1, 0).unwrap(), None);
        assert!(s.player().has_completed("HomeworkFound"));
    }

    #[test]
    fn park_unlocks_after_both_flags() {
        let mut s = session();
        s.complete_quest("HomeworkFound").unwrap();
        assert!(s.locked_zones().is_locked("Park"));
        s.complete_quest("BullyDefeated").unwrap();
        assert!(!s.locked_zones().is_locked("Park"));
        let overlays = s.drain_overlays();
        assert!(overlays.contains(&OverlayRequest::ZoneUnlocked { zone: "Park".into() }));
    }

    #[test]
    fn battle_victory_can_unlock_battle_zone() {
        let mut s = session();
        s.record_battle(&BattleOutcome::Defeat);
        assert_eq!(s.player().xp, 0);
        s.record_battle(&BattleOutcome::Victory {
            xp: 10,
            flag: Some("MentorSupport".into()),
        });
        assert!(!s.locked_zones().is_locked("Battle"));
        // 10 battle XP + 45 MentorSupport reward
        assert_eq!(s.player().xp, 55);
    }

    #[test]
    fn stage_and_catalog_are_checked() {
        let mut s = session();
        assert!(matches!(
            s.open_dialogue("BudgetBasics"),
            Err(SessionError::WrongStage { .. })
        ));
        assert!(matches!(
            s.complete_quest("Nope"),
            Err(SessionError::Catalog(CatalogError::UnknownQuest(_)))
        ));
        let mut adult = GameSession::new(
            PlayerInfo::new("Kai", "kai@example.com").with_stage(Stage::High),
            Arc::new(QuestCatalog::builtin().unwrap()),
            ZoneRules::standard(),
            LevelCurve::SingleStep,
        );
        adult.complete_quest("FirstInterview").unwrap();
        assert_eq!(adult.player().inventory, vec!["Offer Letter".to_string()]);
    }

    #[test]
    fn loaded_player_starts_with_derived_locks() {
        let mut p = PlayerInfo::new("Ava", "ava@example.com");
        p.completed_quests.insert("ExamPassed".into());
        let s = GameSession::new(
            p,
            Arc::new(QuestCatalog::builtin().unwrap()),
            ZoneRules::standard(),
            LevelCurve::SingleStep,
        );
        assert!(!s.locked_zones().is_locked("Battle"));
        assert!(s.locked_zones().is_locked("Park"));
    }

    #[test]
    fn every_mutation_bumps_revision() {
        let mut s = session();
        s.add_item("Pencil");
        s.apply_effect(&QuestEffect::xp(5));
        assert_eq!(s.revision(), 2);
        assert_eq!(s.progress().remaining, 95);
    }

    #[test]
    fn load_player_falls_back_on_corruption() {
        let mut store = MemoryStore::new();
        store.put("lifequest_slot1", "garbage").unwrap();
        let saves = SaveManager::new(store);
        assert!(load_player(&saves, &SaveKey::slot(1).unwrap()).is_none());
        assert!(load_player(&saves, &SaveKey::slot(2).unwrap()).is_none());
        let s = GameSession::resume(
            &saves,
            &SaveKey::slot(1).unwrap(),
            Arc::new(QuestCatalog::builtin().unwrap()),
            LevelCurve::SingleStep,
        );
        assert_eq!(s.player(), &PlayerInfo::default());
        assert_eq!(s.locked_zones().len(), 3);
    }

    #[test]
    fn resume_picks_up_saved_progress() {
        let mut saves = SaveManager::new(MemoryStore::new());
        let key = SaveKey::slot(2).unwrap();
        let mut ava = PlayerInfo::new("Ava", "ava@example.com");
        ava.level = 3;
        ava.completed_quests.insert("EmpathyGiven".into());
        ava.completed_quests.insert("MindfulnessWin".into());
        saves.save(&key, &ava).unwrap();
        let s = GameSession::resume(&saves, &key, Arc::new(QuestCatalog::builtin().unwrap()), LevelCurve::SingleStep);
        assert_eq!(s.player(), &ava);
        assert!(!s.locked_zones().is_locked("Home"));
    }

    #[tokio::test(start_paused = true)]
    async fn session_writes_through_autosave() {
        let saves = Arc::new(Mutex::new(SaveManager::new(MemoryStore::new())));
        let key = SaveKey::slot(1).unwrap();
        let auto = AutoSave::spawn(
            Arc::clone(&saves),
            key.clone(),
            &AutoSaveConfig::default(),
            &RetryConfig::default(),
        );
        let mut s = session().with_autosave(auto);
        s.complete_quest("ExamPassed").unwrap();
        s.add_item("Lucky Pencil");
        let (player, status) = s.shutdown().await;
        assert!(matches!(status, Some(SaveStatus::Saved { .. })));
        let stored = saves.lock().unwrap().load(&key).unwrap();
        assert_eq!(stored, player);
        assert!(stored.inventory.contains(&"Lucky Pencil".to_string()));
    }
}
