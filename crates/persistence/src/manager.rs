//! Slot and account saves on top of a [`KeyValueStore`].

use crate::error::PersistError;
use crate::key::{SaveKey, SlotIndex};
use crate::store::KeyValueStore;
use chrono::Utc;
use lifequest_core::{validate_player, PlayerInfo};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Stored form of a save: snapshot plus metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    pub key: String,
    /// Monotonic per key; a write must carry a larger version than the one
    /// stored.
    pub version: u64,
    /// Epoch milliseconds of the write.
    pub timestamp: i64,
    pub player_info: PlayerInfo,
}

/// Acknowledgement of a successful write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub version: u64,
    pub timestamp: i64,
}

/// Short description of a slot for load menus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub slot: SlotIndex,
    pub version: u64,
    pub timestamp: i64,
    pub name: String,
    pub level: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotStatus {
    Empty { slot: SlotIndex },
    Corrupt { slot: SlotIndex, reason: String },
    Saved(SlotSummary),
}

/// Reads and writes whole [`SaveRecord`]s; never merges.
pub struct SaveManager<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SaveManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Read the full record stored under `key`.
    pub fn load_record(&self, key: &SaveKey) -> Result<SaveRecord, PersistError> {
        let storage_key = key.storage_key();
        let text = self
            .store
            .get(&storage_key)?
            .ok_or_else(|| PersistError::NotFound(storage_key.clone()))?;
        serde_json::from_str(&text).map_err(|e| PersistError::Corrupt {
            key: storage_key,
            reason: e.to_string(),
        })
    }

    pub fn load(&self, key: &SaveKey) -> Result<PlayerInfo, PersistError> {
        Ok(self.load_record(key)?.player_info)
    }

    /// Version currently stored, treating a corrupt record as version 0.
    pub fn current_version(&self, key: &SaveKey) -> Result<u64, PersistError> {
        match self.load_record(key) {
            Ok(rec) => Ok(rec.version),
            Err(PersistError::NotFound(_)) => Ok(0),
            Err(PersistError::Corrupt { key, reason }) => {
                warn!(%key, %reason, "stored save is corrupted, treating as version 0");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Save with the next version after whatever is stored.
    pub fn save(&mut self, key: &SaveKey, player: &PlayerInfo) -> Result<SaveReceipt, PersistError> {
        let next = self.current_version(key)?.saturating_add(1);
        self.save_versioned(key, player, next)
    }

    /// Save only if `version` is newer than the stored record.
    ///
    /// Rejects with [`PersistError::StaleWrite`] otherwise, so a slow write of
    /// older state cannot clobber a newer one.
    pub fn save_versioned(
        &mut self,
        key: &SaveKey,
        player: &PlayerInfo,
        version: u64,
    ) -> Result<SaveReceipt, PersistError> {
        validate_player(player)?;
        let stored = self.current_version(key)?;
        let storage_key = key.storage_key();
        if version <= stored {
            return Err(PersistError::StaleWrite {
                key: storage_key,
                stored,
                attempted: version,
            });
        }
        let record = SaveRecord {
            key: storage_key.clone(),
            version,
            timestamp: Utc::now().timestamp_millis(),
            player_info: player.clone(),
        };
        let text = serde_json::to_string(&record)?;
        self.store.put(&storage_key, &text)?;
        info!(key = %storage_key, version, "game saved");
        Ok(SaveReceipt {
            version,
            timestamp: record.timestamp,
        })
    }

    pub fn delete(&mut self, key: &SaveKey) -> Result<bool, PersistError> {
        self.store.delete(&key.storage_key())
    }

    /// Status of every local slot, in slot order.
    pub fn list_slots(&self) -> Vec<SlotStatus> {
        SlotIndex::all()
            .map(|slot| match self.load_record(&SaveKey::Slot(slot)) {
                Ok(rec) => SlotStatus::Saved(SlotSummary {
                    slot,
                    version: rec.version,
                    timestamp: rec.timestamp,
                    name: rec.player_info.name,
                    level: rec.player_info.level,
                }),
                Err(PersistError::NotFound(_)) => SlotStatus::Empty { slot },
                Err(e) => SlotStatus::Corrupt {
                    slot,
                    reason: e.to_string(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn ava() -> PlayerInfo {
        let mut p = PlayerInfo::new("Ava", "ava@example.com");
        p.level = 3;
        p
    }

    #[test]
    fn slot_two_round_trip() {
        let mut m = SaveManager::new(MemoryStore::new());
        let key = SaveKey::slot(2).unwrap();
        m.save(&key, &ava()).unwrap();
        assert_eq!(m.load(&key).unwrap(), ava());
        assert!(matches!(
            m.load(&SaveKey::slot(1).unwrap()),
            Err(PersistError::NotFound(_))
        ));
    }

    #[test]
    fn versions_increase_and_stale_writes_fail() {
        let mut m = SaveManager::new(MemoryStore::new());
        let key = SaveKey::slot(1).unwrap();
        assert_eq!(m.save(&key, &ava()).unwrap().version, 1);
        assert_eq!(m.save(&key, &ava()).unwrap().version, 2);
        assert_eq!(m.save_versioned(&key, &ava(), 10).unwrap().version, 10);

        let mut older = ava();
        older.level = 1;
        let err = m.save_versioned(&key, &older, 7).unwrap_err();
        assert!(matches!(err, PersistError::StaleWrite { stored: 10, attempted: 7, .. }));
        assert_eq!(m.load(&key).unwrap().level, 3);
    }

    #[test]
    fn corrupted_json_is_reported_and_overwritable() {
        let mut store = MemoryStore::new();
        store.put("lifequest_slot3", "{not json").unwrap();
        let mut m = SaveManager::new(store);
        let key = SaveKey::slot(3).unwrap();
        assert!(matches!(m.load(&key), Err(PersistError::Corrupt { .. })));
        assert!(matches!(m.list_slots()[2], SlotStatus::Corrupt { .. }));
        assert_eq!(m.save(&key, &ava()).unwrap().version, 1);
        assert_eq!(m.load(&key).unwrap(), ava());
    }

    #[test]
    fn invalid_players_are_not_written() {
        let mut m = SaveManager::new(MemoryStore::new());
        let bad = PlayerInfo::new("", "ava@example.com");
        assert!(matches!(
            m.save(&SaveKey::slot(1).unwrap(), &bad),
            Err(PersistError::Invalid(_))
        ));
        assert!(m.store().keys().unwrap().is_empty());
    }

    #[test]
    fn slots_listing() {
        let mut m = SaveManager::new(MemoryStore::new());
        m.save(&SaveKey::slot(2).unwrap(), &ava()).unwrap();
        let slots = m.list_slots();
        assert_eq!(slots.len(), 3);
        assert!(matches!(slots[0], SlotStatus::Empty { .. }));
        match &slots[1] {
            SlotStatus::Saved(s) => {
                assert_eq!(s.name, "Ava");
                assert_eq!(s.level, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(m.delete(&SaveKey::slot(2).unwrap()).unwrap());
        assert!(matches!(m.list_slots()[1], SlotStatus::Empty { .. }));
    }

    #[test]
    fn account_saves_are_case_insensitive() {
        let mut m = SaveManager::new(MemoryStore::new());
        m.save(&SaveKey::account("Ava@Example.com"), &ava()).unwrap();
        assert_eq!(m.load(&SaveKey::account("ava@example.com")).unwrap(), ava());
    }

    proptest! {
        #[test]
        fn load_after_save_is_identity(xp in 0u64..1_000_000,
                                       level in 1u32..100,
                                       flags in proptest::collection::btree_set("[A-Za-z]{1,12}", 0..8),
                                       items in proptest::collection::vec("[A-Za-z ]{1,10}", 0..6)) {
            let mut p = PlayerInfo::new("Ava", "ava@example.com");
            p.xp = xp;
            p.level = level;
            p.completed_quests = flags.into_iter().collect::<BTreeSet<_>>();
            p.inventory = items.into_iter().filter(|i| !i.trim().is_empty()).collect();
            let mut m = SaveManager::new(MemoryStore::new());
            let key = SaveKey::slot(1).unwrap();
            m.save(&key, &p).unwrap();
            prop_assert_eq!(m.load(&key).unwrap(), p);
        }
    }
}
