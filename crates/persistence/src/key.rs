//! The single addressing scheme for saves.
//!
//! Local saves are slot-indexed; server-backed saves are scoped by account
//! email. [`SaveKey::storage_key`] is the only place storage keys are built.

use crate::error::PersistError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of independent local slots.
pub const SLOT_COUNT: u8 = 3;

/// Validated slot index in `1..=SLOT_COUNT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub fn new(index: u8) -> Result<Self, PersistError> {
        if (1..=SLOT_COUNT).contains(&index) {
            Ok(Self(index))
        } else {
            Err(PersistError::InvalidSlot(index))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// All slots in order.
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (1..=SLOT_COUNT).map(SlotIndex)
    }
}

impl TryFrom<u8> for SlotIndex {
    type Error = PersistError;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        SlotIndex::new(v)
    }
}

impl From<SlotIndex> for u8 {
    fn from(s: SlotIndex) -> u8 {
        s.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKey {
    /// Local/offline save slot.
    Slot(SlotIndex),
    /// Server-backed save for an account.
    Account(String),
}

impl SaveKey {
    pub fn slot(index: u8) -> Result<Self, PersistError> {
        Ok(SaveKey::Slot(SlotIndex::new(index)?))
    }

    pub fn account(email: &str) -> Self {
        SaveKey::Account(email.trim().to_lowercase())
    }

    /// Key under which the record is stored.
    ///
    /// `lifequest_slot{n}` for slots, `lifequest_account:{email}` for accounts.
    pub fn storage_key(&self) -> String {
        match self {
            SaveKey::Slot(s) => format!("lifequest_slot{}", s.get()),
            SaveKey::Account(email) => format!("lifequest_account:{}", email.trim().to_lowercase()),
        }
    }
}

impl fmt::Display for SaveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_range_is_enforced() {
        assert!(SlotIndex::new(0).is_err());
        assert!(SlotIndex::new(4).is_err());
        assert_eq!(SlotIndex::all().count(), 3);
    }

    #[test]
    fn storage_keys() {
        assert_eq!(SaveKey::slot(2).unwrap().storage_key(), "lifequest_slot2");
        assert_eq!(
            SaveKey::account(" Ava@Example.com ").storage_key(),
            "lifequest_account:ava@example.com"
        );
    }

    #[test]
    fn slot_deserialization_validates() {
        assert!(serde_json::from_str::<SlotIndex>("3").is_ok());
        assert!(serde_json::from_str::<SlotIndex>("9").is_err());
    }
}
