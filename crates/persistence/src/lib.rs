#![deny(warnings)]

//! Persistence layer: save keys, key-value stores, slot saves and the
//! SQLite schema used by the backend.

pub mod db;
mod error;
mod key;
mod manager;
mod store;

pub use db::init_db;
pub use error::PersistError;
pub use key::{SaveKey, SlotIndex, SLOT_COUNT};
pub use manager::{SaveManager, SaveReceipt, SaveRecord, SlotStatus, SlotSummary};
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Returns the default SQLite URL used by the backend.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/lifequest.db"
}
