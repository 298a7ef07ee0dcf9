//! Game-side runtime: the session that owns player state, its configuration,
//! and the background autosave that persists it.
#![deny(warnings)]

pub mod autosave;
pub mod config;
pub mod retry;
pub mod session;

pub use autosave::{AutoSave, SaveStatus, SharedSaves, Snapshot};
pub use config::{AutoSaveConfig, GameConfig, ProgressionConfig, RetryConfig, CONFIG_FILE};
pub use retry::RetryPolicy;
pub use session::{load_player, GameSession, SessionError};
