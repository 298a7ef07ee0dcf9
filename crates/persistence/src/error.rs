use lifequest_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("save {key} is corrupted: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("no save found for {0}")]
    NotFound(String),
    /// A newer write already landed for this key.
    #[error("stale write to {key}: stored version {stored}, attempted {attempted}")]
    StaleWrite {
        key: String,
        stored: u64,
        attempted: u64,
    },
    #[error("slot {0} is out of range")]
    InvalidSlot(u8),
    #[error("save version {0} is out of range")]
    VersionOutOfRange(u64),
    #[error("invalid player: {0}")]
    Invalid(#[from] ValidationError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl PersistError {
    /// Whether retrying the same write could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PersistError::Io(_) | PersistError::Db(_))
    }
}
