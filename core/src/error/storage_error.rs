// core/src/error/storage_error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage slot read failed: {slot}")]
    Read {
        slot: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage slot write failed: {slot}")]
    Write {
        slot: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage slot {slot} holds corrupt json")]
    Corrupt {
        slot: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialize error for slot {slot}")]
    Serialize {
        slot: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage quota exceeded for slot {slot}")]
    QuotaExceeded { slot: String },
}
