// core/src/error/engine_error.rs
use thiserror::Error;

use crate::types::{ModelId, Sku};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no cleaned data for sku {0}")]
    DataUnavailable(Sku),

    #[error("model {model} is not in the catalog")]
    UnknownModel { model: ModelId },

    #[error("search failed for {sku}/{model}")]
    Search {
        sku: Sku,
        model: ModelId,
        #[source]
        source: crate::error::SearchError,
    },

    #[error("invalid parameters for {model}: {reason}")]
    InvalidParameters { model: ModelId, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] crate::error::StorageError),
}
