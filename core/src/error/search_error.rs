// core/src/error/search_error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no series data for this sku")]
    EmptySeries,

    #[error("series too short: need {needed} points, have {have}")]
    SeriesTooShort { needed: usize, have: usize },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("search produced no parameters")]
    EmptyResult,

    #[error("ai search disabled")]
    Disabled,

    #[error("request timeout")]
    Timeout,

    #[error("unauthorized (check api key)")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("unexpected status: {status}")]
    HttpStatus { status: u16, body_snippet: String },

    #[error("transport error")]
    Transport(#[source] anyhow::Error),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SearchError {
    /// Retrying by re-enqueue can help; the job itself is never retried in place.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::Timeout | SearchError::RateLimited | SearchError::Transport(_)
        )
    }
}
