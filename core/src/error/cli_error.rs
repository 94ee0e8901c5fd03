// core/src/error/cli_error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] crate::error::ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] crate::error::EngineError),

    #[error("events_out error: {0}")]
    EventsOut(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("plugin error: {0}")]
    Plugin(#[source] anyhow::Error),
}
