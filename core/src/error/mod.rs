mod cli_error;
mod config_error;
mod engine_error;
mod search_error;
mod storage_error;

pub use cli_error::CliError;
pub use config_error::ConfigError;
pub use engine_error::EngineError;
pub use search_error::SearchError;
pub use storage_error::StorageError;
