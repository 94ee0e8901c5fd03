//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `tuner_core::api` instead of reaching into internal modules.

pub use crate::cache::{CacheStore, SharedCache};
pub use crate::config::{
    AiConfig, AppConfig, BusinessContext, EventsOutConfig, GridConfig, LoggingConfig,
    OptimizerConfig, StorageConfig,
};
pub use crate::config::{load_default, load_from_path, CONFIG_FILE};
pub use crate::data::SalesData;
pub use crate::engine::{
    EngineDeps, EngineStatus, ForecastPoint, ForecastResult, LoadSummary, OptimizationEngine,
    RequestOutcome,
};
pub use crate::error::{CliError, ConfigError, EngineError, SearchError, StorageError};
pub use crate::events_out::{
    start_events_out, EventsOutTx, FanoutNotifier, Notification, Notifier, TracingNotifier,
};
pub use crate::fingerprint::{data_hash, job_fingerprint, series_digest};
pub use crate::model::{
    check_parameter, check_parameters, default_catalog, ModelCatalog, ModelConfig, MAX_PERIOD,
};
pub use crate::queue::{DrainReport, EnqueueOutcome, JobResult, QueueStats, SkipReason};
pub use crate::resolver::Resolution;
pub use crate::search::{AiSearch, ForecastModel, GridSearch, SearchOutput, SearchRequest};
pub use crate::storage::{DurableStorage, MemoryStorage};
pub use crate::sync::{ModelStateSynchronizer, ProjectedModel, Projection};
pub use crate::types::{
    JobReason, JobStatus, Method, MetricWeights, ModelId, OptimizationRecord, ParamMap,
    QueueItem, SeriesPoint, Sku,
};
