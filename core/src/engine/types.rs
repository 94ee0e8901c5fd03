use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{OptimizerConfig, StorageConfig};
use crate::events_out::Notifier;
use crate::model::ModelCatalog;
use crate::queue::{QueueStats, SkipReason};
use crate::search::{AiSearch, ForecastModel, GridSearch};
use crate::storage::DurableStorage;
use crate::types::{Method, MetricWeights, ModelId, ParamMap, QueueItem, Sku};

/// Everything the engine needs from the outside world.
pub struct EngineDeps {
    pub storage: Arc<dyn DurableStorage>,
    pub slots: StorageConfig,
    pub optimizer: OptimizerConfig,
    pub weights: MetricWeights,
    pub catalog: ModelCatalog,
    pub grid: Arc<dyn GridSearch>,
    pub ai: Arc<dyn AiSearch>,
    pub forecasters: Vec<Arc<dyn ForecastModel>>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub sku: Sku,
    /// Points kept after cleaning.
    pub points: usize,
    pub queued: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub queue: QueueStats,
    pub pending: Vec<QueueItem>,
    pub paused: bool,
    pub cache_version: u64,
    pub ai_disabled: bool,
    pub ai_consecutive_failures: u32,
    pub ai_failure_threshold: u32,
    pub skus: Vec<Sku>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub sku: Sku,
    pub model_id: ModelId,
    pub method: Method,
    pub parameters: ParamMap,
    pub points: Vec<ForecastPoint>,
}

/// Outcome of an explicit method request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A fresh record already backs the selection.
    Ready,
    Queued { id: String },
    Skipped(SkipReason),
    /// Selection stored; nothing to run until data for the SKU is loaded.
    AwaitingData,
}
