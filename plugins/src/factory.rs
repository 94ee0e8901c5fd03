use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use tuner_core::api::{
    default_catalog, AiSearch, AppConfig, DurableStorage, EngineDeps, EventsOutTx,
    FanoutNotifier, ForecastModel, GridSearch, MemoryStorage, Notifier, OptimizationEngine,
    TracingNotifier,
};

use crate::ai::ChatCompletionsAiSearch;
use crate::forecast::builtin_models;
use crate::grid::ExhaustiveGridSearch;
use crate::storage::FileStorage;

/// `data_dir = ":memory:"` keeps everything in process.
pub const IN_MEMORY: &str = ":memory:";

pub fn data_dir(cfg: &AppConfig) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&cfg.storage.data_dir).into_owned())
}

pub fn build_storage(cfg: &AppConfig) -> Arc<dyn DurableStorage> {
    if cfg.storage.data_dir == IN_MEMORY {
        return Arc::new(MemoryStorage::new());
    }
    Arc::new(FileStorage::new(data_dir(cfg)))
}

pub fn build_forecasters() -> Vec<Arc<dyn ForecastModel>> {
    builtin_models()
}

pub fn build_grid(cfg: &AppConfig, models: Vec<Arc<dyn ForecastModel>>) -> Arc<dyn GridSearch> {
    Arc::new(ExhaustiveGridSearch::new(models, &cfg.grid))
}

pub fn build_ai(cfg: &AppConfig) -> Result<Arc<dyn AiSearch>> {
    Ok(Arc::new(ChatCompletionsAiSearch::new(&cfg.ai)?))
}

pub fn build_notifier(events_out: Option<EventsOutTx>) -> Arc<dyn Notifier> {
    let mut fanout = FanoutNotifier::new().with(Arc::new(TracingNotifier));
    if let Some(tx) = events_out {
        fanout = fanout.with(Arc::new(tx));
    }
    Arc::new(fanout)
}

pub fn build_engine(cfg: &AppConfig, events_out: Option<EventsOutTx>) -> Result<OptimizationEngine> {
    let mut optimizer = cfg.optimizer.clone();
    if optimizer.ai_enabled && cfg.ai.api_key.is_empty() {
        tracing::warn!(
            target: "tuner.ai",
            "no ai api key configured, ai optimization starts disabled"
        );
        optimizer.ai_enabled = false;
    }

    let forecasters = build_forecasters();
    Ok(OptimizationEngine::open(EngineDeps {
        storage: build_storage(cfg),
        slots: cfg.storage.clone(),
        optimizer,
        weights: cfg.weights.clone(),
        catalog: default_catalog(),
        grid: build_grid(cfg, forecasters.clone()),
        ai: build_ai(cfg)?,
        forecasters,
        notifier: build_notifier(events_out),
    }))
}
