use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::watch;

use super::types::{
    EngineDeps, EngineStatus, ForecastPoint, ForecastResult, LoadSummary, RequestOutcome,
};
use crate::cache::{CacheStore, SharedCache};
use crate::config::OptimizerConfig;
use crate::data::{SalesData, SharedData};
use crate::error::EngineError;
use crate::fingerprint::{data_hash, job_fingerprint};
use crate::model::{check_parameters, ModelCatalog, ModelConfig};
use crate::queue::{
    AiCircuitBreaker, DrainReport, EnqueueOutcome, JobQueue, JobResult, ProcessorDeps,
    QueueControl, QueueProcessor, SharedQueue, SkipReason,
};
use crate::resolver::{resolve, Resolution};
use crate::search::ForecastModel;
use crate::storage::{load_or_default, store_json_logged, DurableStorage};
use crate::sync::{project, ModelStateSynchronizer, Projection};
use crate::types::{
    JobReason, Method, MetricWeights, ModelId, OptimizationRecord, ParamMap, QueueItem,
    SelectionSource, SeriesPoint, Sku,
};

/// Owns the cache, the queue, the breaker and the sales data, and is the only
/// entry point callers use to change any of them.
pub struct OptimizationEngine {
    cache: SharedCache,
    queue: SharedQueue,
    data: SharedData,
    catalog: Arc<ModelCatalog>,
    breaker: Arc<AiCircuitBreaker>,
    control: Arc<QueueControl>,
    processor: QueueProcessor,
    forecasters: Vec<Arc<dyn ForecastModel>>,
    storage: Arc<dyn DurableStorage>,
    data_slot: String,
    weights: MetricWeights,
    optimizer: OptimizerConfig,
}

impl OptimizationEngine {
    pub fn open(deps: EngineDeps) -> Self {
        let EngineDeps {
            storage,
            slots,
            optimizer,
            weights,
            catalog,
            grid,
            ai,
            forecasters,
            notifier,
        } = deps;

        let cache =
            CacheStore::open(storage.clone(), slots.cache_slot.clone(), optimizer.cache_ttl())
                .into_shared();
        let queue = JobQueue::open(storage.clone(), slots.queue_slot.clone()).into_shared();
        let data: SalesData = load_or_default(storage.as_ref(), &slots.data_slot);
        let data = data.into_shared();
        let breaker = Arc::new(AiCircuitBreaker::open(
            storage.clone(),
            slots.breaker_slot.clone(),
            optimizer.ai_failure_threshold,
            optimizer.ai_enabled,
        ));
        let catalog = Arc::new(catalog);
        let control = Arc::new(QueueControl::new());

        let processor = QueueProcessor::new(ProcessorDeps {
            cache: cache.clone(),
            queue: queue.clone(),
            data: data.clone(),
            catalog: catalog.clone(),
            grid,
            ai,
            breaker: breaker.clone(),
            control: control.clone(),
            notifier,
            weights: weights.clone(),
            business_context: optimizer.business_context.clone(),
        });

        tracing::info!(
            target: "tuner.engine",
            backend = storage.name(),
            models = catalog.models().len(),
            ai_disabled = breaker.is_disabled(),
            "optimization engine opened"
        );

        Self {
            cache,
            queue,
            data,
            catalog,
            breaker,
            control,
            processor,
            forecasters,
            storage,
            data_slot: slots.data_slot,
            weights,
            optimizer,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    pub fn queue(&self) -> SharedQueue {
        self.queue.clone()
    }

    pub fn control(&self) -> Arc<QueueControl> {
        self.control.clone()
    }

    pub fn ai_available(&self) -> bool {
        !self.breaker.is_disabled()
    }

    pub async fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.cache.read().await.subscribe()
    }

    /// A synchronizer wired to this engine's shared state.
    pub fn synchronizer(&self) -> ModelStateSynchronizer {
        ModelStateSynchronizer::new(
            self.cache.clone(),
            self.data.clone(),
            self.catalog.clone(),
            self.breaker.clone(),
            self.weights.clone(),
        )
    }

    fn model(&self, model_id: &ModelId) -> Result<&ModelConfig, EngineError> {
        self.catalog
            .get(model_id)
            .ok_or_else(|| EngineError::UnknownModel {
                model: model_id.clone(),
            })
    }

    /// Current `data_hash` for the pair, `None` when the SKU has no data.
    pub async fn current_hash(&self, sku: &Sku, model_id: &ModelId) -> Option<String> {
        let digest = self.data.read().await.digest(sku)?;
        Some(data_hash(sku, model_id, &self.weights, &digest))
    }

    /// Replaces a SKU's series, drops every cached result for it and queues
    /// re-optimization for all enabled models.
    pub async fn load_series(
        &self,
        sku: &Sku,
        points: Vec<SeriesPoint>,
    ) -> Result<LoadSummary, EngineError> {
        let kept = {
            let mut data = self.data.write().await;
            let kept = data.replace(sku, points);
            store_json_logged(self.storage.as_ref(), &self.data_slot, &*data);
            kept
        };
        // Data first, then the version bump, so a resync sees the new digest.
        self.cache.write().await.clear_for_sku(sku);

        let mut summary = LoadSummary {
            sku: sku.clone(),
            points: kept,
            queued: 0,
            skipped: 0,
        };
        if kept == 0 {
            tracing::warn!(target: "tuner.engine", sku = %sku, "series empty after cleaning");
            return Ok(summary);
        }

        let mut methods = vec![Method::Grid];
        if self.optimizer.enqueue_ai_on_data_change && self.ai_available() {
            methods.push(Method::Ai);
        }
        let models: Vec<ModelId> = self.catalog.enabled().map(|m| m.id.clone()).collect();
        for model_id in &models {
            for &method in &methods {
                match self.enqueue(sku, model_id, method, JobReason::DataChanged).await? {
                    EnqueueOutcome::Queued { .. } => summary.queued += 1,
                    EnqueueOutcome::Skipped(_) => summary.skipped += 1,
                }
            }
        }
        tracing::info!(
            target: "tuner.engine",
            sku = %sku,
            points = kept,
            queued = summary.queued,
            skipped = summary.skipped,
            "series loaded"
        );
        Ok(summary)
    }

    /// Drops a SKU's data and cached results.
    pub async fn remove_sku(&self, sku: &Sku) -> bool {
        let removed = {
            let mut data = self.data.write().await;
            let removed = data.remove(sku);
            if removed {
                store_json_logged(self.storage.as_ref(), &self.data_slot, &*data);
            }
            removed
        };
        if removed {
            self.cache.write().await.clear_for_sku(sku);
        }
        removed
    }

    pub async fn enqueue(
        &self,
        sku: &Sku,
        model_id: &ModelId,
        method: Method,
        reason: JobReason,
    ) -> Result<EnqueueOutcome, EngineError> {
        let model = self.model(model_id)?;
        let digest = self
            .data
            .read()
            .await
            .digest(sku)
            .ok_or_else(|| EngineError::DataUnavailable(sku.clone()))?;

        let skip = match method {
            Method::Manual => Some(SkipReason::NotSearchable),
            Method::Ai if !self.ai_available() => Some(SkipReason::AiDisabled),
            _ => {
                let hash = data_hash(sku, model_id, &self.weights, &digest);
                self.cache
                    .read()
                    .await
                    .is_valid(sku, model_id, method, &hash)
                    .then_some(SkipReason::AlreadyValid)
            }
        };
        if let Some(reason) = skip {
            tracing::debug!(
                target: "tuner.queue",
                sku = %sku,
                model = %model_id,
                method = %method,
                reason = %reason,
                "job skipped at enqueue"
            );
            return Ok(self.queue.lock().await.skip(reason));
        }

        let item = QueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            sku: sku.clone(),
            model_id: model_id.clone(),
            method,
            reason,
            fingerprint: job_fingerprint(
                sku,
                model_id,
                method,
                &model.parameters,
                &self.weights,
                &digest,
            ),
            timestamp: Utc::now(),
        };
        Ok(self.queue.lock().await.push(item))
    }

    /// Records an explicit user choice and, for an automatic method without a
    /// fresh record, queues the search that will back it.
    pub async fn request_method(
        &self,
        sku: &Sku,
        model_id: &ModelId,
        method: Method,
    ) -> Result<RequestOutcome, EngineError> {
        self.model(model_id)?;
        self.cache
            .write()
            .await
            .set_selected_method(sku, model_id, method);

        let Some(hash) = self.current_hash(sku, model_id).await else {
            return Ok(RequestOutcome::AwaitingData);
        };
        let valid = self.cache.read().await.is_valid(sku, model_id, method, &hash);
        if valid || !method.is_automatic() {
            return Ok(RequestOutcome::Ready);
        }
        Ok(
            match self
                .enqueue(sku, model_id, method, JobReason::UserRequest)
                .await?
            {
                EnqueueOutcome::Queued { id } => RequestOutcome::Queued { id },
                EnqueueOutcome::Skipped(reason) => RequestOutcome::Skipped(reason),
            },
        )
    }

    /// Returns the pair to the automatic AI > Grid > Manual order.
    pub async fn clear_selection(&self, sku: &Sku, model_id: &ModelId) -> Result<(), EngineError> {
        self.model(model_id)?;
        self.cache
            .write()
            .await
            .clear_selected_method(sku, model_id);
        Ok(())
    }

    /// Stores hand-tuned parameters as the pair's manual record and selects it.
    pub async fn save_manual_parameters(
        &self,
        sku: &Sku,
        model_id: &ModelId,
        parameters: ParamMap,
    ) -> Result<(), EngineError> {
        self.model(model_id)?;
        check_parameters(&parameters).map_err(|reason| EngineError::InvalidParameters {
            model: model_id.clone(),
            reason,
        })?;
        let hash = self
            .current_hash(sku, model_id)
            .await
            .ok_or_else(|| EngineError::DataUnavailable(sku.clone()))?;
        let record = OptimizationRecord::new(parameters, hash);
        self.cache.write().await.update_entry(sku, model_id, |entry| {
            entry.manual = Some(record);
            entry.selected = Some(Method::Manual);
            entry.selected_by = Some(SelectionSource::User);
        });
        Ok(())
    }

    pub async fn process_queue(&self) -> DrainReport {
        self.processor.drain().await
    }

    /// Runs a single job regardless of the pause flag.
    pub async fn process_next(&self) -> Option<JobResult> {
        self.processor.process_next().await
    }

    pub fn pause(&self) {
        self.control.pause();
        tracing::info!(target: "tuner.queue", "queue paused");
    }

    pub fn resume(&self) {
        self.control.resume();
        tracing::info!(target: "tuner.queue", "queue resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    /// Drops every job that has not started. Cached results stay.
    pub async fn clear_queue(&self) -> usize {
        let dropped = self.queue.lock().await.clear();
        tracing::info!(target: "tuner.queue", dropped, "queue cleared");
        dropped
    }

    pub async fn reenable_ai(&self) {
        self.breaker.reenable();
        // Resolution depends on the AI flag; make subscribers recompute.
        self.cache.write().await.touch();
    }

    pub async fn resolve(&self, sku: &Sku, model_id: &ModelId) -> Result<Resolution, EngineError> {
        self.model(model_id)?;
        let hash = self.current_hash(sku, model_id).await.unwrap_or_default();
        let cache = self.cache.read().await;
        Ok(resolve(
            &cache,
            sku,
            model_id,
            &hash,
            self.breaker.is_disabled(),
        ))
    }

    pub async fn project(&self, sku: &Sku) -> Projection {
        let digest = self.data.read().await.digest(sku).unwrap_or_default();
        let cache = self.cache.read().await;
        project(
            &cache,
            &self.catalog,
            sku,
            &digest,
            &self.weights,
            self.breaker.is_disabled(),
        )
    }

    /// Runs the model's forecasting function with the projected parameters.
    pub async fn forecast(
        &self,
        sku: &Sku,
        model_id: &ModelId,
        horizon: usize,
    ) -> Result<ForecastResult, EngineError> {
        self.model(model_id)?;
        let forecaster = self
            .forecasters
            .iter()
            .find(|f| f.id() == model_id.as_str())
            .ok_or_else(|| EngineError::UnknownModel {
                model: model_id.clone(),
            })?;
        let series = self
            .data
            .read()
            .await
            .series(sku)
            .map(<[_]>::to_vec)
            .ok_or_else(|| EngineError::DataUnavailable(sku.clone()))?;

        let projection = self.project(sku).await;
        let projected = projection
            .model(model_id)
            .ok_or_else(|| EngineError::UnknownModel {
                model: model_id.clone(),
            })?;
        let parameters = projected.config.effective_parameters().clone();

        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        let forecast = forecaster.compute(&values, &parameters, horizon);

        let step = match series.as_slice() {
            [.., prev, last] if last.date > prev.date => last.date - prev.date,
            _ => Duration::weeks(1),
        };
        let mut date = series.last().map(|p| p.date).unwrap_or_default();
        let points = forecast
            .into_iter()
            .map(|value| {
                date += step;
                ForecastPoint { date, value }
            })
            .collect();

        Ok(ForecastResult {
            sku: sku.clone(),
            model_id: model_id.clone(),
            method: projected.resolution.method,
            parameters,
            points,
        })
    }

    pub async fn status(&self) -> EngineStatus {
        let (queue, pending) = {
            let q = self.queue.lock().await;
            (q.stats(), q.items().cloned().collect())
        };
        let cache_version = self.cache.read().await.version();
        let skus = self.data.read().await.skus().cloned().collect();
        EngineStatus {
            queue,
            pending,
            paused: self.control.is_paused(),
            cache_version,
            ai_disabled: self.breaker.is_disabled(),
            ai_consecutive_failures: self.breaker.consecutive_failures(),
            ai_failure_threshold: self.breaker.threshold(),
            skus,
        }
    }
}
