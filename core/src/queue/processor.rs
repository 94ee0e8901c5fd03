use std::sync::Arc;

use serde::Serialize;

use super::breaker::{AiCircuitBreaker, BreakerTransition};
use super::job_queue::{QueueControl, SharedQueue, SkipReason};
use crate::cache::SharedCache;
use crate::config::BusinessContext;
use crate::data::SharedData;
use crate::error::{EngineError, SearchError};
use crate::events_out::{Notification, Notifier};
use crate::fingerprint::{data_hash, series_digest};
use crate::model::{check_parameters, ModelCatalog};
use crate::search::{AiSearch, GridSearch, SearchOutput, SearchRequest};
use crate::types::{JobStatus, Method, MetricWeights, ModelId, QueueItem, SelectionSource, Sku};

pub struct ProcessorDeps {
    pub cache: SharedCache,
    pub queue: SharedQueue,
    pub data: SharedData,
    pub catalog: Arc<ModelCatalog>,
    pub grid: Arc<dyn GridSearch>,
    pub ai: Arc<dyn AiSearch>,
    pub breaker: Arc<AiCircuitBreaker>,
    pub control: Arc<QueueControl>,
    pub notifier: Arc<dyn Notifier>,
    pub weights: MetricWeights,
    pub business_context: BusinessContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub item: QueueItem,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Method>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    pub results: Vec<JobResult>,
    pub paused: bool,
    pub ai_disabled: bool,
}

impl DrainReport {
    fn count(&self, status: JobStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn completed(&self) -> usize {
        self.count(JobStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobStatus::Skipped)
    }
}

/// What one job did before it is removed from the queue.
struct Outcome {
    status: JobStatus,
    error: Option<String>,
    skip_reason: Option<SkipReason>,
    fallback: Option<Method>,
    wrote_cache: bool,
    notification: Option<Notification>,
}

impl Outcome {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            status: JobStatus::Skipped,
            error: None,
            skip_reason: Some(reason),
            fallback: None,
            wrote_cache: false,
            notification: None,
        }
    }

    fn failed(item: &QueueItem, err: &EngineError) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(err.to_string()),
            skip_reason: None,
            fallback: None,
            wrote_cache: false,
            notification: Some(Notification::JobFailed {
                sku: item.sku.clone(),
                model_id: item.model_id.clone(),
                method: item.method,
                error: err.to_string(),
                fallback: None,
            }),
        }
    }

    fn completed(item: &QueueItem, confidence: Option<f64>) -> Self {
        Self {
            status: JobStatus::Completed,
            error: None,
            skip_reason: None,
            fallback: None,
            wrote_cache: true,
            notification: Some(Notification::JobCompleted {
                sku: item.sku.clone(),
                model_id: item.model_id.clone(),
                method: item.method,
                confidence,
            }),
        }
    }
}

/// Sequential consumer of the job queue.
///
/// Exactly one job runs at a time and every job runs to a terminal state
/// before the next is dequeued, so no two jobs write the same cache slot
/// concurrently.
pub struct QueueProcessor {
    deps: ProcessorDeps,
}

impl QueueProcessor {
    pub fn new(deps: ProcessorDeps) -> Self {
        Self { deps }
    }

    /// Runs jobs until the queue is empty or the pause flag is seen.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            if self.deps.control.is_paused() {
                report.paused = true;
                break;
            }
            let Some(result) = self.process_next().await else {
                break;
            };
            report.results.push(result);
        }
        report.ai_disabled = self.deps.breaker.is_disabled();

        if !report.results.is_empty() {
            let summary = Notification::QueueDrained {
                completed: report.completed(),
                failed: report.failed(),
                skipped: report.skipped(),
                paused: report.paused,
            };
            self.deps.notifier.notify(&summary).await;
        }
        report
    }

    /// Runs the head job, ignoring the pause flag. `None` when the queue is empty.
    pub async fn process_next(&self) -> Option<JobResult> {
        let item = self.deps.queue.lock().await.begin_next()?;
        tracing::debug!(
            target: "tuner.queue",
            id = %item.id,
            sku = %item.sku,
            model = %item.model_id,
            method = %item.method,
            "job running"
        );

        let outcome = self.execute(&item).await;

        self.deps.queue.lock().await.finish(&item.id, outcome.status);
        if !outcome.wrote_cache {
            // Every terminal state is followed by exactly one version bump.
            self.deps.cache.write().await.touch();
        }

        tracing::info!(
            target: "tuner.queue",
            id = %item.id,
            sku = %item.sku,
            model = %item.model_id,
            method = %item.method,
            status = ?outcome.status,
            error = outcome.error.as_deref().unwrap_or(""),
            "job finished"
        );
        if let Some(n) = &outcome.notification {
            self.deps.notifier.notify(n).await;
        }

        Some(JobResult {
            item,
            status: outcome.status,
            error: outcome.error,
            skip_reason: outcome.skip_reason,
            fallback: outcome.fallback,
        })
    }

    async fn execute(&self, item: &QueueItem) -> Outcome {
        let Some(model) = self.deps.catalog.get(&item.model_id).cloned() else {
            return Outcome::failed(
                item,
                &EngineError::UnknownModel {
                    model: item.model_id.clone(),
                },
            );
        };

        let series = {
            let data = self.deps.data.read().await;
            data.series(&item.sku).map(<[_]>::to_vec)
        };
        let Some(series) = series.filter(|s| !s.is_empty()) else {
            return Outcome::failed(item, &EngineError::DataUnavailable(item.sku.clone()));
        };

        match item.method {
            Method::Manual => return Outcome::skipped(SkipReason::NotSearchable),
            Method::Ai if self.deps.breaker.is_disabled() => {
                return Outcome::skipped(SkipReason::AiDisabled)
            }
            _ => {}
        }

        let hash = data_hash(&item.sku, &item.model_id, &self.deps.weights, &series_digest(&series));
        if self
            .deps
            .cache
            .read()
            .await
            .is_valid(&item.sku, &item.model_id, item.method, &hash)
        {
            return Outcome::skipped(SkipReason::AlreadyValid);
        }

        let req = SearchRequest {
            sku: &item.sku,
            model: &model,
            series: &series,
            weights: &self.deps.weights,
        };

        match item.method {
            Method::Grid => match self.deps.grid.run(req) {
                Ok(out) => {
                    let confidence = out.confidence;
                    self.store_grid(&item.sku, &item.model_id, &hash, out).await;
                    Outcome::completed(item, confidence)
                }
                Err(source) => Outcome::failed(
                    item,
                    &EngineError::Search {
                        sku: item.sku.clone(),
                        model: item.model_id.clone(),
                        source,
                    },
                ),
            },
            Method::Ai => self.run_ai(item, req, &hash).await,
            Method::Manual => Outcome::skipped(SkipReason::NotSearchable),
        }
    }

    async fn run_ai(&self, item: &QueueItem, req: SearchRequest<'_>, hash: &str) -> Outcome {
        let result = self
            .deps
            .ai
            .run(req, &self.deps.business_context)
            .await
            .and_then(|out| match out {
                // Models without tunable parameters accept an empty set.
                Some(out) if !out.parameters.is_empty() || req.model.parameters.is_empty() => {
                    check_parameters(&out.parameters).map_err(SearchError::Malformed)?;
                    Ok(out)
                }
                _ => Err(SearchError::EmptyResult),
            });

        let err = match result {
            Ok(out) => {
                self.deps.breaker.record_success();
                let confidence = out.confidence;
                self.store_ai(&item.sku, &item.model_id, hash, out).await;
                return Outcome::completed(item, confidence);
            }
            Err(e) => e,
        };

        tracing::warn!(
            target: "tuner.ai",
            sku = %item.sku,
            model = %item.model_id,
            error = %err,
            retryable = err.is_retryable(),
            "ai search failed"
        );
        let transition = self.deps.breaker.record_failure();
        let (fallback, wrote_cache) = self.fall_back_to_grid(item, req, hash).await;

        let engine_err = EngineError::Search {
            sku: item.sku.clone(),
            model: item.model_id.clone(),
            source: err,
        };
        let notification = if transition == BreakerTransition::Tripped {
            let purged = self.deps.queue.lock().await.purge_method(Method::Ai);
            tracing::warn!(target: "tuner.ai", purged, "purged pending ai jobs");
            Some(Notification::AiDisabled {
                threshold: self.deps.breaker.threshold(),
                purged_jobs: purged,
            })
        } else {
            Some(Notification::JobFailed {
                sku: item.sku.clone(),
                model_id: item.model_id.clone(),
                method: Method::Ai,
                error: engine_err.to_string(),
                fallback,
            })
        };

        Outcome {
            status: JobStatus::Failed,
            error: Some(engine_err.to_string()),
            skip_reason: None,
            fallback,
            wrote_cache,
            notification,
        }
    }

    /// Uses a valid grid record if one exists, otherwise runs the grid search
    /// in place of the failed AI job.
    async fn fall_back_to_grid(
        &self,
        item: &QueueItem,
        req: SearchRequest<'_>,
        hash: &str,
    ) -> (Option<Method>, bool) {
        {
            let mut cache = self.deps.cache.write().await;
            if cache.is_valid(&item.sku, &item.model_id, Method::Grid, hash) {
                let retarget = cache
                    .entry(&item.sku, &item.model_id)
                    .is_some_and(|e| !e.is_user_selected() && e.selected != Some(Method::Grid));
                if retarget {
                    cache.update_entry(&item.sku, &item.model_id, |e| {
                        e.selected = Some(Method::Grid);
                        e.selected_by = Some(SelectionSource::Optimizer);
                    });
                }
                return (Some(Method::Grid), retarget);
            }
        }

        match self.deps.grid.run(req) {
            Ok(out) => {
                self.store_grid(&item.sku, &item.model_id, hash, out).await;
                (Some(Method::Grid), true)
            }
            Err(e) => {
                tracing::warn!(
                    target: "tuner.queue",
                    sku = %item.sku,
                    model = %item.model_id,
                    error = %e,
                    "grid fallback after ai failure also failed"
                );
                (None, false)
            }
        }
    }

    /// Writes a grid result, mirrors it into the manual slot and points the
    /// optimizer selection at the best fresh method. One cache mutation.
    async fn store_grid(&self, sku: &Sku, model_id: &ModelId, hash: &str, out: SearchOutput) {
        let record = out.into_record(hash);
        let mut cache = self.deps.cache.write().await;
        let ai_fresh =
            !self.deps.breaker.is_disabled() && cache.is_valid(sku, model_id, Method::Ai, hash);
        cache.update_entry(sku, model_id, |entry| {
            entry.manual = Some(record.clone());
            entry.grid = Some(record);
            if !entry.is_user_selected() {
                entry.selected = Some(if ai_fresh { Method::Ai } else { Method::Grid });
                entry.selected_by = Some(SelectionSource::Optimizer);
            }
        });
    }

    async fn store_ai(&self, sku: &Sku, model_id: &ModelId, hash: &str, out: SearchOutput) {
        let record = out.into_record(hash);
        let mut cache = self.deps.cache.write().await;
        cache.update_entry(sku, model_id, |entry| {
            entry.ai = Some(record);
            if !entry.is_user_selected() {
                entry.selected = Some(Method::Ai);
                entry.selected_by = Some(SelectionSource::Optimizer);
            }
        });
    }
}
