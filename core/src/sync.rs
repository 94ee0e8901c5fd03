//! Projection of the cache onto the forecasting-model configuration.
//!
//! The projection holds no state of its own: [`project_at`] is a pure
//! function of the cache contents, the SKU's series digest and the AI flag.
//! [`ModelStateSynchronizer`] only decides *when* to recompute it, which is
//! whenever the cache version moves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::cache::{CacheStore, SharedCache};
use crate::data::SharedData;
use crate::fingerprint::data_hash;
use crate::model::{ModelCatalog, ModelConfig};
use crate::queue::AiCircuitBreaker;
use crate::resolver::{resolve_at, Resolution};
use crate::types::{Method, MetricWeights, ModelId, ParamMap, Sku};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedModel {
    pub config: ModelConfig,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub sku: Sku,
    /// Cache version the projection was computed from.
    pub version: u64,
    pub models: Vec<ProjectedModel>,
}

impl Projection {
    pub fn model(&self, id: &ModelId) -> Option<&ProjectedModel> {
        self.models.iter().find(|m| &m.config.id == id)
    }
}

/// Record parameters layered over `base`, so keys the search did not
/// touch keep their base value.
fn merged(base: &ParamMap, optimized: &ParamMap) -> ParamMap {
    let mut out = base.clone();
    out.extend(optimized.iter().map(|(k, v)| (k.clone(), *v)));
    out
}

fn project_model(
    cache: &CacheStore,
    base: &ModelConfig,
    sku: &Sku,
    series_digest: &str,
    weights: &MetricWeights,
    ai_disabled: bool,
    now: DateTime<Utc>,
) -> ProjectedModel {
    let mut config = base.clone();
    config.clear_overlay();

    let hash = data_hash(sku, &config.id, weights, series_digest);
    let resolution = resolve_at(cache, sku, &config.id, &hash, ai_disabled, now);
    let record = cache
        .get(sku, &config.id, resolution.method)
        .filter(|_| resolution.record_valid);

    match (resolution.method, record) {
        (Method::Manual, Some(rec)) => {
            config.parameters = merged(&config.parameters, &rec.parameters);
        }
        (Method::Manual, None) => {}
        (method, Some(rec)) => {
            config.optimized_parameters = Some(merged(&config.parameters, &rec.parameters));
            config.optimization_confidence = rec.confidence;
            config.optimization_reasoning = rec.reasoning.clone();
            config.optimization_factors = rec.factors.clone();
            config.expected_accuracy = rec.expected_accuracy;
            config.optimization_method = Some(method);
        }
        // Explicitly selected but stale: static defaults, never a stale value.
        (_, None) => {
            config.parameters = config.defaults.clone();
        }
    }

    ProjectedModel { config, resolution }
}

/// Projects every catalog model for `sku`.
pub fn project_at(
    cache: &CacheStore,
    catalog: &ModelCatalog,
    sku: &Sku,
    series_digest: &str,
    weights: &MetricWeights,
    ai_disabled: bool,
    now: DateTime<Utc>,
) -> Projection {
    let models = catalog
        .models()
        .iter()
        .map(|m| project_model(cache, m, sku, series_digest, weights, ai_disabled, now))
        .collect();
    Projection {
        sku: sku.clone(),
        version: cache.version(),
        models,
    }
}

pub fn project(
    cache: &CacheStore,
    catalog: &ModelCatalog,
    sku: &Sku,
    series_digest: &str,
    weights: &MetricWeights,
    ai_disabled: bool,
) -> Projection {
    project_at(cache, catalog, sku, series_digest, weights, ai_disabled, Utc::now())
}

pub struct ModelStateSynchronizer {
    cache: SharedCache,
    data: SharedData,
    catalog: Arc<ModelCatalog>,
    breaker: Arc<AiCircuitBreaker>,
    weights: MetricWeights,
    active_sku: Option<Sku>,
    last_version: Option<u64>,
    out: watch::Sender<Option<Arc<Projection>>>,
}

impl ModelStateSynchronizer {
    pub fn new(
        cache: SharedCache,
        data: SharedData,
        catalog: Arc<ModelCatalog>,
        breaker: Arc<AiCircuitBreaker>,
        weights: MetricWeights,
    ) -> Self {
        let (out, _) = watch::channel(None);
        Self {
            cache,
            data,
            catalog,
            breaker,
            weights,
            active_sku: None,
            last_version: None,
            out,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Projection>>> {
        self.out.subscribe()
    }

    pub fn active_sku(&self) -> Option<&Sku> {
        self.active_sku.as_ref()
    }

    /// Switching SKU forces a recompute on the next [`sync`](Self::sync).
    pub fn set_active_sku(&mut self, sku: Option<Sku>) {
        if self.active_sku != sku {
            self.active_sku = sku;
            self.last_version = None;
        }
    }

    /// Recomputes the projection if the cache version changed since the last
    /// call. Returns the new projection, or `None` when nothing was done.
    pub async fn sync(&mut self) -> Option<Arc<Projection>> {
        let sku = self.active_sku.clone()?;
        let digest = self.data.read().await.digest(&sku).unwrap_or_default();

        let cache = self.cache.read().await;
        let version = cache.version();
        if self.last_version == Some(version) {
            return None;
        }
        let projection = Arc::new(project(
            &cache,
            &self.catalog,
            &sku,
            &digest,
            &self.weights,
            self.breaker.is_disabled(),
        ));
        drop(cache);

        self.last_version = Some(version);
        tracing::debug!(
            target: "tuner.sync",
            sku = %sku,
            version,
            "model configuration resynchronized"
        );
        self.out.send_replace(Some(projection.clone()));
        Some(projection)
    }

    /// Resyncs on every version change. Stops once `shutdown` reads `true`,
    /// or when either channel closes.
    pub async fn run(
        mut self,
        mut versions: watch::Receiver<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            self.sync().await;
            tokio::select! {
                changed = versions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
        tracing::debug!(target: "tuner.sync", "synchronizer stopped");
    }
}
