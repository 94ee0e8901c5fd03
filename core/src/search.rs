//! Contracts for the external collaborators: forecasting functions and the
//! two parameter searches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BusinessContext;
use crate::error::SearchError;
use crate::model::ModelConfig;
use crate::types::{Method, MetricWeights, OptimizationRecord, ParamMap, SeriesPoint, Sku};

/// Pure forecasting function for one model id.
pub trait ForecastModel: Send + Sync {
    fn id(&self) -> &str;

    /// Minimum history needed for `compute` to return anything useful.
    fn min_points(&self, params: &ParamMap) -> usize;

    fn compute(&self, series: &[f64], params: &ParamMap, horizon: usize) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub sku: &'a Sku,
    pub model: &'a ModelConfig,
    pub series: &'a [SeriesPoint],
    pub weights: &'a MetricWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput {
    pub parameters: ParamMap,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub factors: Vec<String>,
    #[serde(default)]
    pub expected_accuracy: Option<f64>,
    pub method: Method,
}

impl SearchOutput {
    /// Non-finite numbers are dropped: JSON has no encoding for them.
    pub fn into_record(self, data_hash: &str) -> OptimizationRecord {
        OptimizationRecord {
            parameters: self
                .parameters
                .into_iter()
                .filter(|(_, v)| v.is_finite())
                .collect(),
            confidence: self
                .confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 100.0)),
            data_hash: data_hash.to_string(),
            reasoning: self.reasoning,
            factors: self.factors,
            expected_accuracy: self.expected_accuracy.filter(|a| a.is_finite()),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Exhaustive search. CPU-bound and expected to converge to the same result
/// for the same input.
pub trait GridSearch: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, req: SearchRequest<'_>) -> Result<SearchOutput, SearchError>;
}

/// Remote, unreliable search. `Ok(None)` means the service answered without a
/// usable parameter set and counts as a failure for the circuit breaker.
#[async_trait]
pub trait AiSearch: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        req: SearchRequest<'_>,
        context: &BusinessContext,
    ) -> Result<Option<SearchOutput>, SearchError>;
}
