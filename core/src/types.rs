use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(pub String);

impl Sku {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub String);

impl ModelId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameter name to value. Ordered so that serialization (and therefore
/// fingerprints) never depends on insertion order.
pub type ParamMap = BTreeMap<String, f64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Manual,
    Grid,
    Ai,
}

impl Method {
    /// Tie-break order used when no explicit selection exists.
    pub const AUTO_PRIORITY: [Method; 2] = [Method::Ai, Method::Grid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Manual => "manual",
            Method::Grid => "grid",
            Method::Ai => "ai",
        }
    }

    pub fn is_automatic(&self) -> bool {
        !matches!(self, Method::Manual)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Method::Manual),
            "grid" => Ok(Method::Grid),
            "ai" => Ok(Method::Ai),
            other => Err(format!("unknown optimization method: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Scoring-weight configuration used by the searches. Part of every
/// fingerprint: changing a weight makes previously optimized records stale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    #[serde(default = "default_mape_weight")]
    pub mape: f64,
    #[serde(default = "default_rmse_weight")]
    pub rmse: f64,
    #[serde(default = "default_bias_weight")]
    pub bias: f64,
}

fn default_mape_weight() -> f64 {
    0.4
}

fn default_rmse_weight() -> f64 {
    0.3
}

fn default_bias_weight() -> f64 {
    0.3
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            mape: default_mape_weight(),
            rmse: default_rmse_weight(),
            bias: default_bias_weight(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRecord {
    pub parameters: ParamMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub data_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl OptimizationRecord {
    pub fn new(parameters: ParamMap, data_hash: impl Into<String>) -> Self {
        Self {
            parameters,
            confidence: None,
            data_hash: data_hash.into(),
            reasoning: None,
            factors: Vec::new(),
            expected_accuracy: None,
            timestamp: Utc::now(),
        }
    }
}

/// Who wrote the `selected` field of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    User,
    Optimizer,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<OptimizationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<OptimizationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<OptimizationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<Method>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_by: Option<SelectionSource>,
}

impl CacheEntry {
    pub fn record(&self, method: Method) -> Option<&OptimizationRecord> {
        match method {
            Method::Manual => self.manual.as_ref(),
            Method::Grid => self.grid.as_ref(),
            Method::Ai => self.ai.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, method: Method) -> &mut Option<OptimizationRecord> {
        match method {
            Method::Manual => &mut self.manual,
            Method::Grid => &mut self.grid,
            Method::Ai => &mut self.ai,
        }
    }

    /// Selections without a source predate `selected_by` and count as the user's.
    pub fn is_user_selected(&self) -> bool {
        self.selected.is_some() && self.selected_by != Some(SelectionSource::Optimizer)
    }

    pub fn is_empty(&self) -> bool {
        self.manual.is_none() && self.grid.is_none() && self.ai.is_none() && self.selected.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobReason {
    DataChanged,
    UserRequest,
}

impl fmt::Display for JobReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobReason::DataChanged => "data_changed",
            JobReason::UserRequest => "user_request",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub sku: Sku,
    pub model_id: ModelId,
    pub method: Method,
    pub reason: JobReason,
    pub fingerprint: String,
    pub timestamp: DateTime<Utc>,
}

impl QueueItem {
    pub fn same_slot(&self, sku: &Sku, model_id: &ModelId, method: Method) -> bool {
        &self.sku == sku && &self.model_id == model_id && self.method == method
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
        )
    }
}
