use serde::{Deserialize, Serialize};

use crate::types::MetricWeights;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub weights: MetricWeights,

    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_cache_slot")]
    pub cache_slot: String,

    #[serde(default = "default_queue_slot")]
    pub queue_slot: String,

    #[serde(default = "default_data_slot")]
    pub data_slot: String,

    #[serde(default = "default_breaker_slot")]
    pub breaker_slot: String,
}

fn default_data_dir() -> String {
    "~/.forecast-tuner".to_string()
}

fn default_cache_slot() -> String {
    "optimization-cache".to_string()
}

fn default_queue_slot() -> String {
    "optimization-queue".to_string()
}

fn default_data_slot() -> String {
    "sales-data".to_string()
}

fn default_breaker_slot() -> String {
    "ai-breaker".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_slot: default_cache_slot(),
            queue_slot: default_queue_slot(),
            data_slot: default_data_slot(),
            breaker_slot: default_breaker_slot(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Records older than this are stale regardless of their data hash.
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    #[serde(default = "default_ai_failure_threshold")]
    pub ai_failure_threshold: u32,

    #[serde(default = "default_ai_enabled")]
    pub ai_enabled: bool,

    /// Queue an `ai` job next to the `grid` job whenever a SKU's data changes.
    #[serde(default = "default_enqueue_ai_on_data_change")]
    pub enqueue_ai_on_data_change: bool,

    #[serde(default)]
    pub business_context: BusinessContext,
}

fn default_cache_ttl_hours() -> u64 {
    24 * 7
}

fn default_ai_failure_threshold() -> u32 {
    5
}

fn default_ai_enabled() -> bool {
    true
}

fn default_enqueue_ai_on_data_change() -> bool {
    true
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: default_cache_ttl_hours(),
            ai_failure_threshold: default_ai_failure_threshold(),
            ai_enabled: default_ai_enabled(),
            enqueue_ai_on_data_change: default_enqueue_ai_on_data_change(),
            business_context: BusinessContext::default(),
        }
    }
}

/// Upper bound for `cache_ttl_hours` (about a century).
const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

impl OptimizerConfig {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours.min(MAX_TTL_HOURS) as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessContext {
    #[serde(default = "default_cost_of_error")]
    pub cost_of_error: String,

    #[serde(default = "default_forecast_horizon")]
    pub forecast_horizon: String,

    #[serde(default = "default_update_frequency")]
    pub update_frequency: String,

    #[serde(default = "default_interpretability_needs")]
    pub interpretability_needs: String,
}

fn default_cost_of_error() -> String {
    "medium".to_string()
}

fn default_forecast_horizon() -> String {
    "medium".to_string()
}

fn default_update_frequency() -> String {
    "weekly".to_string()
}

fn default_interpretability_needs() -> String {
    "medium".to_string()
}

impl Default for BusinessContext {
    fn default() -> Self {
        Self {
            cost_of_error: default_cost_of_error(),
            forecast_horizon: default_forecast_horizon(),
            update_frequency: default_update_frequency(),
            interpretability_needs: default_interpretability_needs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Trailing points held out to score each candidate parameter set.
    #[serde(default = "default_holdout")]
    pub holdout: usize,

    #[serde(default = "default_min_points")]
    pub min_points: usize,
}

fn default_holdout() -> usize {
    4
}

fn default_min_points() -> usize {
    8
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            holdout: default_holdout(),
            min_points: default_min_points(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    #[serde(default = "default_ai_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_ai_temperature")]
    pub temperature: f32,
}

fn default_ai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_timeout_ms() -> u64 {
    30_000
}

fn default_ai_temperature() -> f32 {
    0.2
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_url(),
            api_key: String::new(),
            model: default_ai_model(),
            timeout_ms: default_ai_timeout_ms(),
            temperature: default_ai_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsOutConfig {
    #[serde(default)]
    pub enabled: bool,

    /// File path, or `stdout:` to write to standard output.
    #[serde(default)]
    pub path: String,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_drop_when_full")]
    pub drop_when_full: bool,
}

fn default_channel_capacity() -> usize {
    256
}

fn default_drop_when_full() -> bool {
    true
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: String::new(),
            channel_capacity: default_channel_capacity(),
            drop_when_full: default_drop_when_full(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily rolling log file. Console only when empty.
    #[serde(default)]
    pub dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: String::new(),
        }
    }
}
