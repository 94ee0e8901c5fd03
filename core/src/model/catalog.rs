use serde::{Deserialize, Serialize};

use crate::types::{Method, ModelId, ParamMap};

/// In-memory configuration of one forecasting model.
///
/// `parameters` is the user-editable base set and `defaults` the static
/// fallback. The `optimized_*` fields are an overlay written only by the
/// synchronizer; they never replace `parameters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: ModelId,
    pub name: String,
    pub enabled: bool,
    pub parameters: ParamMap,
    pub defaults: ParamMap,
    #[serde(default)]
    pub optimized_parameters: Option<ParamMap>,
    #[serde(default)]
    pub optimization_confidence: Option<f64>,
    #[serde(default)]
    pub optimization_reasoning: Option<String>,
    #[serde(default)]
    pub optimization_factors: Vec<String>,
    #[serde(default)]
    pub expected_accuracy: Option<f64>,
    #[serde(default)]
    pub optimization_method: Option<Method>,
}

impl ModelConfig {
    pub fn new(id: &str, name: &str, defaults: &[(&str, f64)]) -> Self {
        let defaults: ParamMap = defaults.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Self {
            id: ModelId::new(id),
            name: name.to_string(),
            enabled: true,
            parameters: defaults.clone(),
            defaults,
            optimized_parameters: None,
            optimization_confidence: None,
            optimization_reasoning: None,
            optimization_factors: Vec::new(),
            expected_accuracy: None,
            optimization_method: None,
        }
    }

    /// Parameters actually fed to the forecasting function.
    pub fn effective_parameters(&self) -> &ParamMap {
        self.optimized_parameters.as_ref().unwrap_or(&self.parameters)
    }

    pub fn clear_overlay(&mut self) {
        self.optimized_parameters = None;
        self.optimization_confidence = None;
        self.optimization_reasoning = None;
        self.optimization_factors.clear();
        self.expected_accuracy = None;
        self.optimization_method = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    models: Vec<ModelConfig>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelConfig>) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &[ModelConfig] {
        &self.models
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.iter().filter(|m| m.enabled)
    }

    pub fn get(&self, id: &ModelId) -> Option<&ModelConfig> {
        self.models.iter().find(|m| &m.id == id)
    }

}

impl Default for ModelCatalog {
    fn default() -> Self {
        default_catalog()
    }
}

pub fn default_catalog() -> ModelCatalog {
    ModelCatalog::new(vec![
        ModelConfig::new("moving_average", "Moving Average", &[("window", 3.0)]),
        ModelConfig::new(
            "simple_exponential_smoothing",
            "Simple Exponential Smoothing",
            &[("alpha", 0.3)],
        ),
        ModelConfig::new(
            "holt_winters",
            "Holt-Winters",
            &[
                ("alpha", 0.3),
                ("beta", 0.1),
                ("gamma", 0.1),
                ("season_length", 12.0),
            ],
        ),
        ModelConfig::new("linear_trend", "Linear Trend", &[]),
        ModelConfig::new("seasonal_naive", "Seasonal Naive", &[("season_length", 12.0)]),
    ])
}
