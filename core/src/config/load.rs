use std::path::Path;

use super::types::AppConfig;
use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "config.toml";

pub fn load_default() -> Result<AppConfig, ConfigError> {
    load_from_path(Path::new(CONFIG_FILE))
}

/// Reads `path` when it exists (defaults otherwise), then applies `TUNER_*`
/// environment overrides and validates the result.
pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let mut cfg: AppConfig = if path.exists() {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str::<AppConfig>(&s).map_err(ConfigError::Parse)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    validate(&cfg)?;
    Ok(cfg)
}

fn apply_env_overrides<F>(cfg: &mut AppConfig, get: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("TUNER_DATA_DIR") {
        cfg.storage.data_dir = v;
    }
    if let Some(v) = non_empty("TUNER_AI_BASE_URL") {
        cfg.ai.base_url = v;
    }
    if let Some(v) = non_empty("TUNER_AI_API_KEY") {
        cfg.ai.api_key = v;
    }
    if let Some(v) = non_empty("TUNER_AI_MODEL") {
        cfg.ai.model = v;
    }
    if let Some(v) = non_empty("TUNER_AI_ENABLED") {
        cfg.optimizer.ai_enabled = match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(ConfigError::EnvInvalid {
                    key: "TUNER_AI_ENABLED".to_string(),
                    reason: format!("expected a boolean, got {v:?}"),
                })
            }
        };
    }
    Ok(())
}

fn validate(cfg: &AppConfig) -> Result<(), ConfigError> {
    if cfg.optimizer.ai_failure_threshold == 0 {
        return Err(ConfigError::Validation(
            "optimizer.ai_failure_threshold must be at least 1".into(),
        ));
    }
    let w = &cfg.weights;
    if [w.mape, w.rmse, w.bias].iter().any(|x| !x.is_finite() || *x < 0.0) {
        return Err(ConfigError::Validation(
            "weights must be finite and non-negative".into(),
        ));
    }
    if cfg.storage.cache_slot == cfg.storage.queue_slot {
        return Err(ConfigError::Validation(
            "storage.cache_slot and storage.queue_slot must differ".into(),
        ));
    }
    Ok(())
}
