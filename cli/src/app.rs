use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use tuner_core::api::{load_from_path, start_events_out, AppConfig, OptimizationEngine, CONFIG_FILE};
use tuner_core::error::CliError;

use crate::commands::cli::Args;

const APP_DIR: &str = "forecast-tuner";
const LOG_FILE: &str = "tuner.log";

/// Explicit `--config`, then `./config.toml`, then `<config dir>/forecast-tuner/config.toml`.
fn config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(shellexpand::tilde(p).into_owned());
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join(CONFIG_FILE))
        .unwrap_or(local)
}

pub fn load_config(args: &Args) -> Result<AppConfig, CliError> {
    let mut cfg = load_from_path(&config_path(args.config.as_deref()))?;
    if let Some(dir) = &args.data_dir {
        cfg.storage.data_dir = dir.clone();
    }
    if let Some(level) = &args.log_level {
        cfg.logging.level = level.clone();
    }
    Ok(cfg)
}

/// Console logging, plus a daily rolling file when `logging.dir` is set.
/// `RUST_LOG` wins over the configured level. Keep the guard alive until exit.
pub fn init_logging(cfg: &AppConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let dir = cfg.logging.dir.trim();
    if dir.is_empty() {
        tracing_subscriber::registry().with(filter).with(console).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(shellexpand::tilde(dir).into_owned(), LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Some(guard)
}

pub async fn build(cfg: &AppConfig) -> Result<OptimizationEngine, CliError> {
    let events_out = start_events_out(&cfg.events_out)
        .await
        .map_err(CliError::EventsOut)?;
    tuner_plugins::factory::build_engine(cfg, events_out).map_err(CliError::Plugin)
}
