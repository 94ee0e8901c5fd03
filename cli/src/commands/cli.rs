use clap::{Args as ClapArgs, Parser, Subcommand};

use tuner_core::api::Method;

fn parse_method(s: &str) -> Result<Method, String> {
    s.parse()
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Parameter optimization cache and job queue for sales forecasting")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file. Defaults to ./config.toml, then the user config directory.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Overrides `storage.data_dir`. Use `:memory:` for a throwaway session.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Overrides `logging.level` (an EnvFilter directive).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Replace a SKU's sales series and queue re-optimization.
    Load(LoadArgs),
    /// Drop a SKU's series and cached results.
    Remove(SkuArgs),
    /// Queue one optimization job.
    Enqueue(PairMethodArgs),
    /// Pin the method used for a (sku, model) pair.
    Select(SelectArgs),
    /// Store hand-tuned parameters and select them.
    Manual(ManualArgs),
    /// Process queued jobs until the queue is empty or interrupted.
    Run(RunArgs),
    Status,
    /// Print the per-model parameters the forecasting page would use.
    Show(SkuArgs),
    Forecast(ForecastArgs),
    #[command(subcommand)]
    Queue(QueueCommand),
    #[command(subcommand)]
    Ai(AiCommand),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SkuArgs {
    #[arg(long)]
    pub sku: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LoadArgs {
    #[arg(long)]
    pub sku: String,

    /// CSV with `date,value` columns, or a JSON array of `{date, value}`.
    #[arg(long)]
    pub file: String,

    /// Process the queue right after loading.
    #[arg(long, default_value_t = false)]
    pub run: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PairMethodArgs {
    #[arg(long)]
    pub sku: String,

    #[arg(long)]
    pub model: String,

    /// grid or ai
    #[arg(long, value_parser = parse_method)]
    pub method: Method,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SelectArgs {
    #[arg(long)]
    pub sku: String,

    #[arg(long)]
    pub model: String,

    #[arg(long, value_parser = parse_method, required_unless_present = "clear")]
    pub method: Option<Method>,

    /// Go back to automatic selection.
    #[arg(long, default_value_t = false, conflicts_with = "method")]
    pub clear: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ManualArgs {
    #[arg(long)]
    pub sku: String,

    #[arg(long)]
    pub model: String,

    /// Parameter as NAME=VALUE. Can be specified multiple times.
    #[arg(long = "param", action = clap::ArgAction::Append, required = true)]
    pub params: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Stop after this many jobs.
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ForecastArgs {
    #[arg(long)]
    pub sku: String,

    #[arg(long)]
    pub model: String,

    #[arg(long, default_value_t = 12)]
    pub horizon: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum QueueCommand {
    /// Drop every pending job. Cached results are kept.
    Clear,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AiCommand {
    /// Re-enable AI optimization after the failure breaker tripped.
    Enable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn select_requires_method_or_clear() {
        assert!(Args::try_parse_from(["tuner", "select", "--sku", "A", "--model", "m"]).is_err());
        let args = Args::try_parse_from([
            "tuner", "select", "--sku", "A", "--model", "m", "--method", "ai",
        ])
        .unwrap();
        match args.command {
            Commands::Select(s) => assert_eq!(s.method, Some(Method::Ai)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let args =
            Args::try_parse_from(["tuner", "status", "--data-dir", ":memory:", "--format", "json"])
                .unwrap();
        assert_eq!(args.data_dir.as_deref(), Some(":memory:"));
        assert_eq!(args.format, OutputFormat::Json);
    }
}
