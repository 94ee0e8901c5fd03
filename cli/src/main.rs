use clap::Parser;
mod app;
mod commands;
use commands::cli::{self, AiCommand, Commands, QueueCommand};
use commands::ops;
use tuner_core::error::CliError;

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = cli::Args::parse();
    let cfg = app::load_config(&args)?;
    let _log_guard = app::init_logging(&cfg);

    let engine = app::build(&cfg).await?;
    let format = args.format;

    match &args.command {
        Commands::Load(a) => ops::load(&engine, a, format).await,
        Commands::Remove(a) => ops::remove(&engine, a).await,
        Commands::Enqueue(a) => ops::enqueue(&engine, a).await,
        Commands::Select(a) => ops::select(&engine, a).await,
        Commands::Manual(a) => ops::manual(&engine, a).await,
        Commands::Run(a) => ops::run(&engine, a, format).await,
        Commands::Status => ops::status(&engine, format).await,
        Commands::Show(a) => ops::show(&engine, a, format).await,
        Commands::Forecast(a) => ops::forecast(&engine, a, format).await,
        Commands::Queue(QueueCommand::Clear) => ops::clear_queue(&engine).await,
        Commands::Ai(AiCommand::Enable) => {
            ops::enable_ai(&engine, !cfg.ai.api_key.trim().is_empty()).await
        }
    }
}
