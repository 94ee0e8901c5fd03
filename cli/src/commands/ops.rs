use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use tuner_core::api::{
    EngineStatus, EnqueueOutcome, ForecastResult, JobReason, JobResult, JobStatus, ModelId,
    OptimizationEngine, Projection, RequestOutcome, Sku,
};
use tuner_core::error::CliError;

use super::cli::{
    ForecastArgs, LoadArgs, ManualArgs, OutputFormat, PairMethodArgs, RunArgs, SelectArgs,
    SkuArgs,
};
use super::input::{parse_params, read_series};

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn fmt_params(params: &tuner_core::api::ParamMap) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub async fn load(
    engine: &OptimizationEngine,
    args: &LoadArgs,
    format: OutputFormat,
) -> Result<(), CliError> {
    let points = read_series(&args.file)?;
    let summary = engine.load_series(&Sku::new(&args.sku), points).await?;
    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => println!(
            "loaded {} points for {}: {} jobs queued, {} skipped",
            summary.points, summary.sku, summary.queued, summary.skipped
        ),
    }
    if args.run {
        run(engine, &RunArgs { limit: None, no_progress: false }, format).await?;
    }
    Ok(())
}

pub async fn remove(engine: &OptimizationEngine, args: &SkuArgs) -> Result<(), CliError> {
    let sku = Sku::new(&args.sku);
    if engine.remove_sku(&sku).await {
        println!("removed {sku}");
    } else {
        println!("no data for {sku}");
    }
    Ok(())
}

pub async fn enqueue(engine: &OptimizationEngine, args: &PairMethodArgs) -> Result<(), CliError> {
    let outcome = engine
        .enqueue(
            &Sku::new(&args.sku),
            &ModelId::new(&args.model),
            args.method,
            JobReason::UserRequest,
        )
        .await?;
    match outcome {
        EnqueueOutcome::Queued { id } => println!("queued {id}"),
        EnqueueOutcome::Skipped(reason) => println!("skipped: {reason}"),
    }
    Ok(())
}

pub async fn select(engine: &OptimizationEngine, args: &SelectArgs) -> Result<(), CliError> {
    let sku = Sku::new(&args.sku);
    let model = ModelId::new(&args.model);
    let Some(method) = args.method.filter(|_| !args.clear) else {
        engine.clear_selection(&sku, &model).await?;
        println!("{sku}/{model}: automatic selection");
        return Ok(());
    };
    let note = match engine.request_method(&sku, &model, method).await? {
        RequestOutcome::Ready => "ready".to_string(),
        RequestOutcome::Queued { id } => format!("queued {id}"),
        RequestOutcome::Skipped(reason) => format!("selected, not queued: {reason}"),
        RequestOutcome::AwaitingData => "selected, waiting for data".to_string(),
    };
    println!("{sku}/{model}: {method} ({note})");
    Ok(())
}

pub async fn manual(engine: &OptimizationEngine, args: &ManualArgs) -> Result<(), CliError> {
    let sku = Sku::new(&args.sku);
    let model = ModelId::new(&args.model);
    let params = parse_params(&args.params)?;
    if let Some(config) = engine.catalog().get(&model) {
        for name in params.keys().filter(|k| !config.parameters.contains_key(*k)) {
            tracing::warn!(target: "tuner.cli", model = %model, param = %name, "parameter not used by model");
        }
    }
    engine.save_manual_parameters(&sku, &model, params).await?;
    println!("{sku}/{model}: manual parameters saved and selected");
    Ok(())
}

fn progress_bar(total: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar
}

/// Drains the queue one job at a time. Ctrl-C pauses: the running job
/// finishes and the rest stays queued for the next run.
pub async fn run(
    engine: &OptimizationEngine,
    args: &RunArgs,
    format: OutputFormat,
) -> Result<(), CliError> {
    let control = engine.control();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            control.pause();
        }
    });

    let queue = engine.queue();
    let total = queue.lock().await.stats().queued;
    let bar = progress_bar(total, args.no_progress || format == OutputFormat::Json);

    let mut results: Vec<JobResult> = Vec::new();
    while !engine.is_paused() && args.limit.map_or(true, |n| results.len() < n) {
        let Some(result) = engine.process_next().await else {
            break;
        };
        bar.set_message(format!(
            "{} {} {}",
            result.item.sku, result.item.model_id, result.item.method
        ));
        bar.inc(1);
        // Fallbacks and breaker purges change the remaining work.
        let remaining = queue.lock().await.stats().queued as u64;
        bar.set_length(bar.position() + remaining);
        if result.status == JobStatus::Failed {
            bar.suspend(|| {
                eprintln!(
                    "failed: {} {} {}: {}",
                    result.item.sku,
                    result.item.model_id,
                    result.item.method,
                    result.error.as_deref().unwrap_or("unknown error")
                )
            });
        }
        results.push(result);
    }
    interrupt.abort();
    bar.finish_and_clear();

    let count = |s: JobStatus| results.iter().filter(|r| r.status == s).count();
    let paused = engine.is_paused();
    let ai_disabled = engine.status().await.ai_disabled;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "results": results,
            "paused": paused,
            "aiDisabled": ai_disabled,
        }))?,
        OutputFormat::Text => {
            println!(
                "{} completed, {} failed, {} skipped",
                count(JobStatus::Completed),
                count(JobStatus::Failed),
                count(JobStatus::Skipped)
            );
            if paused {
                println!("interrupted; remaining jobs stay queued");
            }
            if ai_disabled {
                println!("ai optimization is disabled; `tuner ai enable` turns it back on");
            }
        }
    }
    Ok(())
}

fn print_status(status: &EngineStatus) {
    let q = &status.queue;
    println!(
        "queue:    {} queued, {} active (completed {}, failed {}, skipped {})",
        q.queued, q.active, q.completed, q.failed, q.skipped
    );
    println!("version:  {}", status.cache_version);
    if status.ai_disabled {
        println!("ai:       disabled");
    } else {
        println!(
            "ai:       enabled ({}/{} consecutive failures)",
            status.ai_consecutive_failures, status.ai_failure_threshold
        );
    }
    let skus: Vec<String> = status.skus.iter().map(ToString::to_string).collect();
    println!("skus:     {}", if skus.is_empty() { "-".into() } else { skus.join(", ") });
    for item in &status.pending {
        println!(
            "  {} {} {} {} ({})",
            item.id.chars().take(8).collect::<String>(),
            item.sku,
            item.model_id,
            item.method,
            item.reason
        );
    }
}

pub async fn status(engine: &OptimizationEngine, format: OutputFormat) -> Result<(), CliError> {
    let status = engine.status().await;
    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Text => print_status(&status),
    }
    Ok(())
}

fn print_projection(p: &Projection) {
    println!("{} (version {})", p.sku, p.version);
    for m in &p.models {
        let r = &m.resolution;
        let mut flags = Vec::new();
        if r.explicit {
            flags.push("selected");
        }
        if !r.record_valid {
            flags.push("defaults");
        }
        if !m.config.enabled {
            flags.push("disabled");
        }
        println!(
            "  {:<30} {:<6} {:<20} {}",
            m.config.id.as_str(),
            r.method.as_str(),
            flags.join(","),
            fmt_params(m.config.effective_parameters())
        );
    }
}

pub async fn show(
    engine: &OptimizationEngine,
    args: &SkuArgs,
    format: OutputFormat,
) -> Result<(), CliError> {
    let projection = engine.project(&Sku::new(&args.sku)).await;
    match format {
        OutputFormat::Json => print_json(&projection)?,
        OutputFormat::Text => print_projection(&projection),
    }
    Ok(())
}

fn print_forecast(f: &ForecastResult) {
    println!(
        "{} {} via {} [{}]",
        f.sku,
        f.model_id,
        f.method,
        fmt_params(&f.parameters)
    );
    for p in &f.points {
        println!("  {}  {:.2}", p.date, p.value);
    }
}

pub async fn forecast(
    engine: &OptimizationEngine,
    args: &ForecastArgs,
    format: OutputFormat,
) -> Result<(), CliError> {
    let result = engine
        .forecast(&Sku::new(&args.sku), &ModelId::new(&args.model), args.horizon)
        .await?;
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_forecast(&result),
    }
    Ok(())
}

pub async fn clear_queue(engine: &OptimizationEngine) -> Result<(), CliError> {
    let dropped = engine.clear_queue().await;
    println!("dropped {dropped} pending jobs");
    Ok(())
}

pub async fn enable_ai(engine: &OptimizationEngine, configured: bool) -> Result<(), CliError> {
    if !configured {
        println!("ai optimization is not configured (set ai.api_key)");
        return Ok(());
    }
    engine.reenable_ai().await;
    println!("ai optimization enabled");
    Ok(())
}
