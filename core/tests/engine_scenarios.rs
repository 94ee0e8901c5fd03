//! End-to-end behaviour of the optimization engine with in-process
//! collaborators standing in for the grid search, the AI service and the
//! forecasting functions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tokio::sync::watch;

use tuner_core::api::*;

struct CountingGrid {
    calls: AtomicUsize,
}

impl GridSearch for CountingGrid {
    fn name(&self) -> &str {
        "counting-grid"
    }

    fn run(&self, req: SearchRequest<'_>) -> Result<SearchOutput, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut parameters = req.model.defaults.clone();
        if let Some(alpha) = parameters.get_mut("alpha") {
            *alpha = 0.55;
        }
        parameters.insert("tuned".into(), 1.0);
        Ok(SearchOutput {
            parameters,
            confidence: Some(72.0),
            reasoning: Some(format!("grid over {} points", req.series.len())),
            factors: Vec::new(),
            expected_accuracy: Some(72.0),
            method: Method::Grid,
        })
    }
}

struct FlakyAi {
    fail: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl AiSearch for FlakyAi {
    fn name(&self) -> &str {
        "flaky-ai"
    }

    async fn run(
        &self,
        _req: SearchRequest<'_>,
        _context: &BusinessContext,
    ) -> Result<Option<SearchOutput>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SearchError::HttpStatus {
                status: 503,
                body_snippet: "upstream unavailable".into(),
            });
        }
        Ok(Some(SearchOutput {
            parameters: ParamMap::from([("alpha".to_string(), 0.8)]),
            confidence: Some(90.0),
            reasoning: Some("recent level shift".into()),
            factors: vec!["trend".into()],
            expected_accuracy: Some(85.0),
            method: Method::Ai,
        }))
    }
}

/// Forecasts a flat line at `alpha` and remembers the parameters it was given.
struct EchoForecast {
    id: &'static str,
    seen: Mutex<Option<ParamMap>>,
}

impl ForecastModel for EchoForecast {
    fn id(&self) -> &str {
        self.id
    }

    fn min_points(&self, _params: &ParamMap) -> usize {
        1
    }

    fn compute(&self, _series: &[f64], params: &ParamMap, horizon: usize) -> Vec<f64> {
        *self.seen.lock().unwrap() = Some(params.clone());
        vec![params.get("alpha").copied().unwrap_or(0.0); horizon]
    }
}

#[derive(Default)]
struct Inbox {
    seen: Mutex<Vec<Notification>>,
}

impl Inbox {
    fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
        self.seen.lock().unwrap().iter().filter(|n| pred(n)).count()
    }
}

#[async_trait]
impl Notifier for Inbox {
    async fn notify(&self, n: &Notification) {
        self.seen.lock().unwrap().push(n.clone());
    }
}

struct World {
    storage: Arc<MemoryStorage>,
    grid: Arc<CountingGrid>,
    ai: Arc<FlakyAi>,
    hw_forecast: Arc<EchoForecast>,
    inbox: Arc<Inbox>,
}

impl World {
    fn new() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            grid: Arc::new(CountingGrid {
                calls: AtomicUsize::new(0),
            }),
            ai: Arc::new(FlakyAi {
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }),
            hw_forecast: Arc::new(EchoForecast {
                id: "holt_winters",
                seen: Mutex::new(None),
            }),
            inbox: Arc::new(Inbox::default()),
        }
    }

    fn engine(&self, optimizer: OptimizerConfig) -> OptimizationEngine {
        OptimizationEngine::open(EngineDeps {
            storage: self.storage.clone(),
            slots: StorageConfig::default(),
            optimizer,
            weights: MetricWeights::default(),
            catalog: default_catalog(),
            grid: self.grid.clone(),
            ai: self.ai.clone(),
            forecasters: vec![self.hw_forecast.clone()],
            notifier: self.inbox.clone(),
        })
    }
}

fn grid_only() -> OptimizerConfig {
    OptimizerConfig {
        enqueue_ai_on_data_change: false,
        ..OptimizerConfig::default()
    }
}

fn series(offset: f64) -> Vec<SeriesPoint> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    (0..30)
        .map(|i| {
            SeriesPoint::new(
                start + chrono::Duration::weeks(i),
                200.0 + 10.0 * ((i % 6) as f64) + offset,
            )
        })
        .collect()
}

fn hw() -> ModelId {
    ModelId::new("holt_winters")
}

fn lt() -> ModelId {
    ModelId::new("linear_trend")
}

#[tokio::test]
async fn grid_result_reaches_the_forecasting_function() {
    let world = World::new();
    let engine = world.engine(grid_only());
    let sku = Sku::new("S1");

    let summary = engine.load_series(&sku, series(0.0)).await.unwrap();
    assert_eq!(summary.points, 30);
    assert_eq!(summary.queued, engine.catalog().enabled().count());

    let report = engine.process_queue().await;
    assert_eq!(report.completed(), summary.queued);

    {
        let cache = engine.cache();
        let cache = cache.read().await;
        let hash = engine.current_hash(&sku, &hw()).await.unwrap();
        assert!(cache.is_valid(&sku, &hw(), Method::Grid, &hash));
        assert_eq!(cache.entry(&sku, &hw()).unwrap().selected, Some(Method::Grid));
    }

    let projection = engine.project(&sku).await;
    let model = projection.model(&hw()).unwrap();
    assert_eq!(model.resolution.method, Method::Grid);
    assert_eq!(model.config.effective_parameters()["alpha"], 0.55);
    assert_eq!(model.config.parameters["alpha"], 0.3);

    let forecast = engine.forecast(&sku, &hw(), 4).await.unwrap();
    assert_eq!(forecast.method, Method::Grid);
    assert_eq!(forecast.points.len(), 4);
    assert_eq!(forecast.points[0].value, 0.55);
    let last = series(0.0).last().unwrap().date;
    assert_eq!(forecast.points[0].date, last + chrono::Duration::weeks(1));
    let seen = world.hw_forecast.seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen, forecast.parameters);
}

#[tokio::test]
async fn ai_breaker_trips_after_threshold_and_notifies_once() {
    let world = World::new();
    world.ai.fail.store(true, Ordering::SeqCst);
    let engine = world.engine(grid_only());

    let skus: Vec<Sku> = (1..=6).map(|i| Sku::new(format!("S{i}"))).collect();
    for sku in &skus {
        engine.load_series(sku, series(0.0)).await.unwrap();
    }
    engine.process_queue().await;
    for sku in &skus {
        let outcome = engine
            .enqueue(sku, &lt(), Method::Ai, JobReason::UserRequest)
            .await
            .unwrap();
        assert!(outcome.is_queued());
    }

    let report = engine.process_queue().await;
    assert!(report.ai_disabled);
    assert_eq!(report.failed(), 5);
    assert_eq!(world.ai.calls.load(Ordering::SeqCst), 5);
    // The sixth job was purged, not run.
    assert!(engine.queue().lock().await.is_empty());

    let late = engine
        .enqueue(&skus[0], &hw(), Method::Ai, JobReason::UserRequest)
        .await
        .unwrap();
    assert_eq!(late, EnqueueOutcome::Skipped(SkipReason::AiDisabled));
    assert_eq!(world.ai.calls.load(Ordering::SeqCst), 5);

    let disabled = world
        .inbox
        .count(|n| matches!(n, Notification::AiDisabled { .. }));
    assert_eq!(disabled, 1);
    // Failures before the trip still named their fallback.
    let failed_with_grid = world.inbox.count(|n| {
        matches!(
            n,
            Notification::JobFailed {
                fallback: Some(Method::Grid),
                ..
            }
        )
    });
    assert_eq!(failed_with_grid, 4);

    let status = engine.status().await;
    assert!(status.ai_disabled);

    engine.reenable_ai().await;
    assert!(engine.ai_available());
    world.ai.fail.store(false, Ordering::SeqCst);
    let again = engine
        .enqueue(&skus[0], &lt(), Method::Ai, JobReason::UserRequest)
        .await
        .unwrap();
    assert!(again.is_queued());
}

#[tokio::test]
async fn duplicate_enqueue_runs_once() {
    let world = World::new();
    let engine = world.engine(grid_only());
    let sku = Sku::new("S1");
    engine.load_series(&sku, series(0.0)).await.unwrap();

    let dup = engine
        .enqueue(&sku, &hw(), Method::Grid, JobReason::UserRequest)
        .await
        .unwrap();
    assert_eq!(dup, EnqueueOutcome::Skipped(SkipReason::AlreadyQueued));

    engine.process_queue().await;
    let models = engine.catalog().enabled().count();
    assert_eq!(world.grid.calls.load(Ordering::SeqCst), models);

    let again = engine
        .enqueue(&sku, &hw(), Method::Grid, JobReason::UserRequest)
        .await
        .unwrap();
    assert_eq!(again, EnqueueOutcome::Skipped(SkipReason::AlreadyValid));
    assert_eq!(world.grid.calls.load(Ordering::SeqCst), models);

    let stats = engine.status().await.queue;
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.completed as usize, models);
}

#[tokio::test]
async fn version_only_moves_forward() {
    let world = World::new();
    let engine = world.engine(OptimizerConfig::default());
    let sku = Sku::new("S1");
    let rx = engine.subscribe_version().await;

    let mut last = *rx.borrow();
    let mut check = |v: u64| {
        assert!(v > last, "version {v} did not advance past {last}");
        last = v;
    };

    engine.load_series(&sku, series(0.0)).await.unwrap();
    check(*rx.borrow());
    engine.process_queue().await;
    check(*rx.borrow());
    engine.request_method(&sku, &hw(), Method::Manual).await.unwrap();
    check(*rx.borrow());
    engine.clear_selection(&sku, &hw()).await.unwrap();
    check(*rx.borrow());
    engine.reenable_ai().await;
    check(*rx.borrow());
}

#[tokio::test]
async fn series_edit_invalidates_cached_records() {
    let world = World::new();
    let engine = world.engine(grid_only());
    let sku = Sku::new("S1");
    engine.load_series(&sku, series(0.0)).await.unwrap();
    engine.process_queue().await;

    let old_hash = engine.current_hash(&sku, &hw()).await.unwrap();
    let record = engine
        .cache()
        .read()
        .await
        .get(&sku, &hw(), Method::Grid)
        .cloned()
        .unwrap();

    let mut edited = series(0.0);
    edited[7].value += 1.0;
    engine.load_series(&sku, edited).await.unwrap();
    let new_hash = engine.current_hash(&sku, &hw()).await.unwrap();
    assert_ne!(old_hash, new_hash);

    let cache = engine.cache();
    let mut cache = cache.write().await;
    assert!(cache.get(&sku, &hw(), Method::Grid).is_none());
    cache.set(&sku, &hw(), Method::Grid, record);
    assert!(!cache.is_valid(&sku, &hw(), Method::Grid, &new_hash));
    assert!(cache.is_valid(&sku, &hw(), Method::Grid, &old_hash));
}

#[tokio::test]
async fn explicit_request_for_missing_method_queues_it() {
    let world = World::new();
    let engine = world.engine(grid_only());
    let sku = Sku::new("S1");
    engine.load_series(&sku, series(0.0)).await.unwrap();
    engine.process_queue().await;

    let outcome = engine.request_method(&sku, &hw(), Method::Ai).await.unwrap();
    assert!(matches!(outcome, RequestOutcome::Queued { .. }));

    // Selected but not computed yet: explicit, stale, static defaults.
    let r = engine.resolve(&sku, &hw()).await.unwrap();
    assert_eq!(r.method, Method::Ai);
    assert!(r.explicit);
    assert!(!r.record_valid);
    let projection = engine.project(&sku).await;
    let m = projection.model(&hw()).unwrap();
    assert_eq!(m.config.effective_parameters(), &m.config.defaults);

    engine.process_queue().await;
    let projection = engine.project(&sku).await;
    let m = projection.model(&hw()).unwrap();
    assert!(m.resolution.record_valid);
    assert_eq!(m.config.effective_parameters()["alpha"], 0.8);
    assert_eq!(m.config.optimization_method, Some(Method::Ai));

    let ready = engine.request_method(&sku, &hw(), Method::Grid).await.unwrap();
    assert_eq!(ready, RequestOutcome::Ready);
}

#[tokio::test]
async fn manual_parameters_are_selected_and_projected() {
    let world = World::new();
    let engine = world.engine(grid_only());
    let sku = Sku::new("S1");
    engine.load_series(&sku, series(0.0)).await.unwrap();
    engine.process_queue().await;

    let params = ParamMap::from([("alpha".to_string(), 0.15)]);
    engine
        .save_manual_parameters(&sku, &hw(), params)
        .await
        .unwrap();

    let projection = engine.project(&sku).await;
    let m = projection.model(&hw()).unwrap();
    assert_eq!(m.resolution.method, Method::Manual);
    assert!(m.resolution.explicit);
    assert_eq!(m.config.parameters["alpha"], 0.15);
    assert_eq!(m.config.parameters["beta"], 0.1);

    let entry = engine.cache().read().await.entry(&sku, &hw()).cloned().unwrap();
    assert_eq!(entry.selected, Some(Method::Manual));
    assert!(entry.is_user_selected());
}

#[tokio::test]
async fn pause_and_clear_leave_results_intact() {
    let world = World::new();
    let engine = world.engine(grid_only());
    let sku = Sku::new("S1");
    let summary = engine.load_series(&sku, series(0.0)).await.unwrap();

    engine.pause();
    let report = engine.process_queue().await;
    assert!(report.paused);
    assert_eq!(engine.status().await.queue.queued, summary.queued);

    engine.resume();
    let cleared = engine.clear_queue().await;
    assert_eq!(cleared, summary.queued);
    assert!(engine.process_queue().await.results.is_empty());
    assert_eq!(world.grid.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn state_survives_reopen() {
    let world = World::new();
    let sku = Sku::new("S1");
    let queued = {
        let engine = world.engine(grid_only());
        let summary = engine.load_series(&sku, series(0.0)).await.unwrap();
        engine.process_next().await.unwrap();
        summary.queued
    };

    let engine = world.engine(grid_only());
    let status = engine.status().await;
    assert_eq!(status.skus, vec![sku.clone()]);
    assert_eq!(status.pending.len(), queued - 1);

    let report = engine.process_queue().await;
    assert_eq!(report.completed(), queued - 1);
    assert_eq!(world.grid.calls.load(Ordering::SeqCst), queued);
}

#[tokio::test]
async fn unknown_model_and_missing_data_are_errors() {
    let world = World::new();
    let engine = world.engine(grid_only());
    let sku = Sku::new("S1");

    let err = engine
        .enqueue(&sku, &ModelId::new("prophet"), Method::Grid, JobReason::UserRequest)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownModel { .. }));

    let err = engine
        .enqueue(&sku, &hw(), Method::Grid, JobReason::UserRequest)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DataUnavailable(_)));

    let outcome = engine.request_method(&sku, &hw(), Method::Grid).await.unwrap();
    assert_eq!(outcome, RequestOutcome::AwaitingData);
}

async fn projection_at(
    rx: &mut watch::Receiver<Option<Arc<Projection>>>,
    version: u64,
) -> Arc<Projection> {
    let seen = tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|p| p.as_ref().is_some_and(|p| p.version >= version)),
    )
    .await
    .expect("no projection for this version")
    .expect("synchronizer stopped early");
    seen.clone().unwrap()
}

#[tokio::test]
async fn synchronizer_task_follows_engine_until_stopped() {
    let world = World::new();
    let engine = world.engine(grid_only());
    let sku = Sku::new("S1");

    let mut sync = engine.synchronizer();
    sync.set_active_sku(Some(sku.clone()));
    let mut projections = sync.subscribe();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(sync.run(engine.subscribe_version().await, stop_rx));

    let start = *engine.subscribe_version().await.borrow();
    let first = projection_at(&mut projections, start).await;
    assert_eq!(first.model(&hw()).unwrap().resolution.method, Method::Manual);

    engine.load_series(&sku, series(0.0)).await.unwrap();
    engine.process_queue().await;
    let version = engine.cache().read().await.version();
    assert!(version > start);
    let tuned = projection_at(&mut projections, version).await;
    assert_eq!(tuned.version, version);
    let m = tuned.model(&hw()).unwrap();
    assert_eq!(m.resolution.method, Method::Grid);
    assert_eq!(m.config.effective_parameters()["alpha"], 0.55);
    assert_eq!(tuned.models, engine.project(&sku).await.models);

    engine.request_method(&sku, &hw(), Method::Manual).await.unwrap();
    let selected = projection_at(&mut projections, version + 1).await;
    let m = selected.model(&hw()).unwrap();
    assert_eq!(m.resolution.method, Method::Manual);
    assert!(m.resolution.explicit);

    // The engine keeps the version channel open; the stop flag alone ends the task.
    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("synchronizer kept running")
        .unwrap();
    assert!(projections.has_changed().is_err());
    assert!(engine.subscribe_version().await.has_changed().is_ok());
}

#[tokio::test]
async fn expired_records_fall_back_and_are_recomputed() {
    let world = World::new();
    let engine = world.engine(OptimizerConfig {
        cache_ttl_hours: 24,
        ..OptimizerConfig::default()
    });
    let sku = Sku::new("S1");
    engine.load_series(&sku, series(0.0)).await.unwrap();
    engine.process_queue().await;
    assert_eq!(engine.resolve(&sku, &hw()).await.unwrap().method, Method::Ai);

    let hash = engine.current_hash(&sku, &hw()).await.unwrap();
    let two_days_ago = chrono::Utc::now() - chrono::Duration::hours(48);
    engine.cache().write().await.update_entry(&sku, &hw(), |e| {
        for rec in [&mut e.manual, &mut e.grid, &mut e.ai].into_iter().flatten() {
            assert_eq!(rec.data_hash, hash);
            rec.timestamp = two_days_ago;
        }
    });

    // Hashes still match, but age alone makes every record stale.
    let r = engine.resolve(&sku, &hw()).await.unwrap();
    assert_eq!(r.method, Method::Manual);
    assert!(!r.explicit);
    assert!(!r.record_valid);
    let forecast = engine.forecast(&sku, &hw(), 2).await.unwrap();
    assert_eq!(forecast.parameters, default_catalog().get(&hw()).unwrap().parameters);
    assert_eq!(forecast.points[0].value, 0.3);

    let grid_calls = world.grid.calls.load(Ordering::SeqCst);
    let ai_calls = world.ai.calls.load(Ordering::SeqCst);
    for method in [Method::Grid, Method::Ai] {
        let outcome = engine
            .enqueue(&sku, &hw(), method, JobReason::UserRequest)
            .await
            .unwrap();
        assert!(outcome.is_queued(), "{method} was not requeued: {outcome:?}");
    }
    let report = engine.process_queue().await;
    assert_eq!(report.completed(), 2);
    assert_eq!(world.grid.calls.load(Ordering::SeqCst), grid_calls + 1);
    assert_eq!(world.ai.calls.load(Ordering::SeqCst), ai_calls + 1);

    let r = engine.resolve(&sku, &hw()).await.unwrap();
    assert_eq!(r.method, Method::Ai);
    assert!(r.record_valid);
    assert_eq!(engine.forecast(&sku, &hw(), 1).await.unwrap().points[0].value, 0.8);
}

#[tokio::test]
async fn out_of_range_manual_parameters_are_rejected() {
    let world = World::new();
    let engine = world.engine(grid_only());
    let sku = Sku::new("S1");
    engine.load_series(&sku, series(0.0)).await.unwrap();
    engine.process_queue().await;
    let before = engine.cache().read().await.entry(&sku, &hw()).cloned();

    for (name, value) in [("season_length", 1e30), ("alpha", 1.5), ("beta", f64::NAN)] {
        let err = engine
            .save_manual_parameters(&sku, &hw(), ParamMap::from([(name.to_string(), value)]))
            .await
            .unwrap_err();
        assert!(
            matches!(err, EngineError::InvalidParameters { .. }),
            "{name}={value} gave {err:?}"
        );
    }
    assert_eq!(engine.cache().read().await.entry(&sku, &hw()).cloned(), before);
}
