use std::sync::Arc;

use tuner_core::api::{
    ForecastModel, GridConfig, GridSearch, Method, ModelConfig, ParamMap, SearchError,
    SearchOutput, SearchRequest,
};

use super::score::{score, HoldoutScore};
use crate::forecast;

fn steps(from: f64, to: f64, step: f64) -> Vec<f64> {
    let n = ((to - from) / step).round() as usize;
    (0..=n)
        .map(|i| ((from + i as f64 * step) * 1000.0).round() / 1000.0)
        .collect()
}

/// Candidate values per parameter for a model. Parameters without an axis
/// keep the model's base value.
fn axes(model_id: &str, train_len: usize) -> Vec<(&'static str, Vec<f64>)> {
    match model_id {
        "moving_average" => {
            let max = train_len.clamp(2, 12);
            vec![("window", (2..=max).map(|w| w as f64).collect())]
        }
        "simple_exponential_smoothing" => vec![("alpha", steps(0.05, 0.95, 0.05))],
        "holt_winters" => vec![
            ("alpha", steps(0.1, 0.9, 0.2)),
            ("beta", vec![0.05, 0.1, 0.2, 0.3]),
            ("gamma", vec![0.05, 0.1, 0.2, 0.3]),
        ],
        "seasonal_naive" => vec![(
            "season_length",
            [4.0, 7.0, 12.0, 13.0, 26.0, 52.0]
                .into_iter()
                .filter(|m| (*m as usize) < train_len)
                .collect(),
        )],
        _ => Vec::new(),
    }
}

fn candidates(base: &ParamMap, axes: &[(&'static str, Vec<f64>)]) -> Vec<ParamMap> {
    let mut out = vec![base.clone()];
    for (name, values) in axes {
        if values.is_empty() {
            continue;
        }
        out = out
            .iter()
            .flat_map(|p| {
                values.iter().map(move |v| {
                    let mut next = p.clone();
                    next.insert(name.to_string(), *v);
                    next
                })
            })
            .collect();
    }
    out
}

/// Scores every parameter combination on a trailing hold-out window and keeps
/// the lowest weighted error. Ties go to the earlier candidate, so the result
/// is stable for identical input.
pub struct ExhaustiveGridSearch {
    models: Vec<Arc<dyn ForecastModel>>,
    holdout: usize,
    min_points: usize,
}

impl ExhaustiveGridSearch {
    pub fn new(models: Vec<Arc<dyn ForecastModel>>, cfg: &GridConfig) -> Self {
        Self {
            models,
            holdout: cfg.holdout.max(1),
            min_points: cfg.min_points,
        }
    }

    fn best(
        &self,
        fm: &dyn ForecastModel,
        model: &ModelConfig,
        train: &[f64],
        test: &[f64],
        req: &SearchRequest<'_>,
    ) -> Option<(ParamMap, HoldoutScore, usize)> {
        let all = candidates(&model.parameters, &axes(model.id.as_str(), train.len()));
        let tried = all.len();
        let mut best: Option<(ParamMap, HoldoutScore)> = None;
        for params in all {
            if fm.min_points(&params) > train.len() {
                continue;
            }
            let forecast = fm.compute(train, &params, test.len());
            let Some(s) = score(test, &forecast, req.weights) else {
                continue;
            };
            if best.as_ref().map_or(true, |(_, b)| s.weighted < b.weighted) {
                best = Some((params, s));
            }
        }
        best.map(|(p, s)| (p, s, tried))
    }
}

impl GridSearch for ExhaustiveGridSearch {
    fn name(&self) -> &str {
        "exhaustive_grid"
    }

    fn run(&self, req: SearchRequest<'_>) -> Result<SearchOutput, SearchError> {
        let model = req.model;
        let fm = forecast::find(&self.models, model.id.as_str())
            .ok_or_else(|| SearchError::UnknownModel(model.id.to_string()))?;

        if req.series.is_empty() {
            return Err(SearchError::EmptySeries);
        }
        let needed = self.min_points.max(self.holdout + 2);
        if req.series.len() < needed {
            return Err(SearchError::SeriesTooShort {
                needed,
                have: req.series.len(),
            });
        }

        let values: Vec<f64> = req.series.iter().map(|p| p.value).collect();
        let (train, test) = values.split_at(values.len() - self.holdout);

        let (parameters, s, tried) = self
            .best(fm.as_ref(), model, train, test, &req)
            .ok_or(SearchError::EmptyResult)?;

        tracing::debug!(
            target: "tuner.grid",
            sku = %req.sku,
            model = %model.id,
            candidates = tried,
            score = s.weighted,
            "grid search finished"
        );

        let confidence = (100.0 - s.weighted).clamp(0.0, 100.0);
        Ok(SearchOutput {
            parameters,
            confidence: Some(confidence),
            reasoning: Some(format!(
                "best of {tried} candidates on a {}-point holdout: MAPE {:.1}%, RMSE {:.1}%, bias {:.1}%",
                self.holdout, s.mape, s.rmse, s.bias
            )),
            factors: vec![
                format!("mape={:.2}", s.mape),
                format!("rmse={:.2}", s.rmse),
                format!("bias={:.2}", s.bias),
            ],
            expected_accuracy: Some((100.0 - s.mape).clamp(0.0, 100.0)),
            method: Method::Grid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tuner_core::api::{default_catalog, MetricWeights, ModelId, SeriesPoint, Sku};

    fn series(values: &[f64]) -> Vec<SeriesPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SeriesPoint::new(start + chrono::Duration::weeks(i as i64), *v))
            .collect()
    }

    fn search() -> ExhaustiveGridSearch {
        ExhaustiveGridSearch::new(forecast::builtin_models(), &GridConfig::default())
    }

    fn run(model: &str, values: &[f64]) -> Result<SearchOutput, SearchError> {
        let catalog = default_catalog();
        let model = catalog.get(&ModelId::new(model)).unwrap();
        let sku = Sku::new("S1");
        let s = series(values);
        let w = MetricWeights::default();
        search().run(SearchRequest {
            sku: &sku,
            model,
            series: &s,
            weights: &w,
        })
    }

    #[test]
    fn candidate_grid_is_a_cartesian_product() {
        let base: ParamMap = [("alpha".to_string(), 0.3), ("season_length".to_string(), 12.0)]
            .into_iter()
            .collect();
        let c = candidates(&base, &axes("holt_winters", 40));
        assert_eq!(c.len(), 5 * 4 * 4);
        assert!(c.iter().all(|p| p["season_length"] == 12.0));
    }

    #[test]
    fn trending_series_prefers_linear_fit() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 + 5.0 * i as f64).collect();
        let out = run("linear_trend", &values).unwrap();
        assert_eq!(out.method, Method::Grid);
        assert!(out.confidence.unwrap() > 99.0);
    }

    #[test]
    fn picks_the_best_window() {
        let values = [10.0, 30.0, 10.0, 30.0, 10.0, 30.0, 10.0, 30.0, 10.0, 30.0, 10.0, 30.0];
        let out = run("moving_average", &values).unwrap();
        // Even windows average the alternation out exactly.
        assert_eq!(out.parameters["window"] as usize % 2, 0);
    }

    #[test]
    fn repeated_runs_agree() {
        let values: Vec<f64> = (0..30).map(|i| 50.0 + ((i * 7) % 11) as f64).collect();
        let a = run("holt_winters", &values).unwrap();
        let b = run("holt_winters", &values).unwrap();
        assert_eq!(a.parameters, b.parameters);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn short_series_is_rejected() {
        let err = run("linear_trend", &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, SearchError::SeriesTooShort { needed: 8, have: 3 }));
    }
}
