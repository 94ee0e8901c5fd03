use serde::Serialize;
use serde_json::json;

use tuner_core::api::{BusinessContext, ParamMap, SearchRequest};

/// Trailing points sent verbatim; older history is summarized.
const RECENT_POINTS: usize = 52;

pub const SYSTEM_PROMPT: &str = "You are a demand-forecasting analyst. \
You tune the parameters of one classical forecasting model for one product. \
Answer with a single JSON object and nothing else, shaped as \
{\"parameters\": {name: number}, \"confidence\": 0-100, \"reasoning\": string, \
\"factors\": [string], \"expectedAccuracy\": 0-100}. \
Only return parameter names that appear in currentParameters.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeriesSummary {
    points: usize,
    first_date: String,
    last_date: String,
    mean: f64,
    min: f64,
    max: f64,
    recent: Vec<f64>,
}

fn summarize(req: &SearchRequest<'_>) -> SeriesSummary {
    let values: Vec<f64> = req.series.iter().map(|p| p.value).collect();
    let n = values.len();
    let mean = if n == 0 {
        0.0
    } else {
        values.iter().sum::<f64>() / n as f64
    };
    SeriesSummary {
        points: n,
        first_date: req.series.first().map(|p| p.date.to_string()).unwrap_or_default(),
        last_date: req.series.last().map(|p| p.date.to_string()).unwrap_or_default(),
        mean,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        recent: values[n.saturating_sub(RECENT_POINTS)..].to_vec(),
    }
}

pub fn user_prompt(req: &SearchRequest<'_>, context: &BusinessContext) -> String {
    let current: &ParamMap = &req.model.parameters;
    json!({
        "sku": req.sku,
        "model": {
            "id": req.model.id,
            "name": req.model.name,
            "currentParameters": current,
            "defaults": req.model.defaults,
        },
        "series": summarize(req),
        "businessContext": context,
        "metricWeights": req.weights,
    })
    .to_string()
}
