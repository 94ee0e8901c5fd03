use serde::Serialize;

use tuner_core::api::MetricWeights;

/// Hold-out error of one candidate. Every metric is a percentage of the mean
/// absolute actual so that they can be weighted against each other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HoldoutScore {
    pub mape: f64,
    pub rmse: f64,
    pub bias: f64,
    pub weighted: f64,
}

pub fn score(actual: &[f64], forecast: &[f64], weights: &MetricWeights) -> Option<HoldoutScore> {
    let n = actual.len().min(forecast.len());
    if n == 0 {
        return None;
    }
    let (actual, forecast) = (&actual[..n], &forecast[..n]);
    let scale = actual.iter().map(|a| a.abs()).sum::<f64>() / n as f64;
    if scale <= f64::EPSILON {
        return None;
    }

    let nonzero: Vec<(f64, f64)> = actual
        .iter()
        .zip(forecast)
        .filter(|(a, _)| a.abs() > f64::EPSILON)
        .map(|(a, f)| (*a, *f))
        .collect();
    let mape = if nonzero.is_empty() {
        0.0
    } else {
        nonzero.iter().map(|(a, f)| ((a - f) / a).abs()).sum::<f64>() / nonzero.len() as f64 * 100.0
    };
    let mse = actual
        .iter()
        .zip(forecast)
        .map(|(a, f)| (a - f).powi(2))
        .sum::<f64>()
        / n as f64;
    let rmse = mse.sqrt() / scale * 100.0;
    let bias = (forecast.iter().zip(actual).map(|(f, a)| f - a).sum::<f64>() / n as f64).abs()
        / scale
        * 100.0;

    let total = weights.mape + weights.rmse + weights.bias;
    let weighted = if total > 0.0 {
        (weights.mape * mape + weights.rmse * rmse + weights.bias * bias) / total
    } else {
        mape
    };
    weighted.is_finite().then_some(HoldoutScore {
        mape,
        rmse,
        bias,
        weighted,
    })
}
