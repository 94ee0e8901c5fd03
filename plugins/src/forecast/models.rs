use tuner_core::api::{ForecastModel, ParamMap, MAX_PERIOD};

fn param(params: &ParamMap, key: &str, default: f64) -> f64 {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Smoothing factors live in (0, 1].
fn factor(params: &ParamMap, key: &str, default: f64) -> f64 {
    param(params, key, default).clamp(0.01, 1.0)
}

/// Window and season lengths, bounded so index arithmetic cannot overflow.
fn period(params: &ParamMap, key: &str, default: usize) -> usize {
    param(params, key, default as f64)
        .round()
        .clamp(1.0, MAX_PERIOD as f64) as usize
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub struct MovingAverage;

impl ForecastModel for MovingAverage {
    fn id(&self) -> &str {
        "moving_average"
    }

    fn min_points(&self, params: &ParamMap) -> usize {
        period(params, "window", 3)
    }

    fn compute(&self, series: &[f64], params: &ParamMap, horizon: usize) -> Vec<f64> {
        if series.is_empty() {
            return Vec::new();
        }
        let window = period(params, "window", 3).min(series.len());
        let level = mean(&series[series.len() - window..]);
        vec![level; horizon]
    }
}

pub struct SimpleExponentialSmoothing;

impl ForecastModel for SimpleExponentialSmoothing {
    fn id(&self) -> &str {
        "simple_exponential_smoothing"
    }

    fn min_points(&self, _params: &ParamMap) -> usize {
        2
    }

    fn compute(&self, series: &[f64], params: &ParamMap, horizon: usize) -> Vec<f64> {
        let Some((&first, rest)) = series.split_first() else {
            return Vec::new();
        };
        let alpha = factor(params, "alpha", 0.3);
        let level = rest
            .iter()
            .fold(first, |level, &x| alpha * x + (1.0 - alpha) * level);
        vec![level; horizon]
    }
}

/// Additive Holt-Winters. With less than two full seasons of history it
/// degrades to Holt's linear method.
pub struct HoltWinters;

impl HoltWinters {
    fn holt_linear(series: &[f64], alpha: f64, beta: f64, horizon: usize) -> Vec<f64> {
        let mut level = series[0];
        let mut trend = if series.len() > 1 {
            series[1] - series[0]
        } else {
            0.0
        };
        for &x in &series[1..] {
            let prev = level;
            level = alpha * x + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev) + (1.0 - beta) * trend;
        }
        (1..=horizon).map(|h| level + h as f64 * trend).collect()
    }
}

impl ForecastModel for HoltWinters {
    fn id(&self) -> &str {
        "holt_winters"
    }

    fn min_points(&self, _params: &ParamMap) -> usize {
        2
    }

    fn compute(&self, series: &[f64], params: &ParamMap, horizon: usize) -> Vec<f64> {
        if series.is_empty() {
            return Vec::new();
        }
        let alpha = factor(params, "alpha", 0.3);
        let beta = factor(params, "beta", 0.1);
        let gamma = factor(params, "gamma", 0.1);
        let m = period(params, "season_length", 12);
        let n = series.len();
        if m < 2 || n / 2 < m {
            return Self::holt_linear(series, alpha, beta, horizon);
        }

        let mut level = mean(&series[..m]);
        let mut trend = (mean(&series[m..2 * m]) - level) / m as f64;
        let mut seasonal: Vec<f64> = series[..m].iter().map(|x| x - level).collect();

        for (t, &x) in series.iter().enumerate().skip(m) {
            let s = seasonal[t - m];
            let prev = level;
            level = alpha * (x - s) + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev) + (1.0 - beta) * trend;
            seasonal.push(gamma * (x - level) + (1.0 - gamma) * s);
        }

        (1..=horizon)
            .map(|h| level + h as f64 * trend + seasonal[n - m + (h - 1) % m])
            .collect()
    }
}

/// Ordinary least squares on the point index.
pub struct LinearTrend;

impl ForecastModel for LinearTrend {
    fn id(&self) -> &str {
        "linear_trend"
    }

    fn min_points(&self, _params: &ParamMap) -> usize {
        2
    }

    fn compute(&self, series: &[f64], _params: &ParamMap, horizon: usize) -> Vec<f64> {
        let n = series.len();
        if n == 0 {
            return Vec::new();
        }
        let x_mean = (n as f64 - 1.0) / 2.0;
        let y_mean = mean(series);
        let (mut num, mut den) = (0.0, 0.0);
        for (i, y) in series.iter().enumerate() {
            let dx = i as f64 - x_mean;
            num += dx * (y - y_mean);
            den += dx * dx;
        }
        let slope = if den > 0.0 { num / den } else { 0.0 };
        let intercept = y_mean - slope * x_mean;
        (0..horizon)
            .map(|h| intercept + slope * (n + h) as f64)
            .collect()
    }
}

pub struct SeasonalNaive;

impl ForecastModel for SeasonalNaive {
    fn id(&self) -> &str {
        "seasonal_naive"
    }

    fn min_points(&self, params: &ParamMap) -> usize {
        period(params, "season_length", 12)
    }

    fn compute(&self, series: &[f64], params: &ParamMap, horizon: usize) -> Vec<f64> {
        let n = series.len();
        if n == 0 {
            return Vec::new();
        }
        let m = period(params, "season_length", 12);
        if n < m {
            return vec![series[n - 1]; horizon];
        }
        (0..horizon).map(|h| series[n - m + h % m]).collect()
    }
}
