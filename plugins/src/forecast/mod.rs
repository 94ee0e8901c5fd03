//! Pure forecasting functions for the five catalog models.

mod models;

use std::sync::Arc;

use tuner_core::api::ForecastModel;

pub use models::{HoltWinters, LinearTrend, MovingAverage, SeasonalNaive, SimpleExponentialSmoothing};

pub fn builtin_models() -> Vec<Arc<dyn ForecastModel>> {
    vec![
        Arc::new(MovingAverage),
        Arc::new(SimpleExponentialSmoothing),
        Arc::new(HoltWinters),
        Arc::new(LinearTrend),
        Arc::new(SeasonalNaive),
    ]
}

pub fn find<'a>(models: &'a [Arc<dyn ForecastModel>], id: &str) -> Option<&'a Arc<dyn ForecastModel>> {
    models.iter().find(|m| m.id() == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuner_core::api::default_catalog;

    #[test]
    fn every_catalog_model_has_a_function() {
        let models = builtin_models();
        for m in default_catalog().models() {
            assert!(find(&models, m.id.as_str()).is_some(), "{}", m.id);
        }
    }
}
