mod optimizer;
mod types;

pub use optimizer::OptimizationEngine;
pub use types::{
    EngineDeps, EngineStatus, ForecastPoint, ForecastResult, LoadSummary, RequestOutcome,
};
