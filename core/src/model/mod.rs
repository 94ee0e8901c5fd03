mod bounds;
mod catalog;

pub use bounds::{check_parameter, check_parameters, MAX_PERIOD};
pub use catalog::{default_catalog, ModelCatalog, ModelConfig};
