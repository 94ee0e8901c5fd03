mod load;
mod types;

pub use load::{load_default, load_from_path, CONFIG_FILE};
pub use types::*;
