mod exhaustive;
mod score;

pub use exhaustive::ExhaustiveGridSearch;
pub use score::{score, HoldoutScore};
