mod store;

pub use store::{CacheStore, SharedCache};
