pub mod api;
pub mod cache;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod events_out;
pub mod fingerprint;
pub mod model;
pub mod queue;
pub mod resolver;
pub mod search;
pub mod storage;
pub mod sync;
pub mod types;
