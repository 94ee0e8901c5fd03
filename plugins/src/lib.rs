pub mod ai;
pub mod factory;
pub mod forecast;
pub mod grid;
pub mod storage;
