pub mod api;
pub mod bars;
pub mod calendar;
pub mod concurrent_fetcher;
pub mod context;
pub mod data_collector;
pub mod models;
pub mod roster;
pub mod storage;
