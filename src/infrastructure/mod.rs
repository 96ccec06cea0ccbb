pub mod config;
pub mod error;
pub mod kv_store;
pub mod logging;
pub mod storage_events;
