pub mod api;
pub mod config;
pub mod event;
pub mod ingest;
pub mod maintenance;
pub mod query;
pub mod server;
pub mod storage;
