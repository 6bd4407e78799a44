//! Journaling service: accounts, bearer tokens, rate limiting and
//! model-backed analysis of journal entries over a small HTTP API.

pub mod ai_services;
pub mod api;
pub mod config;
pub mod identity;
pub mod storage;

pub use api::{build_router, serve, AppState};
pub use config::NodeConfig;
