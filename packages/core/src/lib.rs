//! Core process: ingest pipeline, correlation engine, LLM enrichment,
//! decision engine, agent registry, config sync and the HTTP surface that
//! fronts them.

pub mod config;
pub mod config_sync;
pub mod correlation;
pub mod decision;
pub mod error;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod registry;
pub mod threat_intel;

pub use config::Settings;
pub use error::{CoreError, Result};
