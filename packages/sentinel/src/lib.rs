pub mod config;
pub mod deception;
pub mod emitter;
pub mod error;
pub mod metadata;
pub mod probe;
pub mod runtime_config;
pub mod state;

pub use config::Settings;
pub use error::{Result, SentinelError};
