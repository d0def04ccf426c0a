pub mod cache;
pub mod config;
pub mod deploy;
pub mod error;
pub mod fingerprint;
pub mod log_sanitize;
pub mod logging;
pub mod orchestrator;
pub mod recipe;
pub mod registry;
pub mod remote;

pub use error::{Error, Result};
