//! Configuration for the callflow voice loop
//!
//! Layered loading (defaults file, environment file, `CALLFLOW__` prefixed
//! environment variables) with environment-aware validation.

pub mod settings;

pub use settings::{
    load_settings, LlmProvider, LlmSettings, RuntimeEnvironment, SessionSettings, Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
