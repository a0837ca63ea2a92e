// src/core/errors.rs

//! Defines the primary error type for the crate.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all fallible synchronous operations exposed
/// by this crate. Background workers never propagate errors through this type:
/// per the error-handling design, transport and parse failures are handled
/// locally inside each worker loop (logged and retried or dropped) and only
/// authentication failures escalate, by transitioning client status rather
/// than by returning an error anywhere.
#[derive(Error, Debug, Clone)]
pub enum FlagsError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("failed to parse payload: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("client not specified")]
    ClientNotSpecified,

    #[error("flag key not specified")]
    FlagNotSpecified,

    #[error("client is closed")]
    Closed,

    #[error("no client registered for environment '{0}'")]
    UnknownEnvironment(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for FlagsError {
    fn from(e: std::io::Error) -> Self {
        FlagsError::Io(Arc::new(e))
    }
}

impl From<reqwest::Error> for FlagsError {
    fn from(e: reqwest::Error) -> Self {
        FlagsError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for FlagsError {
    fn from(e: serde_json::Error) -> Self {
        FlagsError::Parse(e.to_string())
    }
}

impl From<config::ConfigError> for FlagsError {
    fn from(e: config::ConfigError) -> Self {
        FlagsError::InvalidConfig(e.to_string())
    }
}
