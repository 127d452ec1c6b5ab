// SPDX-License-Identifier: MIT
//
// Under Construction Gate: Maintenance-Mode Front for Websites
// Copyright (c) 2025 Under Construction Gate Contributors

//! Error types for the gate
//!
//! Provides a unified error taxonomy using `thiserror` for ergonomic error handling.
//! The gate evaluator itself never fails; these errors come from the collaborators
//! around it (stores, purgers, configuration, sessions).

pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for gate operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings store could not be read or written
    #[error("Settings store error: {0}")]
    Store(String),

    /// Network communication failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote endpoint answered with a non-success status
    #[error("Upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Session token or signing key rejected
    #[error("Session error: {0}")]
    Session(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if error is transient and retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout => true,
            Error::UpstreamStatus(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

// Conversions for common error types
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<::config::ConfigError> for Error {
    fn from(e: ::config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
