//! Error types for the relay services.
//!
//! Only startup-time failures flow through this type: configuration and
//! persona-file loading. Request-path failures carry their own error types
//! in the gateway and channel layers and never surface here.

use thiserror::Error;

/// Result type alias using the relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Startup error for relay services.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
