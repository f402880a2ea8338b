//! Shared building blocks for the relay services.
//!
//! Provides environment-based configuration, the unified error type, and
//! `tracing` initialization used by every relay binary.

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
