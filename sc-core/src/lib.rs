//! Storechat Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other storechat crates:
//! - Application configuration (server origin, socket tuning, logging)
//! - Global error type covering all error categories
//! - Structured logging with tracing
//! - Platform directory lookup
//! - Common constants

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod platform;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{ScError, ScResult};
pub use logging::init_logging;
pub use platform::Platform;
