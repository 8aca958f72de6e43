//! # Core Module
//!
//! Configuration and the error types shared across the reminder engine and its adapters.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Typed errors for the store and notification seams
//! - 1.0.0: Initial creation with config module

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{parse_duration, Config, ReminderConfig, MAX_DURATION_SECS};
pub use error::{ConfigError, NotificationError, StoreError};
