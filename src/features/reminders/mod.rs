//! # Reminders Feature
//!
//! Week-before and day-before event reminders driven by a single recomputed timer per guild.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Tiered event reminders with per-guild schedulers, conditional status writes and delivery backoff
//! - 1.0.0: Initial release

pub mod backoff;
pub mod clock;
pub mod registry;
pub mod scheduler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, SystemClock};
pub use registry::ReminderRegistry;
pub use scheduler::{ArmedReason, ArmedTimer, ReminderOutcome, ReminderScheduler};
pub use state::{due_at, ReminderStatus, ReminderTier, Transition};
