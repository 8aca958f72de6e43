//! # Features
//!
//! - `events`: event records, the store seam and the create/remove/clear flows
//! - `notify`: reminder delivery
//! - `reminders`: the tiered reminder scheduler

pub mod events;
pub mod notify;
pub mod reminders;

pub use events::{Event, EventLifecycle, EventStore, NewEvent, StatusUpdate};
pub use notify::{DiscordNotifier, NotificationSink};
pub use reminders::{
    ReminderOutcome, ReminderRegistry, ReminderScheduler, ReminderStatus, ReminderTier,
    SystemClock,
};

/// Bot version from Cargo.toml
pub fn get_bot_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
