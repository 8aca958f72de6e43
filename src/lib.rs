// Core layer - configuration and shared error types
pub mod core;

// Features layer - events, notification and the reminder engine
pub mod features;

// Infrastructure - SQLite event store
pub mod database;

pub use core::Config;

pub use features::{
    // Events
    Event, EventLifecycle, EventStore, NewEvent, StatusUpdate,
    // Notification
    DiscordNotifier, NotificationSink,
    // Reminders
    ReminderOutcome, ReminderRegistry, ReminderScheduler, ReminderStatus, ReminderTier,
    SystemClock,
};
