//! Persistence seam for events
//!
//! The store's `reminder_status` column is the only state the reminder engine
//! trusts; schedulers may be torn down and rebuilt from it at any time.

use crate::core::StoreError;
use crate::features::events::Event;
use crate::features::reminders::ReminderStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of a conditional status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The row held the expected status and now holds the new one
    Applied,
    /// The row was missing or held a different status; nothing was written
    Conflict,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events of `guild_id` that still have a reminder to send and start at or after `not_before`.
    /// Order is unspecified.
    async fn upcoming_events(
        &self,
        guild_id: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError>;

    async fn get_event(&self, guild_id: &str, event_id: &str) -> Result<Option<Event>, StoreError>;

    /// Advance the status only if it still equals `expected`
    async fn update_reminder_status(
        &self,
        guild_id: &str,
        event_id: &str,
        expected: ReminderStatus,
        next: ReminderStatus,
    ) -> Result<StatusUpdate, StoreError>;

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Returns whether a row was deleted
    async fn delete_event(&self, guild_id: &str, event_id: &str) -> Result<bool, StoreError>;

    /// Delete every event of a guild, returning how many were removed
    async fn clear_events(&self, guild_id: &str) -> Result<usize, StoreError>;

    /// All events of a guild, soonest first
    async fn list_events(&self, guild_id: &str) -> Result<Vec<Event>, StoreError>;

    /// Guilds that still have at least one reminder to send
    async fn scopes(&self) -> Result<Vec<String>, StoreError>;

    /// Delete events that started before `before`, returning how many were removed
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<usize, StoreError>;
}
