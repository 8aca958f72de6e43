//! Event records

use crate::features::reminders::ReminderStatus;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled community event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier (UUID v4)
    pub event_id: String,

    /// Guild the event belongs to; every store query is scoped by it
    pub guild_id: String,

    /// Channel where reminders are posted
    pub channel_id: String,

    /// User who created the event
    pub creator_id: String,

    pub name: String,

    pub location: Option<String>,

    pub link: Option<String>,

    /// When the event starts
    pub event_date: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    /// Which reminders have already been delivered
    pub reminder_status: ReminderStatus,
}

/// Input for creating an event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub guild_id: String,
    pub channel_id: String,
    pub creator_id: String,
    pub name: String,
    pub location: Option<String>,
    pub link: Option<String>,
    pub event_date: DateTime<Utc>,
}

impl NewEvent {
    /// Materialize with a fresh id and `Pending` reminder status. Instants are cut to
    /// whole milliseconds, the precision the store keeps.
    pub fn into_event(self, created_at: DateTime<Utc>) -> Event {
        Event {
            event_id: uuid::Uuid::new_v4().to_string(),
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            creator_id: self.creator_id,
            name: self.name,
            location: self.location,
            link: self.link,
            event_date: self.event_date.trunc_subsecs(3),
            created_at: created_at.trunc_subsecs(3),
            reminder_status: ReminderStatus::Pending,
        }
    }
}
