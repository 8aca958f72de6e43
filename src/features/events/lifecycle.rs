//! Event create/remove/clear flows
//!
//! Every mutation is written to the store first, then the guild's scheduler is
//! asked to recompute. Command handlers call these; they never touch the
//! scheduler directly.

use crate::features::events::{Event, EventStore, NewEvent};
use crate::features::reminders::{Clock, ReminderRegistry};
use anyhow::Result;
use log::info;
use std::sync::Arc;

/// Longest accepted event name
const MAX_NAME_LENGTH: usize = 100;

pub struct EventLifecycle {
    store: Arc<dyn EventStore>,
    reminders: Arc<ReminderRegistry>,
    clock: Arc<dyn Clock>,
}

impl EventLifecycle {
    pub fn new(
        store: Arc<dyn EventStore>,
        reminders: Arc<ReminderRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            reminders,
            clock,
        }
    }

    pub async fn create_event(&self, new_event: NewEvent) -> Result<Event> {
        let name = new_event.name.trim();
        if name.is_empty() {
            return Err(anyhow::anyhow!("Event name cannot be empty"));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(anyhow::anyhow!(
                "Event name too long (max {MAX_NAME_LENGTH} chars)"
            ));
        }

        let now = self.clock.now();
        if new_event.event_date <= now {
            return Err(anyhow::anyhow!(
                "Event date {} is in the past",
                new_event.event_date.format("%Y-%m-%d %H:%M UTC")
            ));
        }

        let event = NewEvent {
            name: name.to_string(),
            ..new_event
        }
        .into_event(now);
        self.store.insert_event(&event).await?;

        info!(
            "Created event {} ({}) in guild {} for {}",
            event.event_id, event.name, event.guild_id, event.event_date
        );

        self.reminders.reschedule(&event.guild_id);
        Ok(event)
    }

    /// Returns whether the event existed
    pub async fn remove_event(&self, guild_id: &str, event_id: &str) -> Result<bool> {
        let removed = self.store.delete_event(guild_id, event_id).await?;
        if removed {
            info!("Removed event {event_id} from guild {guild_id}");
            self.reminders.reschedule(guild_id);
        }
        Ok(removed)
    }

    /// Remove every event of a guild, returning how many were deleted
    pub async fn clear_events(&self, guild_id: &str) -> Result<usize> {
        let cleared = self.store.clear_events(guild_id).await?;
        info!("Cleared {cleared} events from guild {guild_id}");
        if let Some(scheduler) = self.reminders.get(guild_id) {
            scheduler.reschedule();
        }
        Ok(cleared)
    }

    pub async fn list_events(&self, guild_id: &str) -> Result<Vec<Event>> {
        Ok(self.store.list_events(guild_id).await?)
    }
}
