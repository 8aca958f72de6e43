//! Discord delivery of reminders

use crate::core::NotificationError;
use crate::features::events::Event;
use crate::features::notify::{render_reminder, NotificationSink};
use crate::features::reminders::ReminderTier;
use async_trait::async_trait;
use log::debug;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use std::sync::Arc;

const REMINDER_COLOR: u32 = 0x5865F2;

/// Posts reminder embeds to the event's channel
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    fn channel(event: &Event) -> Result<ChannelId, NotificationError> {
        event
            .channel_id
            .parse::<u64>()
            .map(ChannelId)
            .map_err(|_| NotificationError::InvalidChannel(event.channel_id.clone()))
    }
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    async fn send_reminder(
        &self,
        event: &Event,
        tier: ReminderTier,
    ) -> Result<(), NotificationError> {
        let channel = Self::channel(event)?;
        let message = render_reminder(event, tier);

        channel
            .send_message(&self.http, |m| {
                m.embed(|e| {
                    e.title(&message.title)
                        .description(&message.description)
                        .color(REMINDER_COLOR);
                    for (name, value) in &message.fields {
                        e.field(name, value, false);
                    }
                    e
                })
            })
            .await?;

        debug!(
            "Posted {tier} reminder for event {} to channel {}",
            event.event_id, channel.0
        );
        Ok(())
    }
}
