//! # Notify Feature
//!
//! Delivery seam for reminders. Implementations report failure as a value so
//! the scheduler can decide what to retry.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod discord;

pub use discord::DiscordNotifier;

use crate::core::NotificationError;
use crate::features::events::Event;
use crate::features::reminders::ReminderTier;
use async_trait::async_trait;

/// Discord embed title limit
const TITLE_LIMIT: usize = 256;
/// Discord embed field value limit
const FIELD_LIMIT: usize = 1024;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_reminder(&self, event: &Event, tier: ReminderTier)
        -> Result<(), NotificationError>;
}

/// Platform-neutral reminder content
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderMessage {
    pub title: String,
    pub description: String,
    pub fields: Vec<(String, String)>,
}

pub fn render_reminder(event: &Event, tier: ReminderTier) -> ReminderMessage {
    let heading = match tier {
        ReminderTier::Week => "Event in one week",
        ReminderTier::Day => "Event tomorrow",
    };
    let timestamp = event.event_date.timestamp();

    let mut fields = vec![(
        "When".to_string(),
        format!("<t:{timestamp}:F> (<t:{timestamp}:R>)"),
    )];
    if let Some(location) = event.location.as_deref().filter(|l| !l.trim().is_empty()) {
        fields.push(("Where".to_string(), truncate(location, FIELD_LIMIT)));
    }
    if let Some(link) = event.link.as_deref().filter(|l| !l.trim().is_empty()) {
        fields.push(("Link".to_string(), truncate(link, FIELD_LIMIT)));
    }

    ReminderMessage {
        title: truncate(&format!("{heading}: {}", event.name), TITLE_LIMIT),
        description: format!("Organized by <@{}>", event.creator_id),
        fields,
    }
}

/// Truncate to `limit` bytes on a char boundary, adding an ellipsis when cut
fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit - 3;
    while !text.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
