//! # Reminder State Machine
//!
//! Per-event reminder progression and due-time math. Pure: no clocks, no I/O.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use crate::core::ReminderConfig;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reminder kinds, in the order they are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderTier {
    Week,
    Day,
}

impl ReminderTier {
    pub const ALL: [ReminderTier; 2] = [ReminderTier::Week, ReminderTier::Day];

    /// How long before the event this tier is due
    pub fn offset(self, config: &ReminderConfig) -> chrono::Duration {
        match self {
            ReminderTier::Week => config.week_offset,
            ReminderTier::Day => config.day_offset,
        }
    }

    /// Instant at which this tier is due for an event starting at `event_date`
    pub fn due_at(self, event_date: DateTime<Utc>, config: &ReminderConfig) -> DateTime<Utc> {
        event_date
            .checked_sub_signed(self.offset(config))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl std::fmt::Display for ReminderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderTier::Week => write!(f, "week"),
            ReminderTier::Day => write!(f, "day"),
        }
    }
}

/// Persisted reminder progress of one event. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    WeekSent,
    DaySent,
}

/// The tier to send next and the status recorded once it is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub tier: ReminderTier,
    pub next: ReminderStatus,
}

impl ReminderStatus {
    /// `None` once every tier has been sent
    pub fn transition(self) -> Option<Transition> {
        match self {
            ReminderStatus::Pending => Some(Transition {
                tier: ReminderTier::Week,
                next: ReminderStatus::WeekSent,
            }),
            ReminderStatus::WeekSent => Some(Transition {
                tier: ReminderTier::Day,
                next: ReminderStatus::DaySent,
            }),
            ReminderStatus::DaySent => None,
        }
    }

    pub fn pending_tier(self) -> Option<ReminderTier> {
        self.transition().map(|t| t.tier)
    }

    /// Storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::WeekSent => "week_sent",
            ReminderStatus::DaySent => "day_sent",
        }
    }
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReminderStatus::Pending),
            "week_sent" => Ok(ReminderStatus::WeekSent),
            "day_sent" => Ok(ReminderStatus::DaySent),
            _ => Err(anyhow::anyhow!("Invalid reminder status: {}", s)),
        }
    }
}

/// Due time of the next unsent tier, or `None` when the event is fully reminded
pub fn due_at(
    event_date: DateTime<Utc>,
    status: ReminderStatus,
    config: &ReminderConfig,
) -> Option<DateTime<Utc>> {
    status
        .pending_tier()
        .map(|tier| tier.due_at(event_date, config))
}
