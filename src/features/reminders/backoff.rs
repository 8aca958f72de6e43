//! Per event-tier failure tracking
//!
//! Failed deliveries defer the event-tier with exponential backoff; after
//! `max_attempts` consecutive failures it is dead-lettered and no longer
//! produces a candidate. Records live only in memory, so a restart grants
//! every dead-lettered reminder a fresh set of attempts.

use crate::core::ReminderConfig;
use crate::features::reminders::ReminderTier;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// No recorded failures
    Open,
    /// Retry no earlier than this instant
    DeferredUntil { retry_at: DateTime<Utc>, attempts: u32 },
    /// Gave up after too many failures
    DeadLettered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    Retry { attempt: u32, retry_at: DateTime<Utc> },
    DeadLettered { attempts: u32 },
}

#[derive(Debug, Clone)]
struct FailureRecord {
    attempts: u32,
    retry_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct FailureTracker {
    records: HashMap<(String, ReminderTier), FailureRecord>,
    retry_base: Duration,
    retry_max: Duration,
    max_attempts: u32,
}

impl FailureTracker {
    pub fn new(config: &ReminderConfig) -> Self {
        Self {
            records: HashMap::new(),
            retry_base: config.retry_base,
            retry_max: config.retry_max,
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before attempt number `attempts + 1`
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.retry_base
            .saturating_mul(1u32 << exponent)
            .min(self.retry_max)
    }

    pub fn record_failure(
        &mut self,
        event_id: &str,
        tier: ReminderTier,
        now: DateTime<Utc>,
    ) -> FailureVerdict {
        let attempts = self
            .records
            .get(&(event_id.to_string(), tier))
            .map(|r| r.attempts)
            .unwrap_or(0)
            + 1;

        let delay = chrono::Duration::from_std(self.backoff(attempts))
            .unwrap_or_else(|_| chrono::Duration::weeks(52));
        let retry_at = now + delay;
        self.records.insert(
            (event_id.to_string(), tier),
            FailureRecord { attempts, retry_at },
        );

        if attempts >= self.max_attempts {
            FailureVerdict::DeadLettered { attempts }
        } else {
            FailureVerdict::Retry {
                attempt: attempts,
                retry_at,
            }
        }
    }

    pub fn clear(&mut self, event_id: &str, tier: ReminderTier) {
        self.records.remove(&(event_id.to_string(), tier));
    }

    pub fn gate(&self, event_id: &str, tier: ReminderTier) -> Gate {
        match self.records.get(&(event_id.to_string(), tier)) {
            None => Gate::Open,
            Some(record) if record.attempts >= self.max_attempts => Gate::DeadLettered,
            Some(record) => Gate::DeferredUntil {
                retry_at: record.retry_at,
                attempts: record.attempts,
            },
        }
    }

    /// Forget records of events that are no longer upcoming (deleted, cleared, expired)
    pub fn retain_events(&mut self, live: &HashSet<&str>) {
        self.records
            .retain(|(event_id, _), _| live.contains(event_id.as_str()));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
