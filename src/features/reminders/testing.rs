//! Test doubles shared by the reminder, registry and lifecycle tests

use crate::core::{NotificationError, ReminderConfig, StoreError};
use crate::database::Database;
use crate::features::events::{Event, EventStore, NewEvent, StatusUpdate};
use crate::features::notify::NotificationSink;
use crate::features::reminders::{Clock, ReminderScheduler, ReminderStatus, ReminderTier};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Wall clock that follows tokio's (possibly paused) clock, in whole milliseconds
pub struct TokioClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn at(origin: DateTime<Utc>) -> Self {
        Self {
            origin: origin.trunc_subsecs(3),
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.started;
        (self.origin + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero()))
            .trunc_subsecs(3)
    }
}

/// Records every delivery attempt; can be told to fail
pub struct RecordingSink {
    clock: Arc<TokioClock>,
    sent: Mutex<Vec<(String, ReminderTier, DateTime<Utc>)>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    failing_events: Mutex<HashSet<String>>,
}

impl RecordingSink {
    pub fn new(clock: Arc<TokioClock>) -> Self {
        Self {
            clock,
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            failing_events: Mutex::new(HashSet::new()),
        }
    }

    /// Successful deliveries, in order
    pub fn sent(&self) -> Vec<(String, ReminderTier)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(id, tier, _)| (id.clone(), *tier))
            .collect()
    }

    pub fn sent_at(&self) -> Vec<DateTime<Utc>> {
        self.sent.lock().unwrap().iter().map(|(_, _, at)| *at).collect()
    }

    /// Every call, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn fail_event(&self, event_id: &str) {
        self.failing_events.lock().unwrap().insert(event_id.to_string());
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_reminder(
        &self,
        event: &Event,
        tier: ReminderTier,
    ) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted || self.failing_events.lock().unwrap().contains(&event.event_id) {
            return Err(NotificationError::Rejected("scripted failure".to_string()));
        }

        self.sent
            .lock()
            .unwrap()
            .push((event.event_id.clone(), tier, self.clock.now()));
        Ok(())
    }
}

/// Wraps a real store and injects faults
pub struct FlakyStore {
    inner: Database,
    fail_listing: AtomicBool,
    fail_updates: AtomicBool,
    failing_scopes: AtomicUsize,
    advance_before_update: Mutex<HashMap<String, ReminderStatus>>,
    stale_reads: Mutex<HashMap<String, ReminderStatus>>,
}

impl FlakyStore {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            fail_listing: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            failing_scopes: AtomicUsize::new(0),
            advance_before_update: Mutex::new(HashMap::new()),
            stale_reads: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` guild listings
    pub fn fail_scopes(&self, count: usize) {
        self.failing_scopes.store(count, Ordering::SeqCst);
    }

    /// Simulate another writer moving the event to `status` just before our next update
    pub fn advance_before_update(&self, event_id: &str, status: ReminderStatus) {
        self.advance_before_update
            .lock()
            .unwrap()
            .insert(event_id.to_string(), status);
    }

    /// Make fresh reads of the event report `status` while listings keep the stored one
    pub fn stale_reads_as(&self, event_id: &str, status: ReminderStatus) {
        self.stale_reads
            .lock()
            .unwrap()
            .insert(event_id.to_string(), status);
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn upcoming_events(
        &self,
        guild_id: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted listing failure".to_string()));
        }
        self.inner.upcoming_events(guild_id, not_before).await
    }

    async fn get_event(&self, guild_id: &str, event_id: &str) -> Result<Option<Event>, StoreError> {
        let override_status = self.stale_reads.lock().unwrap().get(event_id).copied();
        let event = self.inner.get_event(guild_id, event_id).await?;
        Ok(event.map(|mut e| {
            if let Some(status) = override_status {
                e.reminder_status = status;
            }
            e
        }))
    }

    async fn update_reminder_status(
        &self,
        guild_id: &str,
        event_id: &str,
        expected: ReminderStatus,
        next: ReminderStatus,
    ) -> Result<StatusUpdate, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted update failure".to_string()));
        }
        let racing = self.advance_before_update.lock().unwrap().remove(event_id);
        if let Some(status) = racing {
            self.inner
                .update_reminder_status(guild_id, event_id, expected, status)
                .await?;
        }
        self.inner
            .update_reminder_status(guild_id, event_id, expected, next)
            .await
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        self.inner.insert_event(event).await
    }

    async fn delete_event(&self, guild_id: &str, event_id: &str) -> Result<bool, StoreError> {
        self.inner.delete_event(guild_id, event_id).await
    }

    async fn clear_events(&self, guild_id: &str) -> Result<usize, StoreError> {
        self.inner.clear_events(guild_id).await
    }

    async fn list_events(&self, guild_id: &str) -> Result<Vec<Event>, StoreError> {
        self.inner.list_events(guild_id).await
    }

    async fn scopes(&self) -> Result<Vec<String>, StoreError> {
        let failing = self
            .failing_scopes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("scripted scopes failure".to_string()));
        }
        self.inner.scopes().await
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.purge_expired(before).await
    }
}

pub struct Fixture {
    pub scheduler: Arc<ReminderScheduler>,
    pub db: Database,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<TokioClock>,
    pub config: ReminderConfig,
}

/// Scheduler for guild `"guild"` over an in-memory database
pub async fn fixture() -> Fixture {
    let config = ReminderConfig::default();
    let db = Database::new(":memory:").await.unwrap();
    let clock = Arc::new(TokioClock::at(Utc::now()));
    let sink = Arc::new(RecordingSink::new(clock.clone()));
    let scheduler = Arc::new(ReminderScheduler::new(
        "guild",
        Arc::new(db.clone()),
        sink.clone(),
        clock.clone(),
        config.clone(),
    ));
    Fixture {
        scheduler,
        db,
        sink,
        clock,
        config,
    }
}

pub fn new_event_at(guild_id: &str, event_date: DateTime<Utc>) -> NewEvent {
    NewEvent {
        guild_id: guild_id.to_string(),
        channel_id: "1000".to_string(),
        creator_id: "2000".to_string(),
        name: "Neighbourhood meetup".to_string(),
        location: None,
        link: None,
        event_date,
    }
}

/// A pending event in guild `"guild"` starting at `event_date`
pub fn event_at(event_date: DateTime<Utc>) -> Event {
    new_event_at("guild", event_date).into_event(event_date - chrono::Duration::days(30))
}

/// A pending event in guild `"guild"` starting `starts_in` from the clock's now
pub fn pending_event(clock: &TokioClock, starts_in: chrono::Duration) -> Event {
    event_at(clock.now() + starts_in)
}
