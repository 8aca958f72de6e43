//! # Reminder Scheduler
//!
//! Drives the week-before and day-before reminders of one guild's events with a
//! single timer. Every pass re-reads the store, picks the globally nearest due
//! tier, fires it if it is already due, and otherwise sleeps until exactly that
//! moment. The armed timer is a cache of the store and can be thrown away at any
//! point; `reminder_status` in the store is the only record of what was sent.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Lifecycle
//! - `startup()` spawns the scheduling task (no-op if it is already running)
//! - `reschedule()` wakes the task so the next pass sees a store mutation
//! - `shutdown()` cancels the task and its timer and waits for it to exit

use crate::core::ReminderConfig;
use crate::features::events::{Event, EventStore, StatusUpdate};
use crate::features::notify::NotificationSink;
use crate::features::reminders::backoff::{FailureTracker, FailureVerdict, Gate};
use crate::features::reminders::{due_at, Clock, ReminderStatus, ReminderTier};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why the timer is armed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmedReason {
    /// The next tier of an event falls due
    Reminder { event_id: String, tier: ReminderTier },
    /// A previously failed tier may be retried
    Retry {
        event_id: String,
        tier: ReminderTier,
        attempts: u32,
    },
    /// Nothing is due; re-check after the fallback interval
    Fallback,
    /// Listing upcoming events failed, or the store keeps reporting a handled tier as due
    StorageRetry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedTimer {
    pub deadline: DateTime<Utc>,
    pub reason: ArmedReason,
}

/// Result of one `process_reminder` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    /// Delivered and the status advance persisted
    Sent(ReminderTier),
    /// The event vanished or was already advanced; nothing was done
    Stale,
    /// Delivery failed; status unchanged
    SendFailed(ReminderTier),
    /// Delivered, but the status advance could not be written
    PersistFailed(ReminderTier),
    /// Delivered, but another writer advanced the status first
    Duplicate(ReminderTier),
    /// The fresh read of the event failed
    LookupFailed,
}

impl ReminderOutcome {
    pub fn is_sent(self) -> bool {
        matches!(self, ReminderOutcome::Sent(_))
    }
}

/// The next due tier of one event
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    event_id: String,
    event_date: DateTime<Utc>,
    status: ReminderStatus,
    tier: ReminderTier,
    due_at: DateTime<Utc>,
    retry_attempts: Option<u32>,
}

impl Candidate {
    fn key(&self) -> (DateTime<Utc>, DateTime<Utc>, &str) {
        (self.due_at, self.event_date, self.event_id.as_str())
    }

    fn reason(&self) -> ArmedReason {
        match self.retry_attempts {
            Some(attempts) => ArmedReason::Retry {
                event_id: self.event_id.clone(),
                tier: self.tier,
                attempts,
            },
            None => ArmedReason::Reminder {
                event_id: self.event_id.clone(),
                tier: self.tier,
            },
        }
    }
}

/// Globally nearest due tier. Ties go to the earlier event, then the smaller id.
fn select_candidate(
    events: &[Event],
    config: &ReminderConfig,
    failures: &FailureTracker,
) -> Option<Candidate> {
    events
        .iter()
        .filter_map(|event| {
            let tier = event.reminder_status.pending_tier()?;
            let nominal = due_at(event.event_date, event.reminder_status, config)?;
            let (due_at, retry_attempts) = match failures.gate(&event.event_id, tier) {
                Gate::Open => (nominal, None),
                Gate::DeferredUntil { retry_at, attempts } => {
                    (nominal.max(retry_at), Some(attempts))
                }
                Gate::DeadLettered => return None,
            };
            Some(Candidate {
                event_id: event.event_id.clone(),
                event_date: event.event_date,
                status: event.reminder_status,
                tier,
                due_at,
                retry_attempts,
            })
        })
        .min_by(|a, b| a.key().cmp(&b.key()))
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-timer reminder engine for one guild
pub struct ReminderScheduler {
    guild_id: String,
    store: Arc<dyn EventStore>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
    armed: Mutex<Option<ArmedTimer>>,
    failures: Mutex<FailureTracker>,
    task: Mutex<Option<RunningTask>>,
    wake: Notify,
    /// Wider shutdown this scheduler belongs to, if any
    parent: Option<CancellationToken>,
}

impl ReminderScheduler {
    pub fn new(
        guild_id: impl Into<String>,
        store: Arc<dyn EventStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: ReminderConfig,
    ) -> Self {
        let failures = FailureTracker::new(&config);
        Self {
            guild_id: guild_id.into(),
            store,
            sink,
            clock,
            config,
            armed: Mutex::new(None),
            failures: Mutex::new(failures),
            task: Mutex::new(None),
            wake: Notify::new(),
            parent: None,
        }
    }

    /// Tie the scheduler to `parent`: once it is cancelled the task stops and
    /// `startup()` refuses to spawn a new one.
    pub fn within(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// The currently armed timer, if any
    pub fn armed(&self) -> Option<ArmedTimer> {
        lock(&self.armed).clone()
    }

    /// Number of armed timers: always 0 or 1
    pub fn timers_armed(&self) -> usize {
        usize::from(lock(&self.armed).is_some())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the scheduling task. Returns `false` if it was already running or
    /// teardown has begun.
    pub fn startup(self: &Arc<Self>) -> bool {
        let mut task = lock(&self.task);
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                debug!("Reminder scheduler for guild {} already running", self.guild_id);
                return false;
            }
        }

        let cancel = match &self.parent {
            Some(parent) if parent.is_cancelled() => {
                debug!(
                    "Not starting reminder scheduler for guild {}: shutting down",
                    self.guild_id
                );
                return false;
            }
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        let handle = tokio::spawn(self.clone().run(cancel.clone()));
        *task = Some(RunningTask { cancel, handle });
        info!("Reminder scheduler for guild {} started", self.guild_id);
        true
    }

    /// Request a fresh pass after a store mutation. Never runs the pass inline.
    pub fn reschedule(&self) {
        self.disarm();
        self.wake.notify_one();
    }

    /// Stop the loop and drop the armed timer. No reminder fires once this has begun.
    pub async fn shutdown(&self) {
        let running = lock(&self.task).take();
        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                warn!(
                    "Reminder scheduler task for guild {} ended abnormally: {e}",
                    self.guild_id
                );
            }
            info!("Reminder scheduler for guild {} stopped", self.guild_id);
        }
        self.disarm();
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        debug!(
            "Reminder scheduler for guild {} settling for {:?}",
            self.guild_id, self.config.settle_delay
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.disarm();
                return;
            }
            _ = tokio::time::sleep(self.config.settle_delay) => {}
        }

        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);

        loop {
            let Some(armed) = self.schedule_next(&cancel).await else {
                break;
            };
            timer.as_mut().reset(self.instant_for(armed.deadline));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {
                    debug!("Reminder scheduler for guild {}: reschedule requested", self.guild_id);
                }
                _ = &mut timer => {
                    debug!("Reminder scheduler for guild {}: timer fired", self.guild_id);
                }
            }
        }

        self.disarm();
    }

    fn instant_for(&self, deadline: DateTime<Utc>) -> tokio::time::Instant {
        let delay = (deadline - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        tokio::time::Instant::now() + delay
    }

    fn arm(&self, deadline: DateTime<Utc>, reason: ArmedReason) -> ArmedTimer {
        let timer = ArmedTimer { deadline, reason };
        *lock(&self.armed) = Some(timer.clone());
        timer
    }

    fn arm_after(&self, now: DateTime<Utc>, delay: Duration, reason: ArmedReason) -> ArmedTimer {
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(1));
        self.arm(now + delay, reason)
    }

    fn disarm(&self) {
        lock(&self.armed).take();
    }

    /// Fire every tier that is already due, one at a time, then arm the timer for
    /// the next one. Returns `None` if `cancel` was triggered before a fire.
    pub async fn schedule_next(&self, cancel: &CancellationToken) -> Option<ArmedTimer> {
        let mut last_unsent: Option<(String, ReminderTier)> = None;

        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let now = self.clock.now();
            let events = match self
                .store
                .upcoming_events(&self.guild_id, now - self.config.stale_after)
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    warn!(
                        "Failed to list upcoming events for guild {}: {e}; retrying in {:?}",
                        self.guild_id, self.config.storage_retry_interval
                    );
                    return Some(self.arm_after(
                        now,
                        self.config.storage_retry_interval,
                        ArmedReason::StorageRetry,
                    ));
                }
            };

            let candidate = {
                let mut failures = lock(&self.failures);
                let live: HashSet<&str> = events.iter().map(|e| e.event_id.as_str()).collect();
                failures.retain_events(&live);
                select_candidate(&events, &self.config, &failures)
            };

            let Some(candidate) = candidate else {
                debug!(
                    "No reminders pending for guild {}; re-checking in {:?}",
                    self.guild_id, self.config.fallback_interval
                );
                return Some(self.arm_after(
                    now,
                    self.config.fallback_interval,
                    ArmedReason::Fallback,
                ));
            };

            if candidate.due_at > now {
                debug!(
                    "Next reminder for guild {}: {} tier of event {} at {}",
                    self.guild_id, candidate.tier, candidate.event_id, candidate.due_at
                );
                let reason = candidate.reason();
                return Some(self.arm(candidate.due_at, reason));
            }

            // The store still reports the tier we just handled without sending as due
            let key = (candidate.event_id.clone(), candidate.tier);
            if last_unsent.as_ref() == Some(&key) {
                warn!(
                    "Event {} in guild {} still reports its {} reminder as due; pausing for {:?}",
                    candidate.event_id,
                    self.guild_id,
                    candidate.tier,
                    self.config.storage_retry_interval
                );
                return Some(self.arm_after(
                    now,
                    self.config.storage_retry_interval,
                    ArmedReason::StorageRetry,
                ));
            }

            self.disarm();
            let outcome = self
                .process_reminder(&candidate.event_id, candidate.status)
                .await;
            last_unsent = if outcome.is_sent() { None } else { Some(key) };
        }
    }

    /// Send the next tier of one event, re-validating it against the store first.
    /// Never fails: every error path is logged and left for a later pass.
    pub async fn process_reminder(
        &self,
        event_id: &str,
        expected: ReminderStatus,
    ) -> ReminderOutcome {
        let event = match self.store.get_event(&self.guild_id, event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("Event {event_id} was removed before its reminder fired");
                return ReminderOutcome::Stale;
            }
            Err(e) => {
                warn!("Failed to load event {event_id} in guild {}: {e}", self.guild_id);
                if let Some(tier) = expected.pending_tier() {
                    self.record_failure(event_id, tier);
                }
                return ReminderOutcome::LookupFailed;
            }
        };

        if event.reminder_status != expected {
            debug!(
                "Event {event_id} is {} (expected {expected}); skipping",
                event.reminder_status
            );
            return ReminderOutcome::Stale;
        }

        let Some(transition) = event.reminder_status.transition() else {
            return ReminderOutcome::Stale;
        };
        let tier = transition.tier;

        if let Err(e) = self.sink.send_reminder(&event, tier).await {
            warn!(
                "Failed to send {tier} reminder for event {event_id} ({}): {e}",
                event.name
            );
            self.record_failure(event_id, tier);
            return ReminderOutcome::SendFailed(tier);
        }

        match self
            .store
            .update_reminder_status(&self.guild_id, event_id, expected, transition.next)
            .await
        {
            Ok(StatusUpdate::Applied) => {
                lock(&self.failures).clear(event_id, tier);
                info!(
                    "Sent {tier} reminder for event {event_id} ({}) in guild {}",
                    event.name, self.guild_id
                );
                ReminderOutcome::Sent(tier)
            }
            Ok(StatusUpdate::Conflict) => {
                lock(&self.failures).clear(event_id, tier);
                warn!(
                    "Event {event_id} advanced past {expected} while its {tier} reminder was sending; \
                     the reminder was likely delivered twice"
                );
                ReminderOutcome::Duplicate(tier)
            }
            Err(e) => {
                error!(
                    "Sent {tier} reminder for event {event_id} but failed to record it: {e}; \
                     it will be sent again"
                );
                self.record_failure(event_id, tier);
                ReminderOutcome::PersistFailed(tier)
            }
        }
    }

    fn record_failure(&self, event_id: &str, tier: ReminderTier) {
        let verdict = lock(&self.failures).record_failure(event_id, tier, self.clock.now());
        match verdict {
            FailureVerdict::Retry { attempt, retry_at } => {
                debug!("Retrying {tier} reminder for event {event_id} at {retry_at} (attempt {attempt})");
            }
            FailureVerdict::DeadLettered { attempts } => {
                error!(
                    "Giving up on {tier} reminder for event {event_id} in guild {} after {attempts} attempts",
                    self.guild_id
                );
            }
        }
    }
}
