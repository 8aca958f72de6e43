//! Per-guild scheduler registry
//!
//! One `ReminderScheduler` per guild, created on first use. Concurrent command
//! handlers can reschedule different guilds without contending on a single lock.
//! Once `shutdown_all` has begun no scheduler starts again.

use crate::core::ReminderConfig;
use crate::features::events::EventStore;
use crate::features::notify::NotificationSink;
use crate::features::reminders::{Clock, ReminderScheduler};
use anyhow::Result;
use dashmap::DashMap;
use log::{info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ReminderRegistry {
    store: Arc<dyn EventStore>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
    schedulers: DashMap<String, Arc<ReminderScheduler>>,
    closing: CancellationToken,
}

impl ReminderRegistry {
    pub fn new(
        store: Arc<dyn EventStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            config,
            schedulers: DashMap::new(),
            closing: CancellationToken::new(),
        }
    }

    /// The scheduler for `guild_id`, created (but not started) if missing
    pub fn scheduler(&self, guild_id: &str) -> Arc<ReminderScheduler> {
        self.schedulers
            .entry(guild_id.to_string())
            .or_insert_with(|| {
                Arc::new(ReminderScheduler::new(
                    guild_id,
                    self.store.clone(),
                    self.sink.clone(),
                    self.clock.clone(),
                    self.config.clone(),
                )
                .within(self.closing.clone()))
            })
            .clone()
    }

    pub fn get(&self, guild_id: &str) -> Option<Arc<ReminderScheduler>> {
        self.schedulers.get(guild_id).map(|s| s.clone())
    }

    /// Start the guild's scheduler if it is not running yet (and teardown has not begun)
    pub fn ensure_started(&self, guild_id: &str) -> Arc<ReminderScheduler> {
        let scheduler = self.scheduler(guild_id);
        scheduler.startup();
        scheduler
    }

    /// Ask the guild's scheduler to recompute after a store mutation
    pub fn reschedule(&self, guild_id: &str) {
        self.ensure_started(guild_id).reschedule();
    }

    /// Purge expired events and start a scheduler for every guild with reminders left.
    /// Listing the guilds is retried every storage retry interval until it succeeds
    /// or teardown begins.
    pub async fn recover(&self) -> Result<usize> {
        let cutoff = self.clock.now() - self.config.stale_after;
        match self.store.purge_expired(cutoff).await {
            Ok(0) => {}
            Ok(purged) => info!("Purged {purged} expired events"),
            Err(e) => warn!("Failed to purge expired events: {e}"),
        }

        let guilds = loop {
            match self.store.scopes().await {
                Ok(guilds) => break guilds,
                Err(e) => {
                    warn!(
                        "Failed to list guilds with events: {e}; retrying in {:?}",
                        self.config.storage_retry_interval
                    );
                    tokio::select! {
                        _ = self.closing.cancelled() => {
                            return Err(anyhow::anyhow!("Reminder recovery abandoned: shutting down"));
                        }
                        _ = tokio::time::sleep(self.config.storage_retry_interval) => {}
                    }
                }
            }
        };
        for guild_id in &guilds {
            self.ensure_started(guild_id);
        }
        info!("Reminder schedulers recovered for {} guilds", guilds.len());
        Ok(guilds.len())
    }

    pub fn guilds(&self) -> Vec<String> {
        let mut guilds: Vec<String> = self.schedulers.iter().map(|e| e.key().clone()).collect();
        guilds.sort();
        guilds
    }

    /// Stop a single guild's scheduler and forget it
    pub async fn shutdown_guild(&self, guild_id: &str) {
        if let Some((_, scheduler)) = self.schedulers.remove(guild_id) {
            scheduler.shutdown().await;
        }
    }

    pub async fn shutdown_all(&self) {
        self.closing.cancel();
        let schedulers: Vec<Arc<ReminderScheduler>> =
            self.schedulers.iter().map(|e| e.value().clone()).collect();
        for scheduler in &schedulers {
            scheduler.shutdown().await;
        }
        info!("Stopped {} reminder schedulers", schedulers.len());
    }
}
