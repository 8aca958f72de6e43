use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::gateway::Ready;
use serenity::model::guild::{Guild, UnavailableGuild};
use serenity::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use herald::core::Config;
use herald::database::Database;
use herald::features::get_bot_version;
use herald::{DiscordNotifier, EventLifecycle, ReminderRegistry, SystemClock};

struct Handler {
    reminders: Arc<ReminderRegistry>,
    lifecycle: Arc<EventLifecycle>,
    /// Tracks whether this is the first Ready event (vs reconnect)
    first_ready: AtomicBool,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "{} is connected to {} guilds",
            ready.user.name,
            ready.guilds.len()
        );

        if !self.first_ready.swap(false, Ordering::SeqCst) {
            info!("Gateway reconnected; reminder schedulers already running");
            return;
        }

        // Recovery retries until storage answers; keep the gateway handler free meanwhile
        let reminders = self.reminders.clone();
        tokio::spawn(async move {
            match reminders.recover().await {
                Ok(count) => info!("⏰ Reminder engine online ({count} guilds with pending reminders)"),
                Err(e) => error!("Failed to recover reminder schedulers: {e}"),
            }
        });
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // An outage also emits GuildDelete; only a removal clears events
        if incomplete.unavailable {
            warn!("Guild {} became unavailable", incomplete.id);
            return;
        }

        let guild_id = incomplete.id.to_string();
        match self.lifecycle.clear_events(&guild_id).await {
            Ok(cleared) => info!("Removed from guild {guild_id}; cleared {cleared} events"),
            Err(e) => error!("Failed to clear events for departed guild {guild_id}: {e}"),
        }
        self.reminders.shutdown_guild(&guild_id).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Herald event reminder bot v{}...", get_bot_version());

    let database = Arc::new(Database::new(&config.database_path).await?);
    let clock = Arc::new(SystemClock);
    let http = Arc::new(Http::new(&config.discord_token));

    let reminders = Arc::new(ReminderRegistry::new(
        database.clone(),
        Arc::new(DiscordNotifier::new(http)),
        clock.clone(),
        config.reminders.clone(),
    ));
    let lifecycle = Arc::new(EventLifecycle::new(database, reminders.clone(), clock));

    let handler = Handler {
        reminders: reminders.clone(),
        lifecycle,
        first_ready: AtomicBool::new(true),
    };

    let intents = GatewayIntents::GUILDS;
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await?;

    // Stop the schedulers before the gateway so no reminder fires during teardown
    let shard_manager = client.shard_manager.clone();
    let shutdown_reminders = reminders.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        info!("Shutdown signal received");
        shutdown_reminders.shutdown_all().await;
        shard_manager.lock().await.shutdown_all().await;
    });

    info!("Connecting to Discord gateway...");

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        reminders.shutdown_all().await;
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    reminders.shutdown_all().await;
    info!("Herald stopped");
    Ok(())
}
