//! # Database
//!
//! SQLite persistence for events. Instants are stored as Unix epoch milliseconds,
//! reminder status as its lowercase name.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use crate::core::StoreError;
use crate::features::events::{Event, EventStore, StatusUpdate};
use crate::features::reminders::ReminderStatus;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info};
use sqlite::{Connection, State, Statement};
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        event_id TEXT PRIMARY KEY,
        guild_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        creator_id TEXT NOT NULL,
        name TEXT NOT NULL,
        location TEXT,
        link TEXT,
        event_date INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        reminder_status TEXT NOT NULL DEFAULT 'pending'
    );
    CREATE INDEX IF NOT EXISTS idx_events_upcoming
        ON events (guild_id, reminder_status, event_date);
";

const EVENT_COLUMNS: &str = "event_id, guild_id, channel_id, creator_id, name, location, link, \
                             event_date, created_at, reminder_status";

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path`. Use `":memory:"` for a throwaway store.
    pub async fn new(path: &str) -> Result<Self> {
        let connection = sqlite::open(path)?;
        connection.execute(SCHEMA)?;
        info!("Opened event database at {path}");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))?;
        f(&connection)
    }
}

fn millis_to_datetime(millis: i64, column: &str) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("{column} out of range: {millis}")))
}

fn read_event(statement: &Statement<'_>) -> Result<Event, StoreError> {
    let status: String = statement.read("reminder_status")?;
    let reminder_status = status
        .parse::<ReminderStatus>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(Event {
        event_id: statement.read("event_id")?,
        guild_id: statement.read("guild_id")?,
        channel_id: statement.read("channel_id")?,
        creator_id: statement.read("creator_id")?,
        name: statement.read("name")?,
        location: statement.read::<Option<String>, _>("location")?,
        link: statement.read::<Option<String>, _>("link")?,
        event_date: millis_to_datetime(statement.read("event_date")?, "event_date")?,
        created_at: millis_to_datetime(statement.read("created_at")?, "created_at")?,
        reminder_status,
    })
}

fn collect_events(statement: &mut Statement<'_>) -> Result<Vec<Event>, StoreError> {
    let mut events = Vec::new();
    while let State::Row = statement.next()? {
        events.push(read_event(statement)?);
    }
    Ok(events)
}

#[async_trait]
impl EventStore for Database {
    async fn upcoming_events(
        &self,
        guild_id: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn.prepare(format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE guild_id = ? AND reminder_status != ? AND event_date >= ?"
            ))?;
            statement.bind((1, guild_id))?;
            statement.bind((2, ReminderStatus::DaySent.as_str()))?;
            statement.bind((3, not_before.timestamp_millis()))?;
            collect_events(&mut statement)
        })
    }

    async fn get_event(&self, guild_id: &str, event_id: &str) -> Result<Option<Event>, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn.prepare(format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE guild_id = ? AND event_id = ?"
            ))?;
            statement.bind((1, guild_id))?;
            statement.bind((2, event_id))?;
            match statement.next()? {
                State::Row => Ok(Some(read_event(&statement)?)),
                State::Done => Ok(None),
            }
        })
    }

    async fn update_reminder_status(
        &self,
        guild_id: &str,
        event_id: &str,
        expected: ReminderStatus,
        next: ReminderStatus,
    ) -> Result<StatusUpdate, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn.prepare(
                "UPDATE events SET reminder_status = ?
                 WHERE guild_id = ? AND event_id = ? AND reminder_status = ?",
            )?;
            statement.bind((1, next.as_str()))?;
            statement.bind((2, guild_id))?;
            statement.bind((3, event_id))?;
            statement.bind((4, expected.as_str()))?;
            while let State::Row = statement.next()? {}

            if conn.change_count() == 1 {
                debug!("Event {event_id} reminder status {expected} -> {next}");
                Ok(StatusUpdate::Applied)
            } else {
                Ok(StatusUpdate::Conflict)
            }
        })
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn.prepare(format!(
                "INSERT INTO events ({EVENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))?;
            statement.bind((1, event.event_id.as_str()))?;
            statement.bind((2, event.guild_id.as_str()))?;
            statement.bind((3, event.channel_id.as_str()))?;
            statement.bind((4, event.creator_id.as_str()))?;
            statement.bind((5, event.name.as_str()))?;
            statement.bind((6, event.location.as_deref()))?;
            statement.bind((7, event.link.as_deref()))?;
            statement.bind((8, event.event_date.timestamp_millis()))?;
            statement.bind((9, event.created_at.timestamp_millis()))?;
            statement.bind((10, event.reminder_status.as_str()))?;
            while let State::Row = statement.next()? {}
            Ok(())
        })
    }

    async fn delete_event(&self, guild_id: &str, event_id: &str) -> Result<bool, StoreError> {
        self.with_connection(|conn| {
            let mut statement =
                conn.prepare("DELETE FROM events WHERE guild_id = ? AND event_id = ?")?;
            statement.bind((1, guild_id))?;
            statement.bind((2, event_id))?;
            while let State::Row = statement.next()? {}
            Ok(conn.change_count() > 0)
        })
    }

    async fn clear_events(&self, guild_id: &str) -> Result<usize, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn.prepare("DELETE FROM events WHERE guild_id = ?")?;
            statement.bind((1, guild_id))?;
            while let State::Row = statement.next()? {}
            Ok(conn.change_count())
        })
    }

    async fn list_events(&self, guild_id: &str) -> Result<Vec<Event>, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn.prepare(format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE guild_id = ?
                 ORDER BY event_date ASC, event_id ASC"
            ))?;
            statement.bind((1, guild_id))?;
            collect_events(&mut statement)
        })
    }

    async fn scopes(&self) -> Result<Vec<String>, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn.prepare(
                "SELECT DISTINCT guild_id FROM events WHERE reminder_status != ? ORDER BY guild_id",
            )?;
            statement.bind((1, ReminderStatus::DaySent.as_str()))?;
            let mut guilds = Vec::new();
            while let State::Row = statement.next()? {
                guilds.push(statement.read::<String, _>("guild_id")?);
            }
            Ok(guilds)
        })
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        self.with_connection(|conn| {
            let mut statement = conn.prepare("DELETE FROM events WHERE event_date < ?")?;
            statement.bind((1, before.timestamp_millis()))?;
            while let State::Row = statement.next()? {}
            Ok(conn.change_count())
        })
    }
}
