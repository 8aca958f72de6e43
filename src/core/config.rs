//! # Configuration
//!
//! Environment-driven settings for the bot process and the reminder engine.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: Overflow-safe duration parsing; every duration is capped at one year
//! - 1.1.0: Reminder backoff and dead-letter settings
//! - 1.0.0: Initial release with token, database and reminder intervals

use crate::core::error::ConfigError;
use std::time::Duration;

/// Longest accepted value for any duration setting, in seconds
pub const MAX_DURATION_SECS: i64 = 366 * 24 * 60 * 60;

/// Reminder engine settings. Loaded once, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Subtracted from the event date to get the week-tier due time
    pub week_offset: chrono::Duration,
    /// Subtracted from the event date to get the day-tier due time
    pub day_offset: chrono::Duration,
    /// Re-check interval when no event has a pending reminder
    pub fallback_interval: Duration,
    /// Retry interval after the upcoming-events listing fails
    pub storage_retry_interval: Duration,
    /// Delay before a freshly started scheduler computes its first timer
    pub settle_delay: Duration,
    /// How long after its start an event still counts as upcoming
    pub stale_after: chrono::Duration,
    /// First backoff step after a failed delivery
    pub retry_base: Duration,
    /// Backoff ceiling
    pub retry_max: Duration,
    /// Consecutive failures before an event-tier is dead-lettered
    pub max_attempts: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            week_offset: chrono::Duration::days(7),
            day_offset: chrono::Duration::days(1),
            fallback_interval: Duration::from_secs(60 * 60),
            storage_retry_interval: Duration::from_secs(30),
            settle_delay: Duration::from_secs(5),
            stale_after: chrono::Duration::hours(1),
            retry_base: Duration::from_secs(60),
            retry_max: Duration::from_secs(60 * 60),
            max_attempts: 8,
        }
    }
}

impl ReminderConfig {
    /// Build from a key lookup; missing keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = Self::default();
        let seconds = |key: &'static str| -> Result<Option<i64>, ConfigError> {
            match lookup(key) {
                Some(value) => parse_duration(&value)
                    .filter(|secs| *secs <= MAX_DURATION_SECS)
                    .map(Some)
                    .ok_or(ConfigError::Invalid { key, value }),
                None => Ok(None),
            }
        };
        let std_duration = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(seconds(key)?
                .map(|secs| Duration::from_secs(secs as u64))
                .unwrap_or(default))
        };
        let chrono_duration =
            |key: &'static str, default: chrono::Duration| -> Result<chrono::Duration, ConfigError> {
                match seconds(key)? {
                    Some(secs) => chrono::Duration::try_seconds(secs).ok_or_else(|| {
                        ConfigError::Invalid {
                            key,
                            value: secs.to_string(),
                        }
                    }),
                    None => Ok(default),
                }
            };

        let max_attempts = match lookup("REMINDER_MAX_ATTEMPTS") {
            Some(value) => value.trim().parse::<u32>().map_err(|_| ConfigError::Invalid {
                key: "REMINDER_MAX_ATTEMPTS",
                value,
            })?,
            None => defaults.max_attempts,
        };

        let config = Self {
            week_offset: chrono_duration("REMINDER_WEEK_OFFSET", defaults.week_offset)?,
            day_offset: chrono_duration("REMINDER_DAY_OFFSET", defaults.day_offset)?,
            fallback_interval: std_duration("REMINDER_FALLBACK_INTERVAL", defaults.fallback_interval)?,
            storage_retry_interval: std_duration(
                "REMINDER_STORAGE_RETRY",
                defaults.storage_retry_interval,
            )?,
            settle_delay: std_duration("REMINDER_SETTLE_DELAY", defaults.settle_delay)?,
            stale_after: chrono_duration("REMINDER_STALE_AFTER", defaults.stale_after)?,
            retry_base: std_duration("REMINDER_RETRY_BASE", defaults.retry_base)?,
            retry_max: std_duration("REMINDER_RETRY_MAX", defaults.retry_max)?,
            max_attempts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.week_offset <= self.day_offset {
            return Err(ConfigError::Constraint(format!(
                "week offset ({}s) must be greater than day offset ({}s)",
                self.week_offset.num_seconds(),
                self.day_offset.num_seconds()
            )));
        }
        let max_offset = chrono::Duration::seconds(MAX_DURATION_SECS);
        if self.week_offset > max_offset || self.stale_after > max_offset {
            return Err(ConfigError::Constraint(format!(
                "reminder offsets and stale horizon must not exceed {MAX_DURATION_SECS}s"
            )));
        }
        if self.stale_after < chrono::Duration::zero() {
            return Err(ConfigError::Constraint(
                "stale horizon must not be negative".to_string(),
            ));
        }
        let max_interval = Duration::from_secs(MAX_DURATION_SECS as u64);
        let intervals = [
            self.fallback_interval,
            self.storage_retry_interval,
            self.settle_delay,
            self.retry_max,
        ];
        if intervals.iter().any(|d| *d > max_interval) {
            return Err(ConfigError::Constraint(format!(
                "intervals must not exceed {MAX_DURATION_SECS}s"
            )));
        }
        if self.day_offset <= chrono::Duration::zero() {
            return Err(ConfigError::Constraint(
                "day offset must be positive".to_string(),
            ));
        }
        if self.fallback_interval.is_zero() || self.storage_retry_interval.is_zero() {
            return Err(ConfigError::Constraint(
                "fallback and storage retry intervals must be non-zero".to_string(),
            ));
        }
        if self.retry_base.is_zero() || self.retry_max < self.retry_base {
            return Err(ConfigError::Constraint(
                "retry base must be non-zero and not exceed retry max".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Constraint(
                "max attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_path: String,
    pub log_level: String,
    pub reminders: ReminderConfig,
}

impl Config {
    /// Load configuration from the process environment (call `dotenvy::dotenv()` first)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        Ok(Self {
            discord_token,
            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| "herald.db".to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            reminders: ReminderConfig::from_lookup(&lookup)?,
        })
    }
}

/// Parse a time duration string like "30m", "2h", "1d", "1h30m" into seconds
pub fn parse_duration(time_str: &str) -> Option<i64> {
    let time_str = time_str.trim().to_lowercase();
    let mut total_seconds: i64 = 0;
    let mut current_number = String::new();

    for c in time_str.chars() {
        if c.is_ascii_digit() {
            current_number.push(c);
        } else if !current_number.is_empty() {
            let value: i64 = current_number.parse().ok()?;
            current_number.clear();

            let unit: i64 = match c {
                's' => 1,
                'm' => 60,
                'h' => 60 * 60,
                'd' => 60 * 60 * 24,
                'w' => 60 * 60 * 24 * 7,
                _ => return None,
            };
            let seconds = value.checked_mul(unit)?;
            total_seconds = total_seconds.checked_add(seconds)?;
        } else {
            return None;
        }
    }

    // Trailing digits without a unit
    if !current_number.is_empty() {
        return None;
    }

    if total_seconds > 0 {
        Some(total_seconds)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(30));
        assert_eq!(parse_duration("30m"), Some(1800));
        assert_eq!(parse_duration("2h"), Some(7200));
        assert_eq!(parse_duration("1d"), Some(86400));
        assert_eq!(parse_duration("1w"), Some(604800));
        assert_eq!(parse_duration("1h30m"), Some(5400));
        assert_eq!(parse_duration(" 7D "), Some(604800));
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration("15"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_overflow_is_rejected() {
        assert_eq!(parse_duration("99999999999999999w"), None);
        assert_eq!(parse_duration("9223372036854775807s1s"), None);
        assert_eq!(parse_duration("99999999999999999999s"), None);
    }

    #[test]
    fn test_out_of_range_durations_are_invalid() {
        for value in ["99999999999999999w", "9999999999999999s", "367d"] {
            let err = ReminderConfig::from_lookup(lookup_from(&[("REMINDER_WEEK_OFFSET", value)]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "REMINDER_WEEK_OFFSET", .. }),
                "{value}: {err}"
            );
        }

        let err = ReminderConfig::from_lookup(lookup_from(&[(
            "REMINDER_FALLBACK_INTERVAL",
            "9999999999999999s",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_validate_caps_directly_built_offsets() {
        let config = ReminderConfig {
            week_offset: chrono::Duration::days(5000),
            ..ReminderConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Constraint(_))));

        let config = ReminderConfig {
            settle_delay: Duration::from_secs(u64::MAX / 2),
            ..ReminderConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Constraint(_))));

        assert!(ReminderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_reminder_defaults() {
        let config = ReminderConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.week_offset, chrono::Duration::days(7));
        assert_eq!(config.day_offset, chrono::Duration::days(1));
        assert_eq!(config.fallback_interval, Duration::from_secs(3600));
        assert_eq!(config.max_attempts, 8);
    }

    #[test]
    fn test_reminder_overrides() {
        let config = ReminderConfig::from_lookup(lookup_from(&[
            ("REMINDER_WEEK_OFFSET", "2d"),
            ("REMINDER_DAY_OFFSET", "2h"),
            ("REMINDER_FALLBACK_INTERVAL", "10m"),
            ("REMINDER_MAX_ATTEMPTS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.week_offset, chrono::Duration::days(2));
        assert_eq!(config.day_offset, chrono::Duration::hours(2));
        assert_eq!(config.fallback_interval, Duration::from_secs(600));
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_week_must_exceed_day() {
        let err = ReminderConfig::from_lookup(lookup_from(&[
            ("REMINDER_WEEK_OFFSET", "1d"),
            ("REMINDER_DAY_OFFSET", "1d"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Constraint(_)));
    }

    #[test]
    fn test_invalid_duration_is_reported() {
        let err = ReminderConfig::from_lookup(lookup_from(&[("REMINDER_SETTLE_DELAY", "soon")]))
            .unwrap_err();
        match err {
            ConfigError::Invalid { key, value } => {
                assert_eq!(key, "REMINDER_SETTLE_DELAY");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = ReminderConfig::from_lookup(lookup_from(&[("REMINDER_MAX_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Constraint(_)));
    }

    #[test]
    fn test_config_requires_token() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DISCORD_TOKEN")));

        let config = Config::from_lookup(lookup_from(&[("DISCORD_TOKEN", "abc")])).unwrap();
        assert_eq!(config.database_path, "herald.db");
        assert_eq!(config.log_level, "info");
    }
}
