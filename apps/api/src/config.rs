use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::sync::scheduler::SchedulerConfig;

/// Application configuration loaded from environment variables.
/// Nothing is required: with no backend configured the service runs offline.
#[derive(Debug, Clone)]
pub struct Config {
    pub local_mode: bool,
    pub backend_url: Option<String>,
    pub backend_key: Option<String>,
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    /// Used when the local store has no username.
    pub default_username: Option<String>,
    pub sync_interval_secs: u64,
    pub sync_initial_delay_secs: u64,
    pub port: u16,
    pub rust_log: String,
}

/// Where remote writes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMode {
    Offline,
    Rest { base_url: String, api_key: String },
    Postgres { database_url: String },
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            local_mode: optional_env("DIARY_LOCAL_MODE").is_some_and(|v| is_truthy(&v)),
            backend_url: optional_env("DIARY_BACKEND_URL"),
            backend_key: optional_env("DIARY_BACKEND_KEY"),
            database_url: optional_env("DATABASE_URL"),
            data_dir: optional_env("DIARY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            default_username: optional_env("DIARY_USERNAME"),
            sync_interval_secs: parse_env("SYNC_INTERVAL_SECS", 300)?,
            sync_initial_delay_secs: parse_env("SYNC_INITIAL_DELAY_SECS", 3)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn backend_mode(&self) -> BackendMode {
        select_backend(
            self.local_mode,
            self.backend_url.as_deref(),
            self.backend_key.as_deref(),
            self.database_url.as_deref(),
        )
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            initial_delay: Duration::from_secs(self.sync_initial_delay_secs),
            interval: Duration::from_secs(self.sync_interval_secs.max(1)),
        }
    }
}

/// Local mode wins over everything; a REST endpoint needs both URL and key.
pub fn select_backend(
    local_mode: bool,
    backend_url: Option<&str>,
    backend_key: Option<&str>,
    database_url: Option<&str>,
) -> BackendMode {
    if local_mode {
        return BackendMode::Offline;
    }
    match (backend_url, backend_key, database_url) {
        (Some(url), Some(key), _) => BackendMode::Rest {
            base_url: url.trim_end_matches('/').to_string(),
            api_key: key.to_string(),
        },
        (_, _, Some(db)) => BackendMode::Postgres {
            database_url: db.to_string(),
        },
        _ => BackendMode::Offline,
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_mode_forces_offline() {
        let mode = select_backend(true, Some("https://x.test"), Some("k"), Some("postgres://"));
        assert_eq!(mode, BackendMode::Offline);
    }

    #[test]
    fn test_rest_needs_url_and_key() {
        assert_eq!(
            select_backend(false, Some("https://x.test/"), Some("k"), None),
            BackendMode::Rest {
                base_url: "https://x.test".to_string(),
                api_key: "k".to_string()
            }
        );
        assert_eq!(
            select_backend(false, Some("https://x.test"), None, None),
            BackendMode::Offline
        );
    }

    #[test]
    fn test_database_url_selects_postgres() {
        assert_eq!(
            select_backend(false, None, None, Some("postgres://localhost/diary")),
            BackendMode::Postgres {
                database_url: "postgres://localhost/diary".to_string()
            }
        );
    }

    #[test]
    fn test_nothing_configured_is_offline() {
        assert_eq!(select_backend(false, None, None, None), BackendMode::Offline);
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("0"));
    }
}
