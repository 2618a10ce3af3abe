//! Environment-driven configuration.
//!
//! Every credential and endpoint comes from the process environment. `.env`
//! and `user.env` in the working directory are loaded first (without
//! overriding variables that are already set).

use std::path::Path;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_INITIAL_SECS: u64 = 60;
const DEFAULT_RETRY_MAX_SECS: u64 = 600;

const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";
const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Env files read by [`load_env_files`], in order.
pub const ENV_FILES: [&str; 2] = [".env", "user.env"];

/// Loads `.env` and `user.env` from the working directory, if present.
///
/// Returns the files that were actually loaded.
pub fn load_env_files() -> Vec<String> {
    load_env_files_from(Path::new("."))
}

/// Loads the env files from `dir`. Existing variables win.
pub fn load_env_files_from(dir: &Path) -> Vec<String> {
    let mut loaded = Vec::new();
    for name in ENV_FILES {
        let path = dir.join(name);
        if !path.exists() {
            continue;
        }
        match dotenvy::from_path(&path) {
            Ok(()) => loaded.push(path.display().to_string()),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to load env file"),
        }
    }
    loaded
}

/// Reads a mandatory environment variable.
///
/// # Errors
/// Returns `AppError::MissingEnv` if the variable is unset or empty.
pub fn require_env(key: &str) -> AppResult<String> {
    require_from(&|k: &str| std::env::var(k).ok(), key)
}

/// Reads an optional environment variable, treating empty values as unset.
pub fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Looks up `key` through `lookup`, failing when it is absent.
pub fn require_from<F>(lookup: &F, key: &str) -> AppResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::MissingEnv(key.to_string()))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

/// Retry settings for the remote query client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay_secs: u64,
    /// Upper bound for any single delay.
    pub max_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay_secs: DEFAULT_RETRY_INITIAL_SECS,
            max_delay_secs: DEFAULT_RETRY_MAX_SECS,
        }
    }
}

/// Process-wide settings, resolved once at start-up and passed explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name used in log lines.
    pub service_name: String,
    /// Timeout for outbound HTTP requests.
    pub http_timeout_secs: u64,
    /// Timeout for establishing database connections.
    pub connect_timeout_secs: u64,
    /// Backoff settings for query retries.
    pub retry: RetrySettings,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    /// Returns `AppError::Config` when a numeric variable cannot be parsed.
    pub fn load_with_service(service_name: &str) -> AppResult<Self> {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Loads configuration using an arbitrary variable lookup.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            service_name: service_name.to_string(),
            http_timeout_secs: parse_or(&lookup, "HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            connect_timeout_secs: parse_or(
                &lookup,
                "DB_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            retry: RetrySettings {
                max_retries: parse_or(&lookup, "QUERY_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                initial_delay_secs: parse_or(
                    &lookup,
                    "QUERY_RETRY_INITIAL_SECS",
                    DEFAULT_RETRY_INITIAL_SECS,
                )?,
                max_delay_secs: parse_or(&lookup, "QUERY_RETRY_MAX_SECS", DEFAULT_RETRY_MAX_SECS)?,
            },
        })
    }

    /// HTTP timeout as a `Duration`.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Base URLs of the remote services the tools talk to.
#[derive(Debug, Clone)]
pub struct ServiceUrls {
    /// DuckDB-over-HTTP query service (`DB_URL`).
    pub duckdb: Option<String>,
    /// Ntfy server (`NTFY_URL`).
    pub ntfy: Option<String>,
    /// Jira server (`JIRA_SERVER`).
    pub jira: Option<String>,
    /// Vault server (`VAULT_URL`).
    pub vault: Option<String>,
    /// Slack Web API base (`SLACK_API_URL`).
    pub slack_api: String,
    /// Nominatim geocoding base (`NOMINATIM_URL`).
    pub nominatim: String,
}

impl ServiceUrls {
    /// Loads service URLs from the environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads service URLs through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
        };
        Self {
            duckdb: get("DB_URL"),
            ntfy: get("NTFY_URL"),
            jira: get("JIRA_SERVER"),
            vault: get("VAULT_URL"),
            slack_api: get("SLACK_API_URL").unwrap_or_else(|| DEFAULT_SLACK_API_URL.to_string()),
            nominatim: get("NOMINATIM_URL").unwrap_or_else(|| DEFAULT_NOMINATIM_URL.to_string()),
        }
    }

    /// Returns a configured URL or a `MissingEnv` error naming its variable.
    pub fn required<'a>(url: &'a Option<String>, env_key: &str) -> AppResult<&'a str> {
        url.as_deref()
            .ok_or_else(|| AppError::MissingEnv(env_key.to_string()))
    }
}
