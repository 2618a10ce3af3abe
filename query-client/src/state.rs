//! Shared state for the query tools.

use common::config::{AppConfig, ServiceUrls};
use common::errors::AppResult;
use common::models::connection::{ConnectionConfig, DbType};

use crate::client::RetryingQueryClient;
use crate::duckdb_http::{DuckDbConfig, DuckDbHttpSource};
use crate::retry::RetryPolicy;
use crate::sql_source::SqlSource;

/// Resolved configuration plus factories for the retrying clients.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub service_urls: ServiceUrls,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            service_urls: ServiceUrls::load(),
        }
    }

    /// State with explicit service URLs.
    pub fn with_urls(config: AppConfig, service_urls: ServiceUrls) -> Self {
        Self {
            config,
            service_urls,
        }
    }

    /// Retry policy from the configured settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }

    /// Client for the DuckDB HTTP service (`DB_URL`, `HT_AUTH_*`).
    pub fn duckdb_client(&self) -> AppResult<RetryingQueryClient<DuckDbHttpSource>> {
        let config = DuckDbConfig::from_env(&self.service_urls)?;
        let source = DuckDbHttpSource::new(config, self.config.http_timeout());
        Ok(RetryingQueryClient::new(source, self.retry_policy()))
    }

    /// Client for a SQL engine configured under `<PREFIX>_*` variables.
    pub fn sql_client(
        &self,
        prefix: &str,
        db_type: DbType,
    ) -> AppResult<RetryingQueryClient<SqlSource>> {
        let config = ConnectionConfig::from_env_prefix(prefix, db_type)?;
        self.sql_client_for(config)
    }

    /// Client for an explicit connection config.
    pub fn sql_client_for(
        &self,
        config: ConnectionConfig,
    ) -> AppResult<RetryingQueryClient<SqlSource>> {
        let source = SqlSource::new(config, self.config.connect_timeout())?;
        Ok(RetryingQueryClient::new(source, self.retry_policy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::BackoffBuilder;
    use std::time::Duration;

    fn state() -> AppState {
        let config = AppConfig::from_lookup("query-cli", |key| match key {
            "QUERY_MAX_RETRIES" => Some("2".into()),
            "QUERY_RETRY_INITIAL_SECS" => Some("5".into()),
            _ => None,
        })
        .unwrap();
        AppState::with_urls(config, ServiceUrls::from_lookup(|_| None))
    }

    #[test]
    fn test_retry_policy_follows_config() {
        let policy = state().retry_policy();
        assert_eq!(policy.max_retries, 2);
        let curve: Vec<Duration> = policy.backoff().build().collect();
        assert_eq!(curve, vec![Duration::from_secs(5), Duration::from_secs(10)]);
    }

    #[test]
    fn test_duckdb_client_needs_db_url() {
        assert!(state().duckdb_client().is_err());
    }

    #[test]
    fn test_sql_client_for_sqlite() {
        let client = state()
            .sql_client_for(ConnectionConfig::sqlite(":memory:"))
            .unwrap();
        assert_eq!(client.policy().max_retries, 2);
        assert_eq!(client.source().config().db_type, DbType::SQLite);
    }
}
