//! 外部服务集成
//!
//! Thin async clients for the services the ops scripts talk to:
//! - Slack webhooks and Web API
//! - Ntfy push notifications
//! - Jira issues
//! - Vault KV v2 secrets
//! - Nominatim geocoding behind a persistent cache

use std::time::Duration;

use common::errors::{AppError, AppResult};

pub mod geocode;
pub mod jira;
pub mod ntfy;
pub mod slack;
pub mod vault;

pub use geocode::CachedGeocoder;
pub use jira::{JiraClient, JiraConfig};
pub use ntfy::{NtfyClient, NtfyConfig};
pub use slack::{SlackBotConfig, SlackBots, SlackClient};
pub use vault::VaultClient;

/// Builds the shared HTTP client with the configured timeout.
pub fn http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::ExternalService(format!("无法创建 HTTP 客户端: {}", e)))
}

/// Maps a transport error to `ExternalService`, naming the service.
pub(crate) fn transport_error(service: &str, e: reqwest::Error) -> AppError {
    AppError::ExternalService(format!("Request to {} failed: {}", service, e))
}

/// Reads the body and fails with the status line unless the status is 2xx.
pub(crate) async fn success_body(service: &str, response: reqwest::Response) -> AppResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(service, e))?;
    if !status.is_success() {
        return Err(AppError::http_status(status.as_u16(), body));
    }
    Ok(body)
}
