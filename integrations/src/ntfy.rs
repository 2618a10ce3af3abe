//! Ntfy push notifications.

use common::config::{require_from, ServiceUrls};
use common::errors::AppResult;
use serde::{Deserialize, Serialize};

use crate::{success_body, transport_error};

const SERVICE: &str = "Ntfy";

/// Ntfy server and credentials (`NTFY_URL`, `NTFY_USERNAME`, `NTFY_PASSWORD`).
#[derive(Clone)]
pub struct NtfyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for NtfyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtfyConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl NtfyConfig {
    pub fn from_env(urls: &ServiceUrls) -> AppResult<Self> {
        Self::from_lookup(urls, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(urls: &ServiceUrls, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            url: ServiceUrls::required(&urls.ntfy, "NTFY_URL")?.to_string(),
            username: require_from(&lookup, "NTFY_USERNAME").ok(),
            password: require_from(&lookup, "NTFY_PASSWORD").ok(),
        })
    }
}

/// One line of the `/json` stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NtfyMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    pub event: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NtfyClient {
    http: reqwest::Client,
    config: NtfyConfig,
}

impl NtfyClient {
    pub fn new(http: reqwest::Client, config: NtfyConfig) -> Self {
        Self { http, config }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), topic)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_deref()),
            None => request,
        }
    }

    /// Publishes `message` to `topic` as form field `message`.
    pub async fn send(&self, topic: &str, message: &str) -> AppResult<()> {
        let request = self
            .http
            .post(self.topic_url(topic))
            .form(&[("message", message)]);
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        success_body(SERVICE, response).await?;
        tracing::info!(topic, "Notification sent");
        Ok(())
    }

    /// Fetches cached messages of `topic` without waiting for new ones.
    ///
    /// Only `message` events are returned; keepalives and opens are dropped.
    pub async fn poll(&self, topic: &str) -> AppResult<Vec<NtfyMessage>> {
        let request = self
            .http
            .get(format!("{}/json", self.topic_url(topic)))
            .query(&[("poll", "1")]);
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let body = success_body(SERVICE, response).await?;

        let mut messages = Vec::new();
        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let message: NtfyMessage = serde_json::from_str(line)?;
            if message.event == "message" {
                messages.push(message);
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::errors::AppError;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_string, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> NtfyClient {
        NtfyClient::new(
            reqwest::Client::new(),
            NtfyConfig {
                url: server.uri(),
                username: Some("ops".into()),
                password: Some("secret".into()),
            },
        )
    }

    #[tokio::test]
    async fn test_send_posts_form_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/house_power"))
            .and(header_exists("authorization"))
            .and(body_string("message=Time+to+do+the+dishes%21"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .send("house_power", "Time to do the dishes!")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = client(&server).send("t", "m").await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }

    #[tokio::test]
    async fn test_poll_parses_message_lines() {
        let server = MockServer::start().await;
        let body = concat!(
            r#"{"id":"a1","time":1700000000,"event":"open","topic":"t"}"#,
            "\n",
            r#"{"id":"a2","time":1700000001,"event":"message","topic":"t","message":"first"}"#,
            "\n\n",
            r#"{"id":"a3","time":1700000002,"event":"message","topic":"t","message":"second"}"#,
            "\n"
        );
        Mock::given(method("GET"))
            .and(path("/t/json"))
            .and(query_param("poll", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let messages = client(&server).poll("t").await.unwrap();
        let texts: Vec<_> = messages.iter().filter_map(|m| m.message.as_deref()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_config_requires_url() {
        let urls = ServiceUrls::from_lookup(|_| None);
        assert!(NtfyConfig::from_lookup(&urls, |_| None).is_err());
    }
}
