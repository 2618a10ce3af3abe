//! Slack webhooks and Web API calls.
//!
//! Bots are configured through `SLACK_BOT_CONFIGURATIONS`, a JSON object
//! keyed by bot name:
//!
//! ```json
//! {"alerts": {"webhook_url": "https://hooks.slack.com/services/...", "bot_token": "xoxb-..."}}
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::errors::{AppError, AppResult};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::transport_error;

const SERVICE: &str = "Slack";

/// Credentials for one bot. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SlackBotConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub bot_token: Option<String>,
}

impl SlackBotConfig {
    fn webhook_url(&self, bot: &str) -> AppResult<&str> {
        self.webhook_url
            .as_deref()
            .ok_or_else(|| AppError::Config(format!("Slack bot '{}' has no webhook_url", bot)))
    }

    fn bot_token(&self, bot: &str) -> AppResult<&str> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| AppError::Config(format!("Slack bot '{}' has no bot_token", bot)))
    }
}

/// All configured bots.
#[derive(Debug, Clone, Default)]
pub struct SlackBots {
    bots: HashMap<String, SlackBotConfig>,
}

impl SlackBots {
    /// Parses `SLACK_BOT_CONFIGURATIONS`.
    pub fn from_env() -> AppResult<Self> {
        let raw = common::config::require_env("SLACK_BOT_CONFIGURATIONS")?;
        Self::parse(&raw)
    }

    /// Parses the bot configuration JSON.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let bots: HashMap<String, SlackBotConfig> = serde_json::from_str(raw)
            .map_err(|e| AppError::Config(format!("SLACK_BOT_CONFIGURATIONS: {}", e)))?;
        Ok(Self { bots })
    }

    /// Looks up a bot by name.
    pub fn get(&self, name: &str) -> AppResult<&SlackBotConfig> {
        self.bots
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("Slack bot '{}'", name)))
    }
}

/// Slack client. `api_base` is normally `https://slack.com/api`.
#[derive(Debug, Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
}

impl SlackClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    /// Posts `text` to an incoming webhook.
    ///
    /// # Errors
    /// Any status other than 200 is an error carrying the response body.
    pub async fn send_webhook(&self, webhook_url: &str, text: &str) -> AppResult<()> {
        let response = self
            .http
            .post(webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(slack_error(status.as_u16(), &body));
        }
        Ok(())
    }

    /// Sends through the webhook of a named bot.
    pub async fn send_bot_webhook(&self, bots: &SlackBots, bot: &str, text: &str) -> AppResult<()> {
        let url = bots.get(bot)?.webhook_url(bot)?;
        self.send_webhook(url, text).await
    }

    /// Calls `chat.postMessage`.
    pub async fn post_message(&self, token: &str, channel: &str, text: &str) -> AppResult<Value> {
        let response = self
            .http
            .post(self.api_url("chat.postMessage"))
            .form(&[("token", token), ("channel", channel), ("text", text)])
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        ok_payload(response).await
    }

    /// Uploads one file to `channel` with `files.upload`.
    pub async fn upload_file(&self, token: &str, channel: &str, path: &Path) -> AppResult<Value> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let form = reqwest::multipart::Form::new()
            .text("channels", channel.to_string())
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(self.api_url("files.upload"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        ok_payload(response).await
    }

    /// Posts a message as a named bot, then uploads each file in order.
    ///
    /// Stops at the first failed upload.
    pub async fn send_with_files(
        &self,
        bots: &SlackBots,
        bot: &str,
        channel: &str,
        text: &str,
        files: &[PathBuf],
    ) -> AppResult<()> {
        let token = bots.get(bot)?.bot_token(bot)?;
        self.post_message(token, channel, text).await?;
        for file in files {
            self.upload_file(token, channel, file).await?;
            tracing::info!(file = %file.display(), channel, "Uploaded file to Slack");
        }
        Ok(())
    }

    /// Downloads every message of a conversation, following `next_cursor`.
    pub async fn conversation_history(&self, token: &str, channel: &str) -> AppResult<Vec<Value>> {
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![("channel", channel.to_string())];
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }

            let response = self
                .http
                .get(self.api_url("conversations.history"))
                .bearer_auth(token)
                .query(&params)
                .send()
                .await
                .map_err(|e| transport_error(SERVICE, e))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| transport_error(SERVICE, e))?;
            if status != reqwest::StatusCode::OK {
                return Err(slack_error(status.as_u16(), &body));
            }

            let mut page: Value = serde_json::from_str(&body)?;
            if let Some(Value::Array(batch)) = page.get_mut("messages").map(Value::take) {
                messages.extend(batch);
            }

            cursor = page
                .pointer("/response_metadata/next_cursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(String::from);
            if cursor.is_none() {
                break;
            }
        }

        tracing::debug!(channel, count = messages.len(), "Downloaded conversation history");
        Ok(messages)
    }
}

fn slack_error(status: u16, body: &str) -> AppError {
    AppError::ExternalService(format!(
        "Request to Slack returned an error {}, the response is:\n{}",
        status, body
    ))
}

/// Web API calls answer 200 with `{"ok": false}` on failure.
async fn ok_payload(response: reqwest::Response) -> AppResult<Value> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(SERVICE, e))?;
    let payload: Value = serde_json::from_str(&body).map_err(|_| slack_error(status, &body))?;
    if payload.get("ok").and_then(Value::as_bool) != Some(true) {
        return Err(slack_error(status, &body));
    }
    Ok(payload)
}
