//! Vault KV v2 over HTTP.
//!
//! Credentials are picked per profile: `default` reads `VAULT_NAMESPACE` and
//! `VAULT_TOKEN`, any other profile `p` reads `VAULT_NAMESPACE_P` and
//! `VAULT_TOKEN_P`.

use common::config::{require_from, ServiceUrls};
use common::errors::{AppError, AppResult};
use serde_json::{json, Map, Value};

use crate::transport_error;

const SERVICE: &str = "Vault";
pub const DEFAULT_PROFILE: &str = "default";

/// Names of the namespace and token variables for `profile`.
pub fn profile_env_keys(profile: &str) -> (String, String) {
    if profile.eq_ignore_ascii_case(DEFAULT_PROFILE) {
        ("VAULT_NAMESPACE".to_string(), "VAULT_TOKEN".to_string())
    } else {
        let suffix = profile.to_uppercase().replace('-', "_");
        (
            format!("VAULT_NAMESPACE_{}", suffix),
            format!("VAULT_TOKEN_{}", suffix),
        )
    }
}

#[derive(Clone)]
pub struct VaultClient {
    http: reqwest::Client,
    base_url: String,
    namespace: Option<String>,
    token: String,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("base_url", &self.base_url)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        namespace: Option<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            namespace,
            token: token.into(),
        }
    }

    /// Client for a credential profile, reading the process environment.
    pub fn for_profile(http: reqwest::Client, urls: &ServiceUrls, profile: &str) -> AppResult<Self> {
        Self::for_profile_with(http, urls, profile, |key| std::env::var(key).ok())
    }

    pub fn for_profile_with<F>(
        http: reqwest::Client,
        urls: &ServiceUrls,
        profile: &str,
        lookup: F,
    ) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = ServiceUrls::required(&urls.vault, "VAULT_URL")?;
        let (namespace_key, token_key) = profile_env_keys(profile);
        let token = require_from(&lookup, &token_key)?;
        let namespace = require_from(&lookup, &namespace_key).ok();
        Ok(Self::new(http, base_url, namespace, token))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .request(method, format!("{}/v1/{}", self.base_url, path))
            .header("X-Vault-Token", &self.token);
        match &self.namespace {
            Some(ns) => request.header("X-Vault-Namespace", ns),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> AppResult<Value> {
        let response = request.send().await.map_err(|e| transport_error(SERVICE, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            return Err(AppError::http_status(status.as_u16(), body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Enabled secret engines keyed by mount point.
    pub async fn list_mounts(&self) -> AppResult<Map<String, Value>> {
        let payload = self
            .send(self.request(reqwest::Method::GET, "sys/mounts"), "sys/mounts")
            .await?;
        match payload.get("data") {
            Some(Value::Object(mounts)) => {
                for (mount, config) in mounts {
                    tracing::debug!(mount = %mount, kind = ?config.get("type"), "Mount");
                }
                Ok(mounts.clone())
            }
            _ => Err(AppError::UnexpectedResult("sys/mounts response has no data".into())),
        }
    }

    /// Latest version of the secret at `mount`/`path`.
    pub async fn read_secret(&self, mount: &str, path: &str) -> AppResult<Map<String, Value>> {
        let what = format!("secret {}/{}", mount, path);
        let payload = self
            .send(
                self.request(reqwest::Method::GET, &format!("{}/data/{}", mount, path)),
                &what,
            )
            .await?;
        match payload.pointer("/data/data") {
            Some(Value::Object(data)) => Ok(data.clone()),
            // Deleted versions report `data: null`.
            Some(Value::Null) => Err(AppError::NotFound(what)),
            _ => Err(AppError::UnexpectedResult(format!("{} has no data", what))),
        }
    }

    /// One key of a secret.
    pub async fn read_key(&self, mount: &str, path: &str, key: &str) -> AppResult<Value> {
        let mut secret = self.read_secret(mount, path).await?;
        secret
            .remove(key)
            .ok_or_else(|| AppError::NotFound(format!("secret key {}", key)))
    }

    /// Merges `updates` into the secret, creating it when absent.
    ///
    /// Returns the map that was written.
    pub async fn upsert_secret(
        &self,
        mount: &str,
        path: &str,
        updates: Map<String, Value>,
    ) -> AppResult<Map<String, Value>> {
        let mut merged = match self.read_secret(mount, path).await {
            Ok(existing) => existing,
            Err(AppError::NotFound(_)) => Map::new(),
            Err(e) => return Err(e),
        };
        merged.extend(updates);

        self.send(
            self.request(reqwest::Method::POST, &format!("{}/data/{}", mount, path))
                .json(&json!({ "data": merged })),
            &format!("secret {}/{}", mount, path),
        )
        .await?;
        tracing::info!(mount, path, keys = merged.len(), "Secret successfully added or updated");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> VaultClient {
        VaultClient::new(reqwest::Client::new(), server.uri(), Some("ops".into()), "s.token")
    }

    #[test]
    fn test_profile_env_keys() {
        assert_eq!(
            profile_env_keys("default"),
            ("VAULT_NAMESPACE".to_string(), "VAULT_TOKEN".to_string())
        );
        assert_eq!(
            profile_env_keys("airflow"),
            ("VAULT_NAMESPACE_AIRFLOW".to_string(), "VAULT_TOKEN_AIRFLOW".to_string())
        );
    }

    #[test]
    fn test_profile_requires_token() {
        let urls = ServiceUrls::from_lookup(|k| (k == "VAULT_URL").then(|| "https://vault".to_string()));
        let err = VaultClient::for_profile_with(reqwest::Client::new(), &urls, "airflow", |_| None)
            .unwrap_err();
        assert!(matches!(err, AppError::MissingEnv(k) if k == "VAULT_TOKEN_AIRFLOW"));
    }

    #[tokio::test]
    async fn test_list_mounts_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/mounts"))
            .and(header("X-Vault-Token", "s.token"))
            .and(header("X-Vault-Namespace", "ops"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"secret/": {"type": "kv"}, "sys/": {"type": "system"}}
            })))
            .mount(&server)
            .await;

        let mounts = client(&server).list_mounts().await.unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts["secret/"]["type"], "kv");
    }

    #[tokio::test]
    async fn test_read_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"data": {"user": "svc", "password": "hunter2"}, "metadata": {"version": 3}}
            })))
            .mount(&server)
            .await;

        let vault = client(&server);
        assert_eq!(vault.read_key("secret", "app/db", "user").await.unwrap(), json!("svc"));
        assert!(matches!(
            vault.read_key("secret", "app/db", "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_merges_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"data": {"user": "svc", "password": "old"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/secret/data/app/db"))
            .and(body_json(json!({"data": {"user": "svc", "password": "new", "port": "5432"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"version": 4}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut updates = Map::new();
        updates.insert("password".into(), json!("new"));
        updates.insert("port".into(), json!("5432"));
        let written = client(&server).upsert_secret("secret", "app/db", updates).await.unwrap();
        assert_eq!(written.len(), 3);
    }

    #[tokio::test]
    async fn test_upsert_creates_missing_secret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/new/app"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/secret/data/new/app"))
            .and(body_json(json!({"data": {"token": "abc"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"version": 1}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut updates = Map::new();
        updates.insert("token".into(), json!("abc"));
        client(&server).upsert_secret("secret", "new/app", updates).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_not_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("sealed"))
            .mount(&server)
            .await;

        let err = client(&server)
            .upsert_secret("secret", "x", Map::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sealed"));
    }
}
