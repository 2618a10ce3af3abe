//! DuckDB-over-HTTP query source.
//!
//! The service exposes `GET {base}/query/?query=<sql>` behind basic auth and
//! answers with JSON. Accepted payloads:
//! - `{"columns": [...], "rows": [[...], ...]}` (columns as names or `{name, type}`)
//! - `[{...}, {...}]` (list of records)
//! - `{"data": <either of the above>}`
//! - `null`, which the client treats as a failed attempt.

use std::time::Duration;

use async_trait::async_trait;
use common::config::{require_from, ServiceUrls};
use common::errors::{AppError, AppResult};
use common::models::query::{ColumnInfo, QueryParam, QueryResult};
use serde_json::Value;

use crate::source::{QuerySession, QuerySource};

/// Connection parameters for the DuckDB HTTP service.
#[derive(Clone)]
pub struct DuckDbConfig {
    /// Service base URL, without the `/query/` suffix.
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for DuckDbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl DuckDbConfig {
    /// Reads `DB_URL`, `HT_AUTH_USERNAME` and `HT_AUTH_PASSWORD`.
    pub fn from_env(urls: &ServiceUrls) -> AppResult<Self> {
        Self::from_lookup(urls, |key| std::env::var(key).ok())
    }

    /// Same as [`DuckDbConfig::from_env`] with a custom lookup.
    pub fn from_lookup<F>(urls: &ServiceUrls, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = ServiceUrls::required(&urls.duckdb, "DB_URL")?.to_string();
        Ok(Self {
            base_url,
            username: require_from(&lookup, "HT_AUTH_USERNAME").ok(),
            password: require_from(&lookup, "HT_AUTH_PASSWORD").ok(),
        })
    }

    /// Full query endpoint URL.
    pub fn query_url(&self) -> String {
        format!("{}/query/", self.base_url.trim_end_matches('/'))
    }
}

/// Query source for the DuckDB HTTP service.
pub struct DuckDbHttpSource {
    config: DuckDbConfig,
    timeout: Duration,
}

impl DuckDbHttpSource {
    pub fn new(config: DuckDbConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }
}

struct DuckDbSession {
    client: reqwest::Client,
    config: DuckDbConfig,
}

#[async_trait]
impl QuerySource for DuckDbHttpSource {
    fn name(&self) -> &str {
        "duckdb-http"
    }

    async fn connect(&self) -> AppResult<Box<dyn QuerySession>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AppError::ExternalService(format!("无法创建 HTTP 客户端: {}", e)))?;
        Ok(Box::new(DuckDbSession {
            client,
            config: self.config.clone(),
        }))
    }
}

#[async_trait]
impl QuerySession for DuckDbSession {
    async fn execute(
        &mut self,
        query: &str,
        params: &[QueryParam],
    ) -> AppResult<Option<QueryResult>> {
        let mut request_params = vec![("query".to_string(), query.to_string())];
        if !params.is_empty() {
            let encoded: Vec<Value> = params.iter().map(QueryParam::to_json).collect();
            request_params.push(("params".to_string(), Value::Array(encoded).to_string()));
        }

        let mut request = self
            .client
            .get(self.config.query_url())
            .query(&request_params);
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("无法连接到 DuckDB 服务: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ExternalService(format!("读取 DuckDB 响应失败: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::http_status(status.as_u16(), body));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|e| {
            AppError::ExternalService(format!("DuckDB 服务返回无效响应: {}", e))
        })?;
        parse_payload(payload)
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

/// Converts a service payload into a table. `null` yields `Ok(None)`.
///
/// A records list names its columns through object keys, so `[]` yields an
/// empty table with no columns. Use the columnar shape to keep headers on
/// zero rows.
pub fn parse_payload(payload: Value) -> AppResult<Option<QueryResult>> {
    match payload {
        Value::Null => Ok(None),
        Value::Array(records) => QueryResult::from_records(&records)
            .map(Some)
            .ok_or_else(|| AppError::UnexpectedResult("records must be JSON objects".into())),
        Value::Object(mut map) => {
            if let Some(error) = map.get("error").filter(|e| !e.is_null()) {
                return Err(AppError::ExternalService(match error {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }));
            }
            if let Some(data) = map.remove("data") {
                return parse_payload(data);
            }
            match (map.remove("columns"), map.remove("rows")) {
                (Some(columns), Some(rows)) => parse_columnar(columns, rows).map(Some),
                _ => Err(AppError::UnexpectedResult(
                    "payload has neither records nor columns/rows".into(),
                )),
            }
        }
        other => Err(AppError::UnexpectedResult(format!(
            "expected a table, got {}",
            other
        ))),
    }
}

fn parse_columnar(columns: Value, rows: Value) -> AppResult<QueryResult> {
    let Value::Array(columns) = columns else {
        return Err(AppError::UnexpectedResult("columns must be an array".into()));
    };
    let columns = columns
        .into_iter()
        .map(|c| match c {
            Value::String(name) => Ok(ColumnInfo::new(name, "unknown")),
            Value::Object(obj) => {
                let name = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::UnexpectedResult("column without name".into()))?;
                let data_type = obj
                    .get("type")
                    .or_else(|| obj.get("data_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                Ok(ColumnInfo::new(name, data_type))
            }
            other => Err(AppError::UnexpectedResult(format!("bad column entry {}", other))),
        })
        .collect::<AppResult<Vec<ColumnInfo>>>()?;

    let rows = match rows {
        Value::Null => Vec::new(),
        Value::Array(rows) => rows
            .into_iter()
            .map(|row| match row {
                Value::Array(cells) if cells.len() == columns.len() => Ok(cells),
                Value::Array(cells) => Err(AppError::UnexpectedResult(format!(
                    "row has {} cells, expected {}",
                    cells.len(),
                    columns.len()
                ))),
                Value::Object(obj) => Ok(columns
                    .iter()
                    .map(|c| obj.get(&c.name).cloned().unwrap_or(Value::Null))
                    .collect()),
                other => Err(AppError::UnexpectedResult(format!("bad row {}", other))),
            })
            .collect::<AppResult<Vec<Vec<Value>>>>()?,
        other => {
            return Err(AppError::UnexpectedResult(format!(
                "rows must be an array, got {}",
                other
            )))
        }
    };

    Ok(QueryResult::from_rows(columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryingQueryClient;
    use crate::retry::{RecordingSleeper, RetryPolicy};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> DuckDbHttpSource {
        DuckDbHttpSource::new(
            DuckDbConfig {
                base_url: server.uri(),
                username: Some("analyst".into()),
                password: Some("pw".into()),
            },
            Duration::from_secs(5),
        )
    }

    fn client_for(
        server: &MockServer,
        max_retries: u32,
    ) -> (RetryingQueryClient<DuckDbHttpSource>, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = RetryingQueryClient::new(
            source_for(server),
            RetryPolicy::default().with_max_retries(max_retries),
        )
        .with_sleeper(sleeper.clone());
        (client, sleeper)
    }

    #[test]
    fn test_parse_records_payload() {
        let table = parse_payload(json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]))
            .unwrap()
            .unwrap();
        assert_eq!(table.column_names(), vec!["id", "v"]);
        assert_eq!(table.row_count, 2);
    }

    #[test]
    fn test_parse_empty_records_has_no_columns() {
        let table = parse_payload(json!([])).unwrap().unwrap();
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
        assert_eq!(table.row_count, 0);
    }

    #[test]
    fn test_parse_columnar_empty_keeps_columns() {
        let table = parse_payload(json!({
            "data": {"columns": [{"name": "id", "type": "BIGINT"}, "label"], "rows": []}
        }))
        .unwrap()
        .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_names(), vec!["id", "label"]);
        assert_eq!(table.columns[0].data_type, "BIGINT");
    }

    #[test]
    fn test_parse_rejects_ragged_rows_and_scalars() {
        assert!(parse_payload(json!({"columns": ["a", "b"], "rows": [[1]]})).is_err());
        assert!(parse_payload(json!(42)).is_err());
        assert!(parse_payload(json!({"error": "Catalog Error"})).is_err());
        assert_eq!(parse_payload(Value::Null).unwrap(), None);
    }

    #[tokio::test]
    async fn test_query_sends_auth_and_query_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query/"))
            .and(query_param("query", "SELECT * FROM test_table"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "columns": ["id", "name"],
                "rows": [[1, "alpha"]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, sleeper) = client_for(&server, 5);
        let table = client.query("SELECT * FROM test_table", &[]).await.unwrap();

        assert_eq!(table.rows, vec![vec![json!(1), json!("alpha")]]);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .expect(3)
            .mount(&server)
            .await;

        let (client, sleeper) = client_for(&server, 2);
        let err = client.query("SELECT 1", &[]).await.unwrap_err();

        assert!(err.to_string().contains("Failed with status code: 503, Message: warming up"));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(60), Duration::from_secs(120)]
        );
    }

    #[tokio::test]
    async fn test_null_body_triggers_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/query/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"ok": true}])))
            .mount(&server)
            .await;

        let (client, sleeper) = client_for(&server, 5);
        let table = client.query("SELECT true AS ok", &[]).await.unwrap();

        assert_eq!(table.rows, vec![vec![json!(true)]]);
        assert_eq!(sleeper.delays().len(), 1);
    }

    #[tokio::test]
    async fn test_params_are_sent_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query/"))
            .and(query_param("params", r#"[7,"x"]"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, 0);
        let table = client
            .query("SELECT * FROM t WHERE a = ? AND b = ?", &[QueryParam::Int(7), QueryParam::from("x")])
            .await
            .unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_config_requires_db_url() {
        let urls = ServiceUrls::from_lookup(|_| None);
        let err = DuckDbConfig::from_lookup(&urls, |_| None).unwrap_err();
        assert!(matches!(err, AppError::MissingEnv(k) if k == "DB_URL"));
    }
}
