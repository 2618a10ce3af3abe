//! Jira REST v2 client with basic auth.

use common::config::{require_from, ServiceUrls};
use common::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{success_body, transport_error};

const SERVICE: &str = "Jira";
const IN_PROGRESS: &str = "in progress";

/// `JIRA_SERVER`, `JIRA_USER`, `JIRA_TOKEN` and `JIRA_PROJECT`; all required.
#[derive(Clone)]
pub struct JiraConfig {
    pub server: String,
    pub user: String,
    pub token: String,
    pub project: String,
}

impl std::fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraConfig")
            .field("server", &self.server)
            .field("user", &self.user)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl JiraConfig {
    pub fn from_env(urls: &ServiceUrls) -> AppResult<Self> {
        Self::from_lookup(urls, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(urls: &ServiceUrls, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            server: ServiceUrls::required(&urls.jira, "JIRA_SERVER")?.to_string(),
            user: require_from(&lookup, "JIRA_USER")?,
            token: require_from(&lookup, "JIRA_TOKEN")?,
            project: require_from(&lookup, "JIRA_PROJECT")?,
        })
    }
}

/// Key and title of a found issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueSummary {
    pub key: String,
    pub title: String,
}

/// Outcome of [`JiraClient::create_issue`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedIssue {
    pub id: String,
    pub key: String,
    /// Whether the issue was moved to "In Progress".
    pub in_progress: bool,
}

#[derive(Debug, Deserialize)]
struct Transition {
    id: String,
    name: String,
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    config: JiraConfig,
}

impl JiraClient {
    pub fn new(http: reqwest::Client, config: JiraConfig) -> Self {
        Self { http, config }
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/2/{}", self.config.server.trim_end_matches('/'), path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> AppResult<String> {
        let response = request
            .basic_auth(&self.config.user, Some(&self.config.token))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        success_body(SERVICE, response).await
    }

    /// Lists up to `max_results` issues of `project` as key and summary.
    pub async fn search_issues(&self, project: &str, max_results: u32) -> AppResult<Vec<IssueSummary>> {
        let jql = format!("project = {}", project);
        let max = max_results.to_string();
        let body = self
            .send(
                self.http
                    .get(self.url("search"))
                    .query(&[("jql", jql.as_str()), ("maxResults", max.as_str())]),
            )
            .await?;
        let payload: Value = serde_json::from_str(&body)?;

        let issues: Vec<IssueSummary> = payload
            .get("issues")
            .and_then(Value::as_array)
            .map(|issues| {
                issues
                    .iter()
                    .filter_map(|issue| {
                        Some(IssueSummary {
                            key: issue.get("key")?.as_str()?.to_string(),
                            title: issue
                                .pointer("/fields/summary")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if issues.is_empty() {
            tracing::info!(project, "No issues found");
        }
        Ok(issues)
    }

    /// Full issue JSON.
    pub async fn get_issue(&self, key: &str) -> AppResult<Value> {
        let body = self.send(self.http.get(self.url(&format!("issue/{}", key)))).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Creates an issue in the configured project and moves it to "In Progress"
    /// when that transition is offered.
    pub async fn create_issue(
        &self,
        summary: &str,
        description: &str,
        issue_type: &str,
    ) -> AppResult<CreatedIssue> {
        let fields = json!({
            "fields": {
                "project": {"key": self.config.project},
                "summary": summary,
                "description": description,
                "issuetype": {"name": issue_type},
            }
        });
        let body = self.send(self.http.post(self.url("issue")).json(&fields)).await?;
        let created: Value = serde_json::from_str(&body)?;
        let key = created
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::UnexpectedResult("created issue has no key".into()))?
            .to_string();
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        tracing::info!(key = %key, "Issue created");

        let in_progress = self.move_to_in_progress(&key).await?;
        Ok(CreatedIssue {
            id,
            key,
            in_progress,
        })
    }

    async fn move_to_in_progress(&self, key: &str) -> AppResult<bool> {
        let transitions_url = self.url(&format!("issue/{}/transitions", key));
        let body = self.send(self.http.get(&transitions_url)).await?;

        #[derive(Deserialize)]
        struct Transitions {
            #[serde(default)]
            transitions: Vec<Transition>,
        }
        let Transitions { transitions } = serde_json::from_str(&body)?;

        match transitions
            .iter()
            .find(|t| t.name.to_lowercase() == IN_PROGRESS)
        {
            Some(t) => {
                self.send(
                    self.http
                        .post(&transitions_url)
                        .json(&json!({"transition": {"id": t.id}})),
                )
                .await?;
                tracing::info!(key, "Issue moved to 'In Progress'");
                Ok(true)
            }
            None => {
                tracing::warn!(key, "No 'In Progress' transition available");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> JiraClient {
        JiraClient::new(
            reqwest::Client::new(),
            JiraConfig {
                server: server.uri(),
                user: "bot@example.com".into(),
                token: "tok".into(),
                project: "OPS".into(),
            },
        )
    }

    #[test]
    fn test_all_variables_required() {
        let urls = ServiceUrls::from_lookup(|k| (k == "JIRA_SERVER").then(|| "https://jira".to_string()));
        let err = JiraConfig::from_lookup(&urls, |k| match k {
            "JIRA_USER" => Some("u".into()),
            "JIRA_TOKEN" => Some("t".into()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(err, AppError::MissingEnv(k) if k == "JIRA_PROJECT"));
    }

    #[tokio::test]
    async fn test_search_maps_key_to_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("jql", "project = OPS"))
            .and(query_param("maxResults", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [
                    {"key": "OPS-1", "fields": {"summary": "Rotate keys"}},
                    {"key": "OPS-2", "fields": {"summary": "Patch hosts"}}
                ]
            })))
            .mount(&server)
            .await;

        let issues = client(&server).search_issues("OPS", 2).await.unwrap();
        assert_eq!(
            issues,
            vec![
                IssueSummary { key: "OPS-1".into(), title: "Rotate keys".into() },
                IssueSummary { key: "OPS-2".into(), title: "Patch hosts".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_create_moves_to_in_progress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue"))
            .and(body_partial_json(json!({"fields": {"project": {"key": "OPS"}, "summary": "Renew cert"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "10001", "key": "OPS-3"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/OPS-3/transitions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transitions": [{"id": "11", "name": "To Do"}, {"id": "21", "name": "In Progress"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue/OPS-3/transitions"))
            .and(body_partial_json(json!({"transition": {"id": "21"}})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server)
            .create_issue("Renew cert", "expires friday", "Task")
            .await
            .unwrap();
        assert_eq!(created.key, "OPS-3");
        assert!(created.in_progress);
    }

    #[tokio::test]
    async fn test_create_without_transition_still_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "1", "key": "OPS-4"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/OPS-4/transitions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"transitions": []})))
            .mount(&server)
            .await;

        let created = client(&server).create_issue("x", "y", "Task").await.unwrap();
        assert!(!created.in_progress);
    }
}
