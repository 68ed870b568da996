use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use crate::error::{ConsoleError, ConsoleResult};
use crate::session::{Session, SessionId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub workspace_path: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_mode: Option<String>,
}

impl StartSessionRequest {
    pub fn new(workspace_path: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageBody<'a> {
    workspace_path: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct RunsResponse {
    #[serde(default)]
    runs: Vec<Session>,
}

/// The agent-run store the console reads from and writes to.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Sessions for a workspace, most recent first.
    async fn list_sessions(&self, workspace: Option<&str>) -> ConsoleResult<Vec<Session>>;

    async fn start_session(&self, request: &StartSessionRequest) -> ConsoleResult<Session>;

    /// Post a reply. The store may answer with the updated session or nothing.
    async fn post_message(
        &self,
        workspace_path: &str,
        session_id: &SessionId,
        text: &str,
    ) -> ConsoleResult<Option<Session>>;
}

/// JSON-over-HTTP client for the agent-run API.
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn checked(response: reqwest::Response) -> ConsoleResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ConsoleError::Transport(parse_api_error(&body, status.as_u16())))
    }
}

/// Message for a failed call: the server's `error` or `detail` field when
/// present, else `HTTP <status>`.
fn parse_api_error(body: &str, status: u16) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["error", "detail"].iter().find_map(|field| match &json[*field] {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Object(obj) => obj
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from),
                _ => None,
            })
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn list_sessions(&self, workspace: Option<&str>) -> ConsoleResult<Vec<Session>> {
        let url = format!("{}/api/agent-runs", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(workspace) = workspace {
            request = request.query(&[("workspace", workspace)]);
        }
        let response = request.send().await.map_err(ConsoleError::transport)?;
        let response = Self::checked(response).await?;
        let data: RunsResponse = response.json().await.map_err(ConsoleError::transport)?;
        Ok(data.runs)
    }

    async fn start_session(&self, request: &StartSessionRequest) -> ConsoleResult<Session> {
        let url = format!("{}/api/agent-runs", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(ConsoleError::transport)?;
        let response = Self::checked(response).await?;
        response.json().await.map_err(ConsoleError::transport)
    }

    async fn post_message(
        &self,
        workspace_path: &str,
        session_id: &SessionId,
        text: &str,
    ) -> ConsoleResult<Option<Session>> {
        let url = format!("{}/api/agent-runs/{}/messages", self.base_url, session_id);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(&PostMessageBody {
                workspace_path,
                text,
            })
            .send()
            .await
            .map_err(ConsoleError::transport)?;
        let response = Self::checked(response).await?;
        let body = response.text().await.map_err(ConsoleError::transport)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body).map_err(ConsoleError::transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parse_api_error_prefers_error_field() {
        assert_eq!(parse_api_error(r#"{"error":"workspace not found"}"#, 404), "workspace not found");
    }

    #[test]
    fn parse_api_error_reads_detail() {
        assert_eq!(parse_api_error(r#"{"detail":"bad prompt"}"#, 422), "bad prompt");
    }

    #[test]
    fn parse_api_error_reads_nested_message() {
        assert_eq!(
            parse_api_error(r#"{"error":{"message":"rate limited"}}"#, 429),
            "rate limited"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_status() {
        assert_eq!(parse_api_error("<html>oops</html>", 502), "HTTP 502");
        assert_eq!(parse_api_error(r#"{"error":""}"#, 500), "HTTP 500");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = HttpSessionApi::new("http://localhost:8787/");
        assert_eq!(api.base_url(), "http://localhost:8787");
    }

    #[test]
    fn start_request_omits_unset_options() {
        let value = serde_json::to_value(StartSessionRequest::new("/repo", "hi")).unwrap();
        assert_eq!(value, json!({"workspacePath": "/repo", "prompt": "hi"}));
    }

    // ── mock server ──────────────────────────────────────────────────

    #[tokio::test]
    async fn list_sessions_filters_by_workspace() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agent-runs"))
            .and(query_param("workspace", "/repo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "runs": [
                    {"id": "s2", "log": [{"entryId": "e1", "role": "user", "payload": "hi"}]},
                    {"id": "s1"}
                ]
            })))
            .mount(&server)
            .await;

        let api = HttpSessionApi::new(server.uri());
        let sessions = api.list_sessions(Some("/repo")).await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
        assert_eq!(sessions[0].log.len(), 1);
    }

    #[tokio::test]
    async fn list_sessions_surfaces_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agent-runs"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "store offline"})),
            )
            .mount(&server)
            .await;

        let api = HttpSessionApi::new(server.uri());
        let err = api.list_sessions(None).await.unwrap_err();
        assert_eq!(err, ConsoleError::Transport("store offline".into()));
    }

    #[tokio::test]
    async fn start_session_posts_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agent-runs"))
            .and(body_json(json!({
                "workspacePath": "/repo",
                "prompt": "add tests",
                "model": "opus"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "new-run"})))
            .mount(&server)
            .await;

        let api = HttpSessionApi::new(server.uri());
        let mut request = StartSessionRequest::new("/repo", "add tests");
        request.model = Some("opus".into());
        let session = api.start_session(&request).await.unwrap();
        assert_eq!(session.id.as_str(), "new-run");
    }

    #[tokio::test]
    async fn start_session_failure_uses_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agent-runs"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let api = HttpSessionApi::new(server.uri());
        let err = api
            .start_session(&StartSessionRequest::new("/repo", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503");
    }

    #[tokio::test]
    async fn post_message_returns_updated_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agent-runs/s1/messages"))
            .and(body_json(json!({"workspacePath": "/repo", "text": "go on"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "s1",
                "log": [{"entryId": "e9", "role": "user", "payload": {"text": "go on"}}]
            })))
            .mount(&server)
            .await;

        let api = HttpSessionApi::new(server.uri());
        let session = api
            .post_message("/repo", &SessionId::new("s1"), "go on")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.log[0].entry_id.as_deref(), Some("e9"));
    }

    #[tokio::test]
    async fn post_message_accepts_null_and_empty_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agent-runs/s1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/agent-runs/s2/messages"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let api = HttpSessionApi::new(server.uri());
        assert!(api
            .post_message("/repo", &SessionId::new("s1"), "x")
            .await
            .unwrap()
            .is_none());
        assert!(api
            .post_message("/repo", &SessionId::new("s2"), "x")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let api = HttpSessionApi::new("http://127.0.0.1:1");
        let err = api.list_sessions(None).await.unwrap_err();
        assert!(!err.is_validation());
        assert!(matches!(err, ConsoleError::Transport(_)));
    }
}
