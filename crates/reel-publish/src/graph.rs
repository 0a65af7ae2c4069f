//! Graph API transports for the page video feed and short-form reels.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info_span, Instrument};

use reel_models::Platform;

use crate::api::{truncate_caption, PlatformApi, ProcessingStatus, Submission};
use crate::error::{PublishError, PublishResult};
use crate::metrics::record_request;

/// Default Graph API host.
pub const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com";
/// Default Graph API version.
pub const DEFAULT_API_VERSION: &str = "v23.0";

/// Graph API client configuration.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Host, without version
    pub base_url: String,
    /// Version path segment, e.g. "v23.0"
    pub api_version: String,
    /// Long-lived user/page access token
    pub access_token: String,
    /// Page that receives feed videos
    pub page_id: Option<String>,
    /// Business account that receives reels
    pub instagram_id: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl GraphConfig {
    /// Create config from environment variables.
    pub fn from_env() -> PublishResult<Self> {
        let access_token = std::env::var("USER_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PublishError::config("USER_ACCESS_TOKEN not set"))?;

        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let timeout_secs: u64 = std::env::var("GRAPH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);

        Ok(Self {
            base_url: non_empty("GRAPH_API_BASE").unwrap_or_else(|| DEFAULT_GRAPH_BASE.to_string()),
            api_version: non_empty("API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            access_token,
            page_id: non_empty("FACEBOOK_PAGE_ID"),
            instagram_id: non_empty("INSTAGRAM_ID"),
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(10),
        })
    }
}

/// Shared HTTP plumbing for both Graph transports.
#[derive(Clone)]
pub struct GraphClient {
    http: Client,
    config: GraphConfig,
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> PublishResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("reel-publish/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PublishError::Network)?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version.trim_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post_form(&self, operation: &str, path: &str, form: &[(&str, &str)]) -> PublishResult<Value> {
        let url = self.url(path);
        let mut fields: Vec<(&str, &str)> = vec![("access_token", self.config.access_token.as_str())];
        fields.extend_from_slice(form);

        let span = info_span!("graph_request", operation = %operation);
        async {
            let start = Instant::now();
            let response = self.http.post(&url).form(&fields).send().await?;
            self.read(operation, start, response).await
        }
        .instrument(span)
        .await
    }

    async fn get(&self, operation: &str, path: &str, query: &[(&str, &str)]) -> PublishResult<Value> {
        let url = self.url(path);
        let mut params: Vec<(&str, &str)> = vec![("access_token", self.config.access_token.as_str())];
        params.extend_from_slice(query);

        let span = info_span!("graph_request", operation = %operation);
        async {
            let start = Instant::now();
            let response = self.http.get(&url).query(&params).send().await?;
            self.read(operation, start, response).await
        }
        .instrument(span)
        .await
    }

    async fn read(&self, operation: &str, start: Instant, response: reqwest::Response) -> PublishResult<Value> {
        let status = response.status();
        let body = response.text().await?;
        record_request(operation, status.as_u16(), start.elapsed().as_secs_f64());
        debug!(operation, status = status.as_u16(), "Graph response");

        if !status.is_success() {
            return Err(PublishError::from_http_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| PublishError::invalid_response(format!("{operation}: {e}")))
    }
}

/// Pull the `id` field out of a Graph response.
fn extract_id(operation: &str, value: &Value) -> PublishResult<String> {
    match value.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PublishError::invalid_response(format!(
            "{operation}: response has no id: {value}"
        ))),
    }
}

/// Page video feed: a single `POST /{page}/videos` publishes by URL.
pub struct FeedVideoApi {
    client: GraphClient,
    page_id: String,
}

impl FeedVideoApi {
    pub fn new(client: GraphClient, page_id: impl Into<String>) -> Self {
        Self {
            client,
            page_id: page_id.into(),
        }
    }

    /// Build from the client's configured page id.
    pub fn from_client(client: GraphClient) -> PublishResult<Self> {
        let page_id = client
            .config()
            .page_id
            .clone()
            .ok_or_else(|| PublishError::config("FACEBOOK_PAGE_ID not set"))?;
        Ok(Self::new(client, page_id))
    }
}

#[async_trait]
impl PlatformApi for FeedVideoApi {
    fn platform(&self) -> Platform {
        Platform::FeedVideo
    }

    async fn create(&self, video_url: &str, caption: &str) -> PublishResult<Submission> {
        let path = format!("{}/videos", self.page_id);
        let value = self
            .client
            .post_form(
                "feed_videos",
                &path,
                &[("file_url", video_url), ("description", truncate_caption(caption))],
            )
            .await?;
        Ok(Submission::Published(extract_id("feed_videos", &value)?))
    }

    async fn status(&self, _remote_id: &str) -> PublishResult<ProcessingStatus> {
        // Feed videos are live as soon as they are created
        Ok(ProcessingStatus::Finished)
    }

    async fn publish(&self, remote_id: &str) -> PublishResult<String> {
        Ok(remote_id.to_string())
    }
}

/// Short-form reels: create a container, poll it, then publish it.
pub struct ShortFormApi {
    client: GraphClient,
    account_id: String,
}

impl ShortFormApi {
    pub fn new(client: GraphClient, account_id: impl Into<String>) -> Self {
        Self {
            client,
            account_id: account_id.into(),
        }
    }

    /// Build from the client's configured account id.
    pub fn from_client(client: GraphClient) -> PublishResult<Self> {
        let account_id = client
            .config()
            .instagram_id
            .clone()
            .ok_or_else(|| PublishError::config("INSTAGRAM_ID not set"))?;
        Ok(Self::new(client, account_id))
    }
}

/// Map a container `status_code` onto a processing status.
fn parse_status(value: &Value) -> ProcessingStatus {
    let code = value.get("status_code").and_then(Value::as_str).unwrap_or("");
    match code {
        "FINISHED" | "PUBLISHED" => ProcessingStatus::Finished,
        "EXPIRED" => ProcessingStatus::Expired,
        "ERROR" => {
            let detail = value
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("processing failed");
            ProcessingStatus::Error(detail.to_string())
        }
        _ => ProcessingStatus::Pending,
    }
}

#[async_trait]
impl PlatformApi for ShortFormApi {
    fn platform(&self) -> Platform {
        Platform::ShortForm
    }

    async fn create(&self, video_url: &str, caption: &str) -> PublishResult<Submission> {
        let path = format!("{}/media", self.account_id);
        let value = self
            .client
            .post_form(
                "reels_create",
                &path,
                &[
                    ("media_type", "REELS"),
                    ("video_url", video_url),
                    ("caption", truncate_caption(caption)),
                ],
            )
            .await?;
        Ok(Submission::Job(extract_id("reels_create", &value)?))
    }

    async fn status(&self, remote_id: &str) -> PublishResult<ProcessingStatus> {
        let value = self
            .client
            .get("reels_status", remote_id, &[("fields", "status_code,status")])
            .await?;
        Ok(parse_status(&value))
    }

    async fn publish(&self, remote_id: &str) -> PublishResult<String> {
        let path = format!("{}/media_publish", self.account_id);
        let value = self
            .client
            .post_form("reels_publish", &path, &[("creation_id", remote_id)])
            .await?;
        extract_id("reels_publish", &value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GraphClient {
        GraphClient::new(GraphConfig {
            base_url: server.uri(),
            api_version: "v23.0".to_string(),
            access_token: "tok".to_string(),
            page_id: Some("PAGE".to_string()),
            instagram_id: Some("IG".to_string()),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_feed_create_publishes_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v23.0/PAGE/videos"))
            .and(body_string_contains("file_url=https%3A%2F%2Fcdn.example.com%2Freel_42.mp4"))
            .and(body_string_contains("access_token=tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "987"})))
            .expect(1)
            .mount(&server)
            .await;

        let api = FeedVideoApi::from_client(client(&server)).unwrap();
        let submission = api
            .create("https://cdn.example.com/reel_42.mp4", "caption")
            .await
            .unwrap();
        assert_eq!(submission, Submission::Published("987".to_string()));
    }

    #[tokio::test]
    async fn test_feed_create_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v23.0/PAGE/videos"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Invalid parameter", "code": 100}
            })))
            .mount(&server)
            .await;

        let api = FeedVideoApi::from_client(client(&server)).unwrap();
        let err = api.create("https://x/y.mp4", "c").await.unwrap_err();
        assert_eq!(err.code(), Some(100));
        assert_eq!(err.http_status(), Some(400));
    }

    #[tokio::test]
    async fn test_reels_create_status_publish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v23.0/IG/media"))
            .and(body_string_contains("media_type=REELS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "C1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v23.0/C1"))
            .and(query_param("fields", "status_code,status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": "FINISHED", "id": "C1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v23.0/IG/media_publish"))
            .and(body_string_contains("creation_id=C1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "M9"})))
            .expect(1)
            .mount(&server)
            .await;

        let api = ShortFormApi::from_client(client(&server)).unwrap();
        assert_eq!(
            api.create("https://x/y.mp4", "c").await.unwrap(),
            Submission::Job("C1".to_string())
        );
        assert_eq!(api.status("C1").await.unwrap(), ProcessingStatus::Finished);
        assert_eq!(api.publish("C1").await.unwrap(), "M9");
    }

    #[tokio::test]
    async fn test_reels_publish_not_ready_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v23.0/IG/media_publish"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Media ID is not available", "code": 9007, "error_subcode": 2207027}
            })))
            .mount(&server)
            .await;

        let api = ShortFormApi::from_client(client(&server)).unwrap();
        let err = api.publish("C1").await.unwrap_err();
        assert_eq!(err.code(), Some(9007));
        assert_eq!(err.subcode(), Some(2207027));
    }

    #[tokio::test]
    async fn test_create_without_id_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v23.0/IG/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let api = ShortFormApi::from_client(client(&server)).unwrap();
        let err = api.create("https://x/y.mp4", "c").await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_status_codes() {
        assert_eq!(parse_status(&json!({"status_code": "IN_PROGRESS"})), ProcessingStatus::Pending);
        assert_eq!(parse_status(&json!({"status_code": "PUBLISHED"})), ProcessingStatus::Finished);
        assert_eq!(parse_status(&json!({"status_code": "EXPIRED"})), ProcessingStatus::Expired);
        assert_eq!(
            parse_status(&json!({"status_code": "ERROR", "status": "Error: unsupported codec"})),
            ProcessingStatus::Error("Error: unsupported codec".to_string())
        );
        assert_eq!(parse_status(&json!({})), ProcessingStatus::Pending);
    }

    #[test]
    fn test_missing_account_ids_rejected() {
        let client = GraphClient::new(GraphConfig {
            base_url: DEFAULT_GRAPH_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            access_token: "tok".to_string(),
            page_id: None,
            instagram_id: None,
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        })
        .unwrap();
        assert!(matches!(
            FeedVideoApi::from_client(client.clone()),
            Err(PublishError::Config(_))
        ));
        assert!(matches!(
            ShortFormApi::from_client(client),
            Err(PublishError::Config(_))
        ));
    }
}
