//! Client for the third-party text-to-3D service used by custom orders.
//!
//! A generation is a vendor-side task: it is created from a prompt, then
//! polled until it reaches a terminal status. Polling here is bounded by a
//! timeout and can be cancelled by the caller.

use std::{future::Future, sync::Arc, time::Duration};

use reqwest::{header::CONTENT_TYPE, redirect, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{config::GenerationConfig, error::ApiError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ASSET_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_ASSET_REDIRECTS: usize = 5;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("generation API is not configured")]
    NotConfigured,

    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("asset URL not allowed: {0}")]
    AssetNotAllowed(String),

    #[error("model generation did not finish within {0:?}")]
    Timeout(Duration),

    #[error("model generation polling was cancelled")]
    Cancelled,
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::InvalidTaskId(_) | GenerationError::AssetNotAllowed(_) => {
                ApiError::BadRequest(e.to_string())
            }
            GenerationError::Api { status: 404, .. } => {
                ApiError::NotFound("Generation task not found".to_string())
            }
            GenerationError::Timeout(_) => ApiError::Timeout(e.to_string()),
            GenerationError::NotConfigured | GenerationError::Cancelled => {
                ApiError::Internal(e.to_string())
            }
            GenerationError::Http(_) | GenerationError::Api { .. } => ApiError::Upstream(e.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    #[serde(rename = "pending", alias = "PENDING")]
    Pending,
    #[serde(rename = "in_progress", alias = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "succeeded", alias = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "failed", alias = "FAILED")]
    Failed,
    #[serde(rename = "canceled", alias = "CANCELED")]
    Canceled,
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled)
    }
}

#[derive(Debug, Deserialize, Default)]
struct ModelUrls {
    glb: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct VendorTask {
    id: String,
    status: TaskStatus,
    #[serde(default)]
    progress: u8,
    #[serde(default)]
    model_urls: Option<ModelUrls>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    task_error: Option<TaskError>,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    result: String,
}

#[derive(Debug, Deserialize)]
struct VendorErrorBody {
    message: String,
}

/// What the storefront sees of a generation task.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub model_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub error: Option<String>,
}

impl From<VendorTask> for TaskSnapshot {
    fn from(task: VendorTask) -> Self {
        TaskSnapshot {
            task_id: task.id,
            status: task.status,
            progress: task.progress.min(100),
            model_url: task.model_urls.and_then(|urls| urls.glb),
            thumbnail_url: task.thumbnail_url,
            error: task
                .task_error
                .map(|e| e.message)
                .filter(|message| !message.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct GenerationClient {
    inner: Arc<GenerationClientInner>,
}

struct GenerationClientInner {
    http: reqwest::Client,
    assets: reqwest::Client,
    api_url: String,
    api_key: String,
    asset_hosts: Vec<String>,
    policy: PollPolicy,
}

impl GenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let asset_hosts: Vec<String> =
            config.asset_hosts.iter().map(|h| h.to_ascii_lowercase()).collect();

        // Every redirect hop must stay on an allowed asset host.
        let redirect_hosts = asset_hosts.clone();
        let assets = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .redirect(redirect::Policy::custom(move |attempt| {
                if attempt.previous().len() >= MAX_ASSET_REDIRECTS {
                    attempt.stop()
                } else if asset_url_allowed(&redirect_hosts, attempt.url()) {
                    attempt.follow()
                } else {
                    warn!("Refused asset redirect to {}", attempt.url());
                    attempt.stop()
                }
            }))
            .build()?;

        Ok(GenerationClient {
            inner: Arc::new(GenerationClientInner {
                http,
                assets,
                api_url: config.api_url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
                asset_hosts,
                policy: PollPolicy {
                    interval: config.poll_interval,
                    timeout: config.poll_timeout,
                },
            }),
        })
    }

    pub fn policy(&self) -> PollPolicy {
        self.inner.policy
    }

    fn tasks_url(&self) -> String {
        format!("{}/v2/text-to-3d", self.inner.api_url)
    }

    fn ensure_configured(&self) -> Result<(), GenerationError> {
        if self.inner.api_key.is_empty() {
            return Err(GenerationError::NotConfigured);
        }
        Ok(())
    }

    pub async fn create_task(&self, prompt: &str) -> Result<String, GenerationError> {
        self.ensure_configured()?;

        let body = serde_json::json!({
            "mode": "preview",
            "prompt": prompt,
            "art_style": "realistic",
        });

        let response = self
            .inner
            .http
            .post(self.tasks_url())
            .bearer_auth(&self.inner.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let created: CreatedTask = handle_response(response).await?;
        info!("Started model generation task {}", created.result);
        Ok(created.result)
    }

    pub async fn task(&self, task_id: &str) -> Result<TaskSnapshot, GenerationError> {
        self.ensure_configured()?;
        check_task_id(task_id)?;

        let response = self
            .inner
            .http
            .get(format!("{}/{}", self.tasks_url(), task_id))
            .bearer_auth(&self.inner.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let task: VendorTask = handle_response(response).await?;
        Ok(task.into())
    }

    /// Polls `task_id` every `policy.interval` until it reaches a terminal
    /// status. Fails with `Timeout` after `policy.timeout` and with
    /// `Cancelled` as soon as `cancel` resolves.
    pub async fn wait_for_model<F>(
        &self,
        task_id: &str,
        policy: PollPolicy,
        cancel: F,
    ) -> Result<TaskSnapshot, GenerationError>
    where
        F: Future<Output = ()>,
    {
        let poll = self.poll_until_terminal(task_id, policy.interval);

        tokio::pin!(cancel);
        tokio::select! {
            biased;
            _ = &mut cancel => {
                debug!("Stopped polling task {}", task_id);
                Err(GenerationError::Cancelled)
            }
            result = tokio::time::timeout(policy.timeout, poll) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("Task {} still running after {:?}", task_id, policy.timeout);
                    Err(GenerationError::Timeout(policy.timeout))
                }
            },
        }
    }

    async fn poll_until_terminal(
        &self,
        task_id: &str,
        interval: Duration,
    ) -> Result<TaskSnapshot, GenerationError> {
        loop {
            let snapshot = self.task(task_id).await?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            debug!("Task {} at {}%", task_id, snapshot.progress);
            tokio::time::sleep(interval).await;
        }
    }

    /// Only generated assets on configured hosts may be proxied.
    pub fn check_asset_url(&self, raw: &str) -> Result<Url, GenerationError> {
        let url = Url::parse(raw).map_err(|_| GenerationError::AssetNotAllowed(raw.to_string()))?;
        if !asset_url_allowed(&self.inner.asset_hosts, &url) {
            return Err(GenerationError::AssetNotAllowed(raw.to_string()));
        }
        Ok(url)
    }

    /// Starts downloading an asset; the caller streams the body.
    pub async fn fetch_asset(&self, url: Url) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .inner
            .assets
            .get(url)
            .timeout(ASSET_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response)
    }
}

/// http(s) on a configured host or one of its subdomains.
fn asset_url_allowed(hosts: &[String], url: &Url) -> bool {
    if !matches!(url.scheme(), "https" | "http") {
        return false;
    }
    let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
        return false;
    };
    hosts
        .iter()
        .any(|allowed| host == *allowed || host.ends_with(&format!(".{}", allowed)))
}

pub fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("model/gltf-binary")
        .to_string()
}

fn check_task_id(task_id: &str) -> Result<(), GenerationError> {
    let valid = !task_id.is_empty()
        && task_id.len() <= 64
        && task_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(GenerationError::InvalidTaskId(task_id.to_string()))
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GenerationError> {
    if response.status().is_success() {
        return Ok(response.json().await?);
    }
    Err(api_error(response).await)
}

async fn api_error(response: reqwest::Response) -> GenerationError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<VendorErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    GenerationError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn client_for(server: &MockServer) -> GenerationClient {
        GenerationClient::new(&GenerationConfig {
            api_url: server.uri(),
            api_key: "test-key".to_string(),
            poll_interval: Duration::from_millis(10),
            poll_timeout: Duration::from_secs(5),
            asset_hosts: vec!["assets.example.com".to_string()],
        })
        .unwrap()
    }

    fn task_body(status: &str) -> serde_json::Value {
        json!({
            "id": "task-1",
            "status": status,
            "progress": if status == "SUCCEEDED" { 100 } else { 40 },
            "model_urls": { "glb": "https://assets.example.com/task-1/model.glb" },
            "thumbnail_url": "https://assets.example.com/task-1/preview.png"
        })
    }

    #[tokio::test]
    async fn create_task_sends_prompt_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/text-to-3d"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "prompt": "a ceramic owl" })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "result": "task-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server).create_task("a ceramic owl").await.unwrap();
        assert_eq!(id, "task-1");
    }

    #[tokio::test]
    async fn vendor_errors_surface_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({ "message": "No credits" })))
            .mount(&server)
            .await;

        match client_for(&server).create_task("a vase").await {
            Err(GenerationError::Api { status, message }) => {
                assert_eq!(status, 402);
                assert_eq!(message, "No credits");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn wait_returns_when_task_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/text-to-3d/task-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_body("IN_PROGRESS")))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/text-to-3d/task-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_body("SUCCEEDED")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let snapshot = client
            .wait_for_model("task-1", client.policy(), std::future::pending())
            .await
            .unwrap();

        assert_eq!(snapshot.status, TaskStatus::Succeeded);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(
            snapshot.model_url.as_deref(),
            Some("https://assets.example.com/task-1/model.glb")
        );
    }

    #[tokio::test]
    async fn wait_reports_failure_as_terminal_snapshot() {
        let server = MockServer::start().await;
        let mut body = task_body("FAILED");
        body["task_error"] = json!({ "message": "Prompt rejected" });
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let snapshot = client
            .wait_for_model("task-1", client.policy(), std::future::pending())
            .await
            .unwrap();
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("Prompt rejected"));
    }

    #[tokio::test]
    async fn wait_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_body("PENDING")))
            .mount(&server)
            .await;

        let policy = PollPolicy {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        };
        let result = client_for(&server)
            .wait_for_model("task-1", policy, std::future::pending())
            .await;
        assert!(matches!(result, Err(GenerationError::Timeout(_))));
    }

    #[tokio::test]
    async fn wait_stops_on_cancel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_body("IN_PROGRESS")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .wait_for_model(
                "task-1",
                client.policy(),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await;
        assert!(matches!(result, Err(GenerationError::Cancelled)));
    }

    #[tokio::test]
    async fn rejects_path_like_task_ids() {
        let server = MockServer::start().await;
        let result = client_for(&server).task("../admin").await;
        assert!(matches!(result, Err(GenerationError::InvalidTaskId(_))));
    }

    #[test]
    fn unknown_vendor_status_keeps_polling() {
        let status: TaskStatus = serde_json::from_str("\"QUEUED\"").unwrap();
        assert_eq!(status, TaskStatus::Unknown);
        assert!(!status.is_terminal());
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"in_progress\"");
    }

    #[tokio::test]
    async fn asset_urls_limited_to_configured_hosts() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        assert!(client.check_asset_url("https://assets.example.com/a/model.glb").is_ok());
        assert!(client.check_asset_url("https://cdn.assets.example.com/a.glb").is_ok());
        assert!(client.check_asset_url("https://evil.test/model.glb").is_err());
        assert!(client.check_asset_url("https://assets.example.com.evil.test/m.glb").is_err());
        assert!(client.check_asset_url("file:///etc/passwd").is_err());
        assert!(client.check_asset_url("not a url").is_err());
    }

    fn asset_client(server: &MockServer) -> GenerationClient {
        GenerationClient::new(&GenerationConfig {
            api_url: server.uri(),
            api_key: "test-key".to_string(),
            poll_interval: Duration::from_millis(10),
            poll_timeout: Duration::from_secs(1),
            asset_hosts: vec!["127.0.0.1".to_string()],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn asset_redirects_off_the_allowed_hosts_are_not_followed() {
        let server = MockServer::start().await;
        let port = server.address().port();
        Mock::given(method("GET"))
            .and(path("/task-1/model.glb"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("http://localhost:{}/secret", port).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("internal"))
            .expect(0)
            .mount(&server)
            .await;

        let client = asset_client(&server);
        let url = client
            .check_asset_url(&format!("{}/task-1/model.glb", server.uri()))
            .unwrap();
        assert!(client.fetch_asset(url).await.is_err());
    }

    #[tokio::test]
    async fn asset_redirects_within_allowed_hosts_are_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task-1/model.glb"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/cdn/model.glb", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cdn/model.glb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"glTF".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let client = asset_client(&server);
        let url = client
            .check_asset_url(&format!("{}/task-1/model.glb", server.uri()))
            .unwrap();
        let response = client.fetch_asset(url).await.unwrap();
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"glTF");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let server = MockServer::start().await;
        let client = GenerationClient::new(&GenerationConfig {
            api_url: server.uri(),
            api_key: String::new(),
            poll_interval: Duration::from_millis(10),
            poll_timeout: Duration::from_secs(1),
            asset_hosts: vec![],
        })
        .unwrap();
        assert!(matches!(client.create_task("x").await, Err(GenerationError::NotConfigured)));
    }
}
