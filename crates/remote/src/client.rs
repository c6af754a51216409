use std::time::Duration;

use async_trait::async_trait;
use deck_core::resource::{ResourceBatch, ResourceId, ResourceKind};
use deck_core::sync::RemoteApi;
use deck_core::{Error, Result};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone)]
pub struct RestClientConfig {
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Option<Duration>,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct Registration<'a> {
    email: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Client for the board server's REST API
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(config: RestClientConfig) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        self.url(&format!("api/{}/", kind.collection()))
    }

    fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.header(AUTHORIZATION, format!("Token {}", token)),
            None => request,
        }
    }

    async fn send(request: RequestBuilder, action: &str) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to reach server to {}: {}", action, e)))
    }

    /// Turn a response with an unexpected status into a transport error
    async fn expect(response: Response, accepted: fn(StatusCode) -> bool, action: &str) -> Result<Response> {
        let status = response.status();
        if accepted(status) {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("Server refused to {}: {} {}", action, status, body);
        Err(Error::Transport(format!(
            "Unable to {}, got status {}: {}",
            action, status, body
        )))
    }

    async fn push(
        &self,
        request: RequestBuilder,
        token: Option<&str>,
        accepted: fn(StatusCode) -> bool,
        action: &str,
    ) -> Result<()> {
        let response = Self::send(Self::authorize(request, token), action).await?;
        Self::expect(response, accepted, action).await?;
        Ok(())
    }
}

fn is_created(status: StatusCode) -> bool {
    status == StatusCode::CREATED
}

fn is_success(status: StatusCode) -> bool {
    status.is_success()
}

fn is_ok(status: StatusCode) -> bool {
    status == StatusCode::OK
}

/// First human-readable message in an error body
fn first_message(body: &Value) -> Option<String> {
    match body {
        Value::String(message) => Some(message.clone()),
        Value::Array(items) => items.iter().find_map(first_message),
        Value::Object(fields) => fields.values().find_map(first_message),
        _ => None,
    }
}

fn error_message(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|body| first_message(&body))
        .unwrap_or_else(|| raw.trim().to_string())
}

#[async_trait]
impl RemoteApi for RestClient {
    async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        debug!("Authenticating {}", username);
        let request = self
            .client
            .post(self.url("api/token-auth/"))
            .json(&Credentials { username, password });
        let response = Self::send(request, "authenticate").await?;

        let status = response.status();
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Authentication(error_message(&body)))
            }
            status if status.is_success() => {
                let body: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::Transport(format!("Invalid token response: {}", e)))?;
                Ok(body.token)
            }
            status => Err(Error::Transport(format!(
                "Unable to authenticate, got status {}",
                status
            ))),
        }
    }

    async fn register(&self, email: &str, username: &str, password: &str) -> Result<()> {
        debug!("Registering {}", username);
        let request = self.client.post(self.url("api/register")).json(&Registration {
            email,
            username,
            password,
        });
        let response = Self::send(request, "register").await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            return Err(Error::Validation(error_message(&body)));
        }
        Err(Error::Transport(format!(
            "Unable to register, got status {}: {}",
            status, body
        )))
    }

    async fn list(&self, token: Option<&str>, kind: ResourceKind) -> Result<ResourceBatch> {
        let action = format!("list {}", kind.collection());
        debug!("GET {}", self.collection_url(kind));

        let request = Self::authorize(self.client.get(self.collection_url(kind)), token);
        let response = Self::send(request, &action).await?;
        let response = Self::expect(response, is_ok, &action).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("Invalid {} response: {}", kind.collection(), e)))?;
        ResourceBatch::from_wire(kind, &body)
    }

    async fn create(&self, token: Option<&str>, batch: &ResourceBatch) -> Result<()> {
        let kind = batch.kind();
        debug!("POST {} ({} records)", self.collection_url(kind), batch.len());
        let request = self.client.post(self.collection_url(kind)).json(&batch.to_wire()?);
        self.push(request, token, is_created, &format!("add {}", kind.collection()))
            .await
    }

    async fn update(&self, token: Option<&str>, batch: &ResourceBatch) -> Result<()> {
        let kind = batch.kind();
        debug!("PUT {} ({} records)", self.collection_url(kind), batch.len());
        let request = self.client.put(self.collection_url(kind)).json(&batch.to_wire()?);
        self.push(request, token, is_success, &format!("update {}", kind.collection()))
            .await
    }

    async fn delete(&self, token: Option<&str>, kind: ResourceKind, ids: &[ResourceId]) -> Result<()> {
        debug!("DELETE {} ({} ids)", self.collection_url(kind), ids.len());
        let request = self.client.delete(self.collection_url(kind)).json(ids);
        self.push(request, token, is_success, &format!("remove {}", kind.collection()))
            .await
    }
}
