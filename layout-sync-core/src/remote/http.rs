//! HTTP/JSON implementation of [`RemoteLayoutClient`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;

use super::{LayoutPatch, NewRemoteLayout, RemoteLayoutClient, UpdateOutcome};
use crate::error::RemoteError;
use crate::models::{LayoutId, Namespace, RemoteLayout};

/// Timeout for a whole request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for establishing a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for the reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Layout client for the layouts REST API.
#[derive(Debug, Clone)]
pub struct HttpLayoutClient {
    client: Client,
    server_url: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    namespace: &'a str,
    #[serde(flatten)]
    layout: NewRemoteLayout,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    expected_saved_at: DateTime<Utc>,
    #[serde(flatten)]
    patch: LayoutPatch,
}

impl HttpLayoutClient {
    pub fn new(server_url: String, api_key: String) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            server_url,
            api_key,
        })
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn layouts_url(&self) -> String {
        build_http_url(&self.server_url, "/v1/layouts")
    }

    fn layout_url(&self, id: &LayoutId) -> String {
        build_http_url(
            &self.server_url,
            &format!("/v1/layouts/{}", urlencoding::encode(id.as_str())),
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

#[async_trait]
impl RemoteLayoutClient for HttpLayoutClient {
    async fn list_layouts(&self, namespace: &Namespace) -> Result<Vec<RemoteLayout>, RemoteError> {
        let url = format!(
            "{}?namespace={}",
            self.layouts_url(),
            urlencoding::encode(namespace.as_str())
        );
        let response = self
            .client
            .get(url)
            .header("Authorization", self.bearer())
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn get_layout(&self, id: &LayoutId) -> Result<Option<RemoteLayout>, RemoteError> {
        let response = self
            .client
            .get(self.layout_url(id))
            .header("Authorization", self.bearer())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn create_layout(
        &self,
        namespace: &Namespace,
        layout: NewRemoteLayout,
    ) -> Result<RemoteLayout, RemoteError> {
        let body = CreateRequest {
            namespace: namespace.as_str(),
            layout,
        };

        let response = self
            .client
            .post(self.layouts_url())
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn update_layout(
        &self,
        id: &LayoutId,
        expected_saved_at: DateTime<Utc>,
        patch: LayoutPatch,
    ) -> Result<UpdateOutcome, RemoteError> {
        let body = UpdateRequest {
            expected_saved_at,
            patch,
        };

        let response = self
            .client
            .patch(self.layout_url(id))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => Ok(UpdateOutcome::Conflict),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(id.clone())),
            _ => {
                let response = ensure_success(response).await?;
                Ok(UpdateOutcome::Success(response.json().await?))
            }
        }
    }

    async fn delete_layout(&self, id: &LayoutId) -> Result<bool, RemoteError> {
        let response = self
            .client
            .delete(self.layout_url(id))
            .header("Authorization", self.bearer())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        ensure_success(response).await?;
        Ok(true)
    }
}

/// Maps non-success responses onto [`RemoteError`].
async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status, body))
}

fn error_for_status(status: StatusCode, body: String) -> RemoteError {
    let message = if body.is_empty() {
        format!("Server returned status {}", status)
    } else {
        format!("Server returned status {}: {}", status, body)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => RemoteError::Network(message),
        s if s.is_server_error() => RemoteError::Network(message),
        _ => RemoteError::InvalidResponse(message),
    }
}

/// Builds an HTTP URL for a given path, accepting bare hosts.
fn build_http_url(server_url: &str, path: &str) -> String {
    let base_url = if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        format!("http://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Checks whether the layouts server answers its health endpoint.
pub async fn check_server(server_url: &str) -> bool {
    let client = match Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(_) => return false,
    };

    match client.get(build_http_url(server_url, "/health")).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!("Server probe failed: {}", e);
            false
        }
    }
}
