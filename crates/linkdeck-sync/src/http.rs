//! HTTP remote store
//!
//! `GET <endpoint>` fetches the canonical snapshot; a 404, an empty body or a
//! JSON `null` all mean nothing has been synced yet. `PUT <endpoint>` pushes a
//! [`PushRequest`] and expects the canonical snapshot back.

use crate::error::RemoteError;
use crate::remote::{PushRequest, RemoteStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote store over HTTP
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    endpoint: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpRemote {
    /// Create a client for `endpoint` with a per-request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            auth_token: None,
            timeout,
        })
    }

    /// Use a preconfigured client; `timeout` is only reported in errors
    #[must_use]
    pub fn with_client(client: Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            auth_token: None,
            timeout,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Endpoint URL
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn transport_error(&self, error: &reqwest::Error) -> RemoteError {
        if error.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else {
            RemoteError::Transport(error.to_string())
        }
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<String, RemoteError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;
        if !status.is_success() {
            return Err(RemoteError::status(status.as_u16(), body));
        }
        Ok(body)
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch(&self) -> Result<Option<Value>, RemoteError> {
        let response = self
            .authorize(self.client.get(&self.endpoint))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = self.read_body(response).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn push(&self, request: PushRequest) -> Result<Value, RemoteError> {
        tracing::debug!(endpoint = %self.endpoint, base_revision = request.base_revision, "pushing state");
        let response = self
            .authorize(self.client.put(&self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let body = self.read_body(response).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        if !value.is_object() {
            return Err(RemoteError::InvalidResponse(
                "push response is not an object".to_string(),
            ));
        }
        Ok(value)
    }
}
