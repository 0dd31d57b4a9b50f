//! BackendClient - REST client for the status and chat endpoints.

use std::time::Duration;

use async_trait::async_trait;
use la_core::auth::BackendApi;
use la_core::config::ExtensionConfig;
use la_core::error::{LaError, Result};
use la_core::message::{ChatReply, ChatRequest, StatusInfo};
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::http::{build_client, error_text, map_http_error, map_send_error};

const CHECK_STATUS_PATH: &str = "/api/auth/check-status";
const CHAT_PATH: &str = "/api/student/chat";

/// Talks to the Learning Assistant backend with a bearer token.
///
/// The base URL is resolved per call so that a missing `API_BASE_URL`
/// surfaces as `ConfigMissing` on the request that needed it.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody<'a> {
    organization_id: Option<&'a str>,
    message: &'a str,
    thread_id: &'a str,
}

impl BackendClient {
    pub fn new(config: &ExtensionConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        Ok(Self {
            client: build_client(timeout)?,
            base_url: config.api_base_url().ok(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> Result<String> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| LaError::config_missing("API_BASE_URL"))?;
        Ok(format!("{}{}", base.trim_end_matches('/'), path))
    }

    async fn call<B, T>(&self, method: Method, path: &str, token: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if token.is_empty() {
            return Err(LaError::NotAuthenticated);
        }
        let url = self.url(path)?;

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(token)
            .header("content-type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| map_send_error(path, err, self.timeout))?;

        if !response.status().is_success() {
            let (status, message) = error_text(response).await;
            tracing::debug!("[BackendClient] {} -> {}: {}", path, status, message);
            return Err(map_http_error(status, message));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| LaError::network(None, format!("Failed to parse {path} response: {err}")))
    }
}

#[async_trait]
impl BackendApi for BackendClient {
    async fn check_status(&self, token: &str) -> Result<StatusInfo> {
        self.call::<(), StatusInfo>(Method::GET, CHECK_STATUS_PATH, token, None)
            .await
    }

    async fn post_chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let body = ChatBody {
            organization_id: request.organization_id.as_deref(),
            message: &request.text,
            thread_id: &request.thread_id,
        };
        self.call(Method::POST, CHAT_PATH, &request.token, Some(&body))
            .await
    }
}
