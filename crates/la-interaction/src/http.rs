//! Shared HTTP plumbing for the collaborator clients.

use std::time::Duration;

use la_core::error::{LaError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

/// Builds a client whose every request is bounded by `timeout`.
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LaError::internal(format!("Failed to build HTTP client: {e}")))
}

/// Maps a transport-level failure (DNS, connect, timeout).
pub(crate) fn map_send_error(context: &str, err: reqwest::Error, timeout: Duration) -> LaError {
    if err.is_timeout() {
        return LaError::Timeout {
            operation: context.to_string(),
            after_secs: timeout.as_secs(),
        };
    }
    LaError::network(None, format!("{context} failed: {err}"))
}

/// Reads the body of a non-success response for use as an error message.
pub(crate) async fn error_text(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.as_u16().to_string()
    } else {
        body
    };
    (status, message)
}

/// Maps a backend non-success status onto the error taxonomy.
pub(crate) fn map_http_error(status: StatusCode, message: String) -> LaError {
    match status {
        StatusCode::UNAUTHORIZED => LaError::NotAuthenticated,
        StatusCode::FORBIDDEN => LaError::AccessDenied(message),
        _ => LaError::network(Some(status.as_u16()), message),
    }
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Extracts the human-readable message from an auth provider error body.
pub(crate) fn provider_error_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(|b| b.error_description.or(b.msg).or(b.message))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_http_error() {
        assert_eq!(
            map_http_error(StatusCode::UNAUTHORIZED, "x".into()),
            LaError::NotAuthenticated
        );
        assert_eq!(
            map_http_error(StatusCode::FORBIDDEN, "Not a student".into()),
            LaError::AccessDenied("Not a student".into())
        );
        assert_eq!(
            map_http_error(StatusCode::BAD_GATEWAY, "upstream".into()),
            LaError::network(Some(502), "upstream")
        );
    }

    #[test]
    fn test_provider_error_message() {
        assert_eq!(
            provider_error_message(
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
                "Sign-in failed"
            ),
            "Invalid login credentials"
        );
        assert_eq!(
            provider_error_message(r#"{"msg":"Token has expired"}"#, "Invalid code"),
            "Token has expired"
        );
        assert_eq!(provider_error_message("<html>", "Sign-in failed"), "Sign-in failed");
    }
}
