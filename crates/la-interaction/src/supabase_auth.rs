//! SupabaseAuthClient - REST implementation of the auth provider.
//!
//! Uses the provider's GoTrue REST endpoints directly (password grant, email
//! OTP, implicit OAuth) plus PostgREST reads for memberships, content and
//! threads. Row-level security applies through the user's bearer token.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use la_core::auth::{AuthGrant, AuthProvider, AuthUser, Organization, StudentDataSource};
use la_core::config::ExtensionConfig;
use la_core::error::{LaError, Result};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::http::{build_client, error_text, map_send_error, provider_error_message};

const OAUTH_PROVIDER: &str = "google";
const STUDENT_ROLE: &str = "STUDENT";

/// Auth provider client configured from `SUPABASE_URL` / `SUPABASE_ANON_KEY`.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    client: Client,
    project_url: Option<String>,
    anon_key: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct MembershipRow {
    #[serde(default)]
    organization: Option<Organization>,
}

impl SupabaseAuthClient {
    pub fn new(config: &ExtensionConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        Ok(Self {
            client: build_client(timeout)?,
            project_url: config.supabase_url().ok(),
            anon_key: config.supabase_anon_key().ok(),
            timeout,
        })
    }

    fn project_url(&self) -> Result<&str> {
        self.project_url
            .as_deref()
            .ok_or_else(|| LaError::config_missing("SUPABASE_URL"))
    }

    fn anon_key(&self) -> Result<&str> {
        self.anon_key
            .as_deref()
            .ok_or_else(|| LaError::config_missing("SUPABASE_ANON_KEY"))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder> {
        let url = format!("{}{}", self.project_url()?, path);
        Ok(self
            .client
            .post(url)
            .header("apikey", self.anon_key()?)
            .header("content-type", "application/json"))
    }

    fn get(&self, path: &str, access_token: &str) -> Result<RequestBuilder> {
        let url = format!("{}{}", self.project_url()?, path);
        Ok(self
            .client
            .get(url)
            .header("apikey", self.anon_key()?)
            .bearer_auth(access_token))
    }

    /// Sends an auth exchange; non-success becomes `AuthFailure(fallback or body)`.
    async fn exchange(&self, request: RequestBuilder, context: &str, fallback: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|err| map_send_error(context, err, self.timeout))?;
        if !response.status().is_success() {
            let (status, body) = error_text(response).await;
            tracing::info!("[SupabaseAuth] {} rejected with {}", context, status);
            return Err(LaError::auth(provider_error_message(&body, fallback)));
        }
        Ok(response)
    }

    /// Authenticated PostgREST read of `table`, returning the raw rows.
    async fn rest_rows(
        &self,
        table: &str,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Value>> {
        let context = format!("Fetch {table}");
        let response = self
            .get(&format!("/rest/v1/{table}"), access_token)?
            .header("Accept-Profile", "public")
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|err| map_send_error(&context, err, self.timeout))?;

        if !response.status().is_success() {
            let (status, message) = error_text(response).await;
            return Err(LaError::network(
                Some(status.as_u16()),
                format!("Request failed: {} {message}", status.as_u16()),
            ));
        }

        response
            .json()
            .await
            .map_err(|err| LaError::network(None, format!("Failed to parse {table} rows: {err}")))
    }

    /// Probes the REST API with the anon key only.
    pub async fn check_connection(&self) -> Result<()> {
        let url = format!("{}/rest/v1/User", self.project_url()?);
        let response = self
            .client
            .get(url)
            .header("apikey", self.anon_key()?)
            .header("Accept", "application/json")
            .query(&[("select", "count"), ("limit", "1")])
            .send()
            .await
            .map_err(|err| map_send_error("Connection check", err, self.timeout))?;

        if !response.status().is_success() {
            let (status, message) = error_text(response).await;
            tracing::warn!("[SupabaseAuth] Connection check failed with {}", status);
            return Err(LaError::network(
                Some(status.as_u16()),
                format!("Connection check failed: {message}"),
            ));
        }
        tracing::info!("[SupabaseAuth] Connection check succeeded");
        Ok(())
    }

    async fn grant_from(&self, response: reqwest::Response) -> Result<AuthGrant> {
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| LaError::network(None, format!("Failed to parse token response: {err}")))?;
        let user = self.get_user(&token.access_token).await?;
        Ok(AuthGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            user,
        })
    }
}

/// Reads OAuth response parameters from the URL fragment, falling back to the
/// query string when the fragment has no access token.
pub fn parse_redirect_params(redirected_to: &str) -> HashMap<String, String> {
    let Ok(url) = Url::parse(redirected_to) else {
        return HashMap::new();
    };

    let mut params: HashMap<String, String> = url
        .fragment()
        .map(|fragment| {
            url::form_urlencoded::parse(fragment.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    if !params.contains_key("access_token") {
        params.extend(url.query_pairs().into_owned());
    }
    params
}

#[async_trait]
impl AuthProvider for SupabaseAuthClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthGrant> {
        let request = self
            .post("/auth/v1/token?grant_type=password")?
            .json(&json!({ "email": email, "password": password }));
        let response = self.exchange(request, "Sign-in", "Sign-in failed").await?;
        self.grant_from(response).await
    }

    async fn send_email_otp(&self, email: &str) -> Result<()> {
        let request = self
            .post("/auth/v1/otp")?
            .json(&json!({ "email": email, "create_user": false }));
        self.exchange(request, "Send code", "Failed to send code")
            .await?;
        Ok(())
    }

    async fn verify_email_otp(&self, email: &str, code: &str) -> Result<AuthGrant> {
        let request = self
            .post("/auth/v1/verify")?
            .json(&json!({ "type": "email", "email": email, "token": code }));
        let response = self.exchange(request, "Verify code", "Invalid code").await?;
        self.grant_from(response).await
    }

    async fn authorize_url(&self, redirect_to: &str) -> Result<String> {
        let mut url = Url::parse(&format!("{}/auth/v1/authorize", self.project_url()?))
            .map_err(|e| LaError::config_missing(format!("SUPABASE_URL is not a URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("provider", OAUTH_PROVIDER)
            .append_pair("redirect_to", redirect_to)
            .append_pair("response_type", "token");
        Ok(url.into())
    }

    async fn complete_oauth(&self, redirected_to: &str) -> Result<AuthGrant> {
        let params = parse_redirect_params(redirected_to);
        let access_token = params
            .get("access_token")
            .filter(|t| !t.is_empty())
            .cloned()
            .ok_or_else(|| LaError::auth("Authorization denied"))?;
        let expires_in = params.get("expires_in").and_then(|v| v.parse().ok());
        let refresh_token = params.get("refresh_token").cloned();

        let user = self.get_user(&access_token).await?;
        Ok(AuthGrant {
            access_token,
            refresh_token,
            expires_in,
            user,
        })
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let response = self
            .get("/auth/v1/user", access_token)?
            .send()
            .await
            .map_err(|err| map_send_error("Fetch user", err, self.timeout))?;
        if !response.status().is_success() {
            return Err(LaError::auth("Failed to fetch user"));
        }
        response
            .json()
            .await
            .map_err(|err| LaError::network(None, format!("Failed to parse user: {err}")))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .post("/auth/v1/logout")?
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| map_send_error("Sign-out", err, self.timeout))?;
        if !response.status().is_success() {
            tracing::debug!("[SupabaseAuth] logout returned {}", response.status());
        }
        Ok(())
    }

    async fn fetch_student_organizations(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<Vec<Organization>> {
        let rows = self
            .rest_rows(
                "Membership",
                access_token,
                &[
                    ("userId", format!("eq.{user_id}")),
                    ("role", format!("eq.{STUDENT_ROLE}")),
                    ("select", "organization:Organization(*)".to_string()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<MembershipRow>(row).ok())
            .filter_map(|row| row.organization)
            .collect())
    }
}

#[async_trait]
impl StudentDataSource for SupabaseAuthClient {
    async fn validate_student_access(
        &self,
        user_id: &str,
        organization_id: &str,
        access_token: &str,
    ) -> Result<bool> {
        let rows = self
            .rest_rows(
                "Membership",
                access_token,
                &[
                    ("userId", format!("eq.{user_id}")),
                    ("organizationId", format!("eq.{organization_id}")),
                    ("select", "role".to_string()),
                ],
            )
            .await?;
        Ok(rows
            .iter()
            .any(|row| row.get("role").and_then(Value::as_str) == Some(STUDENT_ROLE)))
    }

    async fn fetch_organization_content(
        &self,
        organization_id: &str,
        access_token: &str,
    ) -> Result<Vec<Value>> {
        self.rest_rows(
            "content",
            access_token,
            &[
                ("organizationId", format!("eq.{organization_id}")),
                ("select", "*".to_string()),
                ("order", "createdAt.desc".to_string()),
            ],
        )
        .await
    }

    async fn fetch_student_threads(
        &self,
        user_id: &str,
        organization_id: &str,
        access_token: &str,
    ) -> Result<Vec<Value>> {
        self.rest_rows(
            "threads",
            access_token,
            &[
                ("userId", format!("eq.{user_id}")),
                ("organizationId", format!("eq.{organization_id}")),
                ("select", "*".to_string()),
                ("order", "createdAt.desc".to_string()),
            ],
        )
        .await
    }
}
