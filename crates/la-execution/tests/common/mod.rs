#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use la_core::auth::{AuthGrant, AuthProvider, AuthUser, BackendApi, Organization};
use la_core::config::ExtensionConfig;
use la_core::error::{LaError, Result};
use la_core::message::{ChatReply, ChatRequest, StatusInfo};
use la_execution::{ExtensionHost, HostServices};
use la_infrastructure::MemoryStore;
use serde_json::json;

pub const WAIT: Duration = Duration::from_secs(2);
pub const EMAIL: &str = "student@example.com";
pub const PASSWORD: &str = "correct-horse";

/// Backend collaborator that counts every call.
#[derive(Default)]
pub struct CountingBackend {
    pub status_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
}

impl CountingBackend {
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendApi for CountingBackend {
    async fn check_status(&self, token: &str) -> Result<StatusInfo> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if token == "revoked" {
            return Err(LaError::NotAuthenticated);
        }
        Ok(StatusInfo {
            organization_id: Some("org1".into()),
            role: Some("STUDENT".into()),
            tier: Some("BASIC".into()),
            organization_name: None,
        })
    }

    async fn post_chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatReply {
            reply: format!("You asked about: {}", request.text),
        })
    }
}

/// Auth provider accepting exactly one password.
#[derive(Default)]
pub struct FakeAuth;

fn grant() -> AuthGrant {
    AuthGrant {
        access_token: "access-1".into(),
        refresh_token: Some("refresh-1".into()),
        expires_in: Some(3600),
        user: AuthUser {
            id: "user-1".into(),
            email: Some(EMAIL.into()),
            user_metadata: json!({}),
        },
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthGrant> {
        if email == EMAIL && password == PASSWORD {
            Ok(grant())
        } else {
            Err(LaError::auth("Invalid login credentials"))
        }
    }

    async fn send_email_otp(&self, _email: &str) -> Result<()> {
        Ok(())
    }

    async fn verify_email_otp(&self, _email: &str, _code: &str) -> Result<AuthGrant> {
        Ok(grant())
    }

    async fn authorize_url(&self, redirect_to: &str) -> Result<String> {
        Ok(format!("https://auth.invalid/authorize?redirect_to={redirect_to}"))
    }

    async fn complete_oauth(&self, _redirected_to: &str) -> Result<AuthGrant> {
        Ok(grant())
    }

    async fn get_user(&self, _access_token: &str) -> Result<AuthUser> {
        Ok(grant().user)
    }

    async fn sign_out(&self, _access_token: &str) -> Result<()> {
        Ok(())
    }

    async fn fetch_student_organizations(
        &self,
        _user_id: &str,
        _access_token: &str,
    ) -> Result<Vec<Organization>> {
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub host: ExtensionHost,
    pub store: MemoryStore,
    pub backend: Arc<CountingBackend>,
}

pub fn harness() -> Harness {
    harness_with_store(MemoryStore::new())
}

pub fn harness_with_store(store: MemoryStore) -> Harness {
    let backend = Arc::new(CountingBackend::default());
    let host = ExtensionHost::new(HostServices {
        store: Arc::new(store.clone()),
        backend: backend.clone(),
        auth: Arc::new(FakeAuth),
        web_auth: None,
        surface_opener: None,
        config: ExtensionConfig::default(),
    });
    Harness {
        host,
        store,
        backend,
    }
}
