//! End-to-end flows across the background, page and popup contexts.

mod common;

use std::sync::Arc;

use common::{EMAIL, PASSWORD, WAIT, harness, harness_with_store};
use la_application::page::{GREETING, GateState, MessageRole};
use la_core::config::ExtensionConfig;
use la_core::lifecycle::InstallReason;
use la_core::message::{ChangeEvent, RuntimeMessage};
use la_core::session::{SESSION_KEY, Session, StoredSession};
use la_core::store::{KeyValueStore, single_item};
use la_execution::{ExtensionHost, HostServices};
use la_infrastructure::{JsonFileStore, MemoryStore};
use serde_json::json;

const PAGE: &str = "https://www.skool.com/digital-marketing/classroom";

fn greeting_count(lines: &[la_application::TranscriptLine]) -> usize {
    lines.iter().filter(|l| l.text == GREETING).count()
}

#[tokio::test]
async fn cold_start_shows_signed_out_widget() {
    let h = harness();
    h.host.install(InstallReason::Install).await;

    let page = h.host.open_page(PAGE).await.unwrap();
    page.wait_for_gate(GateState::Unauthenticated, WAIT)
        .await
        .unwrap();

    let snapshot = page.snapshot().await.unwrap();
    assert!(snapshot.overlay_visible);
    assert!(!snapshot.input_enabled);
    assert!(snapshot.transcript.is_empty());
    assert_eq!(snapshot.quota, "10/10 messages");
    h.host.shutdown().await;
}

#[tokio::test]
async fn pages_outside_scope_get_no_widget() {
    let h = harness();
    assert!(h.host.open_page("https://example.com/").await.is_none());
    assert!(h.host.open_page("http://www.skool.com/").await.is_none());
    assert!(h.host.open_page("https://skool.com/").await.is_some());
    h.host.shutdown().await;
}

#[tokio::test]
async fn full_login_unlocks_open_pages() {
    let h = harness();
    h.host.startup().await;
    let page = h.host.open_page(PAGE).await.unwrap();
    page.wait_for_gate(GateState::Unauthenticated, WAIT)
        .await
        .unwrap();

    let mut popup = h.host.popup();
    let session = popup.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(popup.status(), format!("Signed in as {EMAIL}"));

    assert!(session.validated);
    assert_eq!(session.source.as_deref(), Some("supabase"));
    assert_eq!(session.user.organization_id.as_deref(), Some("org1"));
    assert_eq!(session.user.role.as_deref(), Some("STUDENT"));
    assert_eq!(session.user.tier.as_deref(), Some("BASIC"));
    assert_eq!(h.backend.status_calls(), 1);

    let stored = h.host.sessions().load().await.unwrap();
    assert_eq!(stored, StoredSession::Present(session));

    page.wait_for_gate(GateState::Authenticated, WAIT)
        .await
        .unwrap();
    let snapshot = page.snapshot().await.unwrap();
    assert!(snapshot.input_enabled);
    assert!(!snapshot.overlay_visible);
    assert_eq!(snapshot.signed_in_as.as_deref(), Some(EMAIL));
    assert_eq!(greeting_count(&snapshot.transcript), 1);

    let reply = page.send_message("What is SEO?").await.unwrap();
    assert_eq!(reply.as_deref(), Some("You asked about: What is SEO?"));
    assert_eq!(h.backend.chat_calls(), 1);
    assert_eq!(page.snapshot().await.unwrap().quota, "9/10 messages");
    h.host.shutdown().await;
}

#[tokio::test]
async fn startup_sweeps_unvalidated_record() {
    let store = MemoryStore::new();
    store
        .set(single_item(SESSION_KEY, json!({ "token": "t", "validated": false })))
        .await
        .unwrap();
    let h = harness_with_store(store);

    h.host.startup().await;
    assert!(h.store.snapshot().await.get(SESSION_KEY).is_none());

    let page = h.host.open_page(PAGE).await.unwrap();
    page.wait_for_gate(GateState::Unauthenticated, WAIT)
        .await
        .unwrap();
    h.host.shutdown().await;
}

#[tokio::test]
async fn chat_without_session_never_reaches_backend() {
    let h = harness();
    h.host.startup().await;
    let page = h.host.open_page(PAGE).await.unwrap();
    page.wait_for_gate(GateState::Unauthenticated, WAIT)
        .await
        .unwrap();

    let err = page.send_message("hello").await.unwrap_err();
    assert!(err.is_not_authenticated());
    assert_eq!(h.backend.chat_calls(), 0);
    h.host.shutdown().await;
}

#[tokio::test]
async fn mock_session_update_signs_every_page_out() {
    let h = harness();
    h.host.startup().await;
    let first = h.host.open_page(PAGE).await.unwrap();
    let second = h.host.open_page("https://community.skool.com/").await.unwrap();

    h.host
        .popup()
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap();
    first.wait_for_gate(GateState::Authenticated, WAIT).await.unwrap();
    second.wait_for_gate(GateState::Authenticated, WAIT).await.unwrap();

    let Some(mut mock) = h.host.sessions().load().await.unwrap().into_valid() else {
        panic!("expected a stored session");
    };
    mock.token = "mock-token".into();
    h.host
        .bus()
        .send_message(RuntimeMessage::SessionUpdated(ChangeEvent::updated(mock)))
        .await;

    first.wait_for_gate(GateState::Unauthenticated, WAIT).await.unwrap();
    second.wait_for_gate(GateState::Unauthenticated, WAIT).await.unwrap();
    assert!(h.store.snapshot().await.get(SESSION_KEY).is_none());
    h.host.shutdown().await;
}

#[tokio::test]
async fn loosely_shaped_mock_update_still_signs_pages_out() {
    for payload in [
        json!({ "token": "mock-token", "user": null, "validated": null }),
        json!({ "token": null, "validated": true }),
    ] {
        let h = harness();
        h.host.startup().await;
        let page = h.host.open_page(PAGE).await.unwrap();
        h.host
            .popup()
            .sign_in_with_password(EMAIL, PASSWORD)
            .await
            .unwrap();
        page.wait_for_gate(GateState::Authenticated, WAIT).await.unwrap();

        let reply = h
            .host
            .bus()
            .send_value(json!({ "type": "LA_SESSION_UPDATED", "payload": payload }))
            .await
            .unwrap();
        assert!(reply.is_none());

        page.wait_for_gate(GateState::Unauthenticated, WAIT)
            .await
            .unwrap();
        assert!(h.store.snapshot().await.get(SESSION_KEY).is_none());
        h.host.shutdown().await;
    }
}

#[tokio::test]
async fn pages_converge_regardless_of_mount_order() {
    let h = harness();
    let early = h.host.open_page("https://a.skool.com/").await.unwrap();
    h.host.startup().await;
    let late = h.host.open_page("https://b.skool.com/").await.unwrap();

    h.host
        .popup()
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap();

    early.wait_for_gate(GateState::Authenticated, WAIT).await.unwrap();
    late.wait_for_gate(GateState::Authenticated, WAIT).await.unwrap();

    // A page opened after login adopts the stored session at bootstrap.
    let after = h.host.open_page("https://c.skool.com/").await.unwrap();
    let status = after
        .wait_for_gate(GateState::Authenticated, WAIT)
        .await
        .unwrap();
    assert_eq!(status.events_applied, 0);
    h.host.shutdown().await;
}

#[tokio::test]
async fn repeated_event_is_idempotent_and_greets_once() {
    let h = harness();
    h.host.startup().await;
    let page = h.host.open_page(PAGE).await.unwrap();
    page.wait_for_gate(GateState::Unauthenticated, WAIT)
        .await
        .unwrap();

    let session = h
        .host
        .popup()
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap();
    page.wait_until(WAIT, |s| s.events_applied == 1).await.unwrap();
    let once = page.snapshot().await.unwrap();

    let event = ChangeEvent::updated(session.clone());
    h.host
        .bus()
        .send_message(RuntimeMessage::SessionUpdated(event))
        .await;
    page.wait_until(WAIT, |s| s.events_applied == 2).await.unwrap();
    let twice = page.snapshot().await.unwrap();
    assert_eq!(once.gate, twice.gate);
    assert_eq!(once.transcript, twice.transcript);

    // Sign out and back in: still a single greeting.
    h.host
        .bus()
        .send_message(RuntimeMessage::SessionUpdated(ChangeEvent::signed_out()))
        .await;
    page.wait_until(WAIT, |s| s.events_applied == 3).await.unwrap();
    h.host
        .bus()
        .send_message(RuntimeMessage::SessionUpdated(ChangeEvent::updated(session)))
        .await;
    let status = page.wait_until(WAIT, |s| s.events_applied == 4).await.unwrap();
    assert_eq!(status.gate, GateState::Authenticated);

    let snapshot = page.snapshot().await.unwrap();
    assert_eq!(greeting_count(&snapshot.transcript), 1);
    assert_eq!(snapshot.transcript[0].role, MessageRole::Assistant);
    h.host.shutdown().await;
}

#[tokio::test]
async fn popup_sign_out_clears_store_without_broadcast() {
    let h = harness();
    h.host.startup().await;
    let page = h.host.open_page(PAGE).await.unwrap();

    let mut popup = h.host.popup();
    popup.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();
    page.wait_for_gate(GateState::Authenticated, WAIT).await.unwrap();

    popup.sign_out().await.unwrap();
    assert!(h.store.snapshot().await.get(SESSION_KEY).is_none());
    assert_eq!(page.status().gate, GateState::Authenticated);

    let fresh = h.host.open_page(PAGE).await.unwrap();
    fresh
        .wait_for_gate(GateState::Unauthenticated, WAIT)
        .await
        .unwrap();
    h.host.shutdown().await;
}

#[tokio::test]
async fn popup_load_revalidates_stored_session_once() {
    let h = harness();
    h.host.startup().await;
    h.host
        .popup()
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap();
    assert_eq!(h.backend.status_calls(), 1);

    let mut reopened = h.host.popup();
    assert!(reopened.load().await);
    assert!(reopened.is_signed_in());
    assert_eq!(h.backend.status_calls(), 2);

    let Some(mut revoked) = h.host.sessions().load().await.unwrap().into_valid() else {
        panic!("expected a stored session");
    };
    revoked.token = "revoked".into();
    h.host.sessions().save(&revoked).await.unwrap();

    let mut reopened = h.host.popup();
    assert!(!reopened.load().await);
    assert!(h.store.snapshot().await.get(SESSION_KEY).is_none());
    h.host.shutdown().await;
}

#[tokio::test]
async fn chat_survives_background_restart() {
    let h = harness();
    h.host.startup().await;
    let page = h.host.open_page(PAGE).await.unwrap();
    h.host
        .popup()
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap();
    page.wait_for_gate(GateState::Authenticated, WAIT).await.unwrap();

    h.host.restart_background().await;
    let reply = page.send_message("still there?").await.unwrap();
    assert!(reply.is_some());
    h.host.shutdown().await;
}

#[tokio::test]
async fn durable_store_keeps_valid_session_across_hosts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let services = |store: JsonFileStore| HostServices {
        store: Arc::new(store),
        backend: Arc::new(common::CountingBackend::default()),
        auth: Arc::new(common::FakeAuth),
        web_auth: None,
        surface_opener: None,
        config: ExtensionConfig::default(),
    };

    let first = ExtensionHost::new(services(JsonFileStore::new(path.clone())));
    first.install(InstallReason::Install).await;
    let session: Session = first
        .popup()
        .sign_in_with_password(EMAIL, PASSWORD)
        .await
        .unwrap();
    first.shutdown().await;

    let second = ExtensionHost::new(services(JsonFileStore::new(path)));
    second.startup().await;
    assert_eq!(
        second.sessions().load().await.unwrap().into_valid(),
        Some(session)
    );
    let page = second.open_page(PAGE).await.unwrap();
    page.wait_for_gate(GateState::Authenticated, WAIT)
        .await
        .unwrap();
    second.shutdown().await;
}

#[tokio::test]
async fn closed_pages_are_not_retained() {
    let h = harness();
    h.host.startup().await;
    for n in 0..20 {
        let page = h
            .host
            .open_page(&format!("https://c{n}.skool.com/"))
            .await
            .unwrap();
        page.close();
    }

    let deadline = tokio::time::Instant::now() + WAIT;
    while h.host.live_pages().await > 0 {
        assert!(tokio::time::Instant::now() < deadline, "page loops kept running");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let _open = h.host.open_page(PAGE).await.unwrap();
    assert_eq!(h.host.live_pages().await, 1);
    h.host.shutdown().await;
}
