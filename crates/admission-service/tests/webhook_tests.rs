//! Webhook ingestion integration tests.
//!
//! Drives `POST /api/v1/webhooks/video` end to end: signature checks,
//! event dispatch, duplicate delivery, and attach failures.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use admission_service::models::TicketState;
use admission_service::services::agent_attacher::mock::MockAttacher;
use admission_test_utils::webhooks::{
    other_event, participant_left, session_ended, session_started, signed,
};
use admission_test_utils::TestAdmissionServer;
use serde_json::Value;

const SECRET: &str = "webhook-secret-0123456789";

async fn post_event(server: &TestAdmissionServer, payload: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/api/v1/webhooks/video", server.url()))
        .json(payload)
        .send()
        .await
        .expect("webhook request should be sent")
}

#[tokio::test]
async fn test_session_started_connects_agent() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::spawn().await?;

    let response = post_event(&server, &session_started("m1", Some("agent-1"))).await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["outcome"], "connected");
    assert!(body.get("reason").is_none());

    let ticket = server
        .controller()
        .ticket("m1")
        .await?
        .expect("ticket should exist");
    assert_eq!(ticket.owner_id, "agent-1");
    assert_eq!(ticket.state, TicketState::Completed);
    assert_eq!(server.attacher().call_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_delivery_is_denied() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::spawn().await?;
    let event = session_started("m1", None);

    post_event(&server, &event).await;
    let response = post_event(&server, &event).await;

    // Acknowledged so the platform stops redelivering
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["outcome"], "denied");
    assert_eq!(body["reason"], "already_admitted");
    assert_eq!(server.attacher().call_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_deliveries_attach_once() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::builder()
        .attacher(MockAttacher::succeeding().with_delay(std::time::Duration::from_millis(200)))
        .spawn()
        .await?;
    let client = reqwest::Client::new();
    let event = session_started("m1", None);

    let requests = (0..20).map(|_| {
        client
            .post(format!("{}/api/v1/webhooks/video", server.url()))
            .json(&event)
            .send()
    });
    let responses = futures::future::join_all(requests).await;

    let mut connected = 0;
    for response in responses {
        let response = response?;
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await?;
        if body["outcome"] == "connected" {
            connected += 1;
        } else {
            assert_eq!(body["outcome"], "denied");
        }
    }

    assert_eq!(connected, 1);
    assert_eq!(server.attacher().call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_session_ended_releases_and_allows_readmission() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::spawn().await?;

    post_event(&server, &session_started("m1", None)).await;

    let response = post_event(&server, &session_ended("m1")).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["outcome"], "released");
    assert!(server.controller().ticket("m1").await?.is_none());

    let response = post_event(&server, &session_started("m1", None)).await;
    let body: Value = response.json().await?;
    assert_eq!(body["outcome"], "connected");
    assert_eq!(server.attacher().call_count(), 2);

    Ok(())
}

#[tokio::test]
async fn test_participant_left_releases_only_for_agent() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::spawn().await?;

    post_event(&server, &session_started("m1", Some("agent-1"))).await;

    let response = post_event(&server, &participant_left("m1", "alice")).await;
    let body: Value = response.json().await?;
    assert_eq!(body["outcome"], "ignored");
    assert!(server.controller().ticket("m1").await?.is_some());

    let response = post_event(&server, &participant_left("m1", "agent-1")).await;
    let body: Value = response.json().await?;
    assert_eq!(body["outcome"], "released");
    assert!(server.controller().ticket("m1").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_unrelated_events_are_ignored() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::spawn().await?;

    for event_type in ["call.created", "call.session_participant_joined", "message.new"] {
        let response = post_event(&server, &other_event(event_type)).await;
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await?;
        assert_eq!(body["outcome"], "ignored");
    }
    assert_eq!(server.attacher().call_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_session_start_without_meeting_id_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::spawn().await?;

    let response = post_event(&server, &other_event("call.session_started")).await;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(server.attacher().call_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_oversized_meeting_id_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::spawn().await?;
    let meeting_id = "m".repeat(300);

    let response = post_event(&server, &session_started(&meeting_id, None)).await;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(server.attacher().call_count(), 0);
    assert!(server.memory_store().is_empty().await);

    Ok(())
}

#[tokio::test]
async fn test_malformed_payload_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::spawn().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/webhooks/video", server.url()))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    Ok(())
}

#[tokio::test]
async fn test_failed_attach_returns_502_and_frees_meeting() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::builder()
        .attacher(MockAttacher::rejecting())
        .spawn()
        .await?;

    let response = post_event(&server, &session_started("m1", None)).await;

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "ATTACH_FAILED");
    assert!(server.controller().ticket("m1").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_unreachable_store_denies_admission() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::spawn().await?;
    server.memory_store().set_unavailable(true);

    let response = post_event(&server, &session_started("m1", None)).await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["outcome"], "denied");
    assert_eq!(body["reason"], "store_unavailable");
    assert_eq!(server.attacher().call_count(), 0);

    Ok(())
}

// ============================================================================
// Signature verification
// ============================================================================

#[tokio::test]
async fn test_signed_webhook_is_accepted() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::builder()
        .env("WEBHOOK_SECRET", SECRET)
        .spawn()
        .await?;
    let (body, (header, signature)) = signed(SECRET, &session_started("m1", None));

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/webhooks/video", server.url()))
        .header("content-type", "application/json")
        .header(header, signature)
        .body(body)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["outcome"], "connected");

    Ok(())
}

#[tokio::test]
async fn test_unsigned_webhook_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::builder()
        .env("WEBHOOK_SECRET", SECRET)
        .spawn()
        .await?;

    let response = post_event(&server, &session_started("m1", None)).await;

    assert_eq!(response.status(), 401);
    assert_eq!(server.attacher().call_count(), 0);
    assert!(server.controller().ticket("m1").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_webhook_signed_with_wrong_secret_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestAdmissionServer::builder()
        .env("WEBHOOK_SECRET", SECRET)
        .spawn()
        .await?;
    let (body, (header, signature)) =
        signed("some-other-secret-value", &session_started("m1", None));

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/webhooks/video", server.url()))
        .header(header, signature)
        .body(body)
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    assert_eq!(server.attacher().call_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_server_refuses_to_start_without_secret_when_verifying() {
    let result = TestAdmissionServer::builder()
        .env("WEBHOOK_VERIFY", "true")
        .spawn()
        .await;

    assert!(result.is_err());
}
