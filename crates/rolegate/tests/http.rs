// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gate HTTP surface.
//!
//! Uses `axum_test::TestServer` against a scripted provider mock.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use tokio::sync::mpsc;

use rolegate::correlate::inbox::{process, Inbound, Receipt};
use rolegate::state::GateState;
use rolegate::test_support::{test_config, GateStateBuilder, MockDiscord};
use rolegate::transport::build_router;

fn test_server(state: Arc<GateState>) -> anyhow::Result<TestServer> {
    Ok(TestServer::new(build_router(state))?)
}

async fn setup(extra: &[&str]) -> anyhow::Result<(MockDiscord, Arc<GateState>, mpsc::Receiver<Inbound>)> {
    let mock = MockDiscord::start().await?;
    let config = test_config(&mock.base_url(), extra)?;
    let (state, rx) = GateStateBuilder::new(config).build();
    Ok((mock, state, rx))
}

fn location(resp: &axum_test::TestResponse) -> String {
    resp.headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

#[tokio::test]
async fn health_is_public() -> anyhow::Result<()> {
    let (_mock, state, _rx) = setup(&["--auth-token", "op-token"]).await?;
    state.credentials.upsert("u1", "a", None, None, None).await?;
    let server = test_server(state)?;

    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["credential_count"], 1);
    Ok(())
}

#[tokio::test]
async fn operator_api_requires_bearer() -> anyhow::Result<()> {
    let (_mock, state, _rx) = setup(&["--auth-token", "op-token"]).await?;
    let server = test_server(state)?;

    let denied = server.get("/api/v1/sessions").await;
    denied.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = denied.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let wrong = server.get("/api/v1/sessions").authorization_bearer("nope").await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);

    let allowed = server.get("/api/v1/sessions").authorization_bearer("op-token").await;
    allowed.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn create_grant_posts_panel_and_attaches_it() -> anyhow::Result<()> {
    let (mock, state, _rx) = setup(&["--public-url", "https://gate.example"]).await?;
    mock.respond("POST", "/channels/C1/messages", 200, r#"{"id":"M1","channel_id":"C1"}"#).await;
    let server = test_server(Arc::clone(&state))?;

    let resp = server
        .post("/api/v1/grants")
        .json(&serde_json::json!({ "role_id": "R1", "channel_id": "C1", "guild_id": "G1" }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    let session_id = body["session_id"].as_str().unwrap_or_default().to_owned();
    assert_eq!(body["message_id"], "M1");
    assert!(body["auth_url"]
        .as_str()
        .is_some_and(|u| u.starts_with("https://gate.example/auth?session=")));

    let session = state.sessions.resolve(&session_id).await?;
    assert_eq!(session.guild_id, "G1");
    assert_eq!(session.role_id, "R1");
    assert_eq!(session.message_id.as_deref(), Some("M1"));

    let posts = mock.requests_to("POST", "/channels/C1/messages").await;
    assert_eq!(posts[0].json()["components"][0]["components"][0]["url"], body["auth_url"]);
    Ok(())
}

#[tokio::test]
async fn create_grant_uses_default_guild() -> anyhow::Result<()> {
    let (mock, state, _rx) = setup(&["--default-guild-id", "GD"]).await?;
    mock.respond("POST", "/channels/C1/messages", 200, r#"{"id":"M1"}"#).await;
    let server = test_server(Arc::clone(&state))?;

    let resp = server
        .post("/api/v1/grants")
        .json(&serde_json::json!({ "role_id": "R1", "channel_id": "C1" }))
        .await;
    resp.assert_status_ok();
    let sessions = state.sessions.list().await;
    assert_eq!(sessions[0].1.guild_id, "GD");
    Ok(())
}

#[tokio::test]
async fn create_grant_without_guild_is_bad_request() -> anyhow::Result<()> {
    let (_mock, state, _rx) = setup(&[]).await?;
    let server = test_server(Arc::clone(&state))?;

    let resp = server
        .post("/api/v1/grants")
        .json(&serde_json::json!({ "role_id": "R1", "channel_id": "C1" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert!(state.sessions.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn create_grant_panel_failure_discards_session() -> anyhow::Result<()> {
    let (mock, state, _rx) = setup(&[]).await?;
    mock.respond("POST", "/channels/C1/messages", 403, r#"{"code":50001,"message":"Missing Access"}"#)
        .await;
    let server = test_server(Arc::clone(&state))?;

    let resp = server
        .post("/api/v1/grants")
        .json(&serde_json::json!({ "role_id": "R1", "channel_id": "C1", "guild_id": "G1" }))
        .await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    assert!(state.sessions.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn auth_redirects_to_provider() -> anyhow::Result<()> {
    let (_mock, state, _rx) = setup(&[]).await?;
    let server = test_server(state)?;

    let missing = server.get("/auth").await;
    missing.assert_status(StatusCode::BAD_REQUEST);

    let resp = server.get("/auth?session=abc.def").await;
    resp.assert_status(StatusCode::FOUND);
    let to = location(&resp);
    assert!(to.starts_with("https://discord.com/oauth2/authorize?client_id=client-1"));
    assert!(to.contains("scope=identify+guilds.join"));
    assert!(to.contains("state=abc.def"));
    Ok(())
}

#[tokio::test]
async fn callback_relays_and_correlator_grants() -> anyhow::Result<()> {
    let (mock, state, mut rx) = setup(&["--state-secret", "hunter2"]).await?;
    mock.respond(
        "POST",
        "/oauth2/token",
        200,
        r#"{"access_token":"tok1","refresh_token":"ref1","expires_in":604800}"#,
    )
    .await;
    mock.respond("GET", "/users/@me", 200, r#"{"id":"u1","username":"Ada L"}"#).await;
    mock.respond("PUT", "/guilds/G/members/u1", 201, "{}").await;
    mock.respond("PUT", "/guilds/G/members/u1/roles/R", 204, "").await;

    let session_id = state.sessions.create("G", "R", "C").await?;
    let server = test_server(Arc::clone(&state))?;

    let resp = server.get(&format!("/callback?code=abc&state={session_id}")).await;
    resp.assert_status(StatusCode::FOUND);
    assert_eq!(location(&resp), "/success?user=Ada+L");

    let Some(inbound) = rx.recv().await else {
        anyhow::bail!("nothing relayed");
    };
    assert_eq!(inbound.receipt, Receipt::Local);
    let relayed: serde_json::Value = serde_json::from_str(&inbound.body)?;
    assert_eq!(relayed["guildId"], "G");
    assert_eq!(relayed["roleId"], "R");
    assert_eq!(relayed["refreshToken"], "ref1");

    let result = process(&state.correlator(), &state.api, inbound).await?;
    assert!(result.role_granted);
    let stored = state.credentials.get("u1").await;
    assert_eq!(stored.map(|c| c.access_token), Some("tok1".to_owned()));
    Ok(())
}

#[tokio::test]
async fn callback_rejects_forged_state() -> anyhow::Result<()> {
    let (mock, state, mut rx) = setup(&["--state-secret", "hunter2"]).await?;
    let session_id = state.sessions.create("G", "R", "C").await?;
    let server = test_server(state)?;

    let forged = match session_id.split_once('.') {
        Some((payload, _)) => format!("{payload}.AAAA"),
        None => anyhow::bail!("token is unsigned"),
    };
    let resp = server.get(&format!("/callback?code=abc&state={forged}")).await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    assert!(mock.requests().await.is_empty(), "no code exchange");
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn callback_failure_hides_provider_details() -> anyhow::Result<()> {
    let (mock, state, _rx) = setup(&[]).await?;
    mock.respond("POST", "/oauth2/token", 400, r#"{"error":"invalid_grant","secret_detail":"x"}"#)
        .await;
    let session_id = state.sessions.create("G", "R", "C").await?;
    let server = test_server(state)?;

    let resp = server.get(&format!("/callback?code=bad&state={session_id}")).await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    let text = resp.text();
    assert!(!text.contains("invalid_grant"));
    assert!(!text.contains("secret_detail"));

    let missing = server.get("/callback?code=abc").await;
    missing.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn success_page_escapes_user() -> anyhow::Result<()> {
    let (_mock, state, _rx) = setup(&[]).await?;
    let server = test_server(state)?;

    let resp = server.get("/success?user=%3Cb%3Eada%3C%2Fb%3E").await;
    resp.assert_status_ok();
    let html = resp.text();
    assert!(html.contains("&lt;b&gt;ada&lt;/b&gt;"));
    assert!(!html.contains("<b>ada</b>"));
    Ok(())
}

#[tokio::test]
async fn batch_without_users_is_rejected() -> anyhow::Result<()> {
    let (mock, state, _rx) = setup(&[]).await?;
    mock.respond("POST", "/channels/REP/messages", 200, r#"{"id":"1"}"#).await;
    let server = test_server(state)?;

    let resp = server
        .post("/api/v1/batch")
        .json(&serde_json::json!({ "target_guild_id": "G2", "report_channel_id": "REP" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let reports = mock.requests_to("POST", "/channels/REP/messages").await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].json()["embeds"][0]["color"], 0xFF0000);
    Ok(())
}

#[tokio::test]
async fn batch_reports_counts_and_posts_embed() -> anyhow::Result<()> {
    let (mock, state, _rx) = setup(&[]).await?;
    mock.respond("GET", "/guilds/G2", 200, r#"{"id":"G2","name":"Second"}"#).await;
    mock.respond("PUT", "/guilds/G2/members/u1", 204, "").await;
    mock.respond("PUT", "/guilds/G2/members/u2", 403, r#"{"code":50001,"message":"Missing Access"}"#)
        .await;
    mock.respond("POST", "/channels/REP/messages", 200, r#"{"id":"1"}"#).await;
    state.credentials.upsert("u1", "a1", None, None, None).await?;
    state.credentials.upsert("u2", "a2", None, None, None).await?;
    let server = test_server(state)?;

    let resp = server
        .post("/api/v1/batch")
        .json(&serde_json::json!({ "target_guild_id": "G2", "report_channel_id": "REP" }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["success_count"], 1);
    assert_eq!(body["fail_count"], 1);
    assert_eq!(body["results"][1]["outcome"], "failed-provider-error");
    assert_eq!(body["results"][1]["reason"], "Missing Access");

    let reports = mock.requests_to("POST", "/channels/REP/messages").await;
    let embed = &reports[0].json()["embeds"][0];
    assert_eq!(embed["color"], 0x43B581);
    let details = embed["fields"][0]["value"].as_str().unwrap_or_default().to_owned();
    assert!(details.contains("❌ <@u2> - Missing Access"));
    Ok(())
}

#[tokio::test]
async fn batch_unknown_guild_is_not_found() -> anyhow::Result<()> {
    let (mock, state, _rx) = setup(&[]).await?;
    state.credentials.upsert("u1", "a1", None, None, None).await?;
    let server = test_server(state)?;

    let resp = server.post("/api/v1/batch").json(&serde_json::json!({ "target_guild_id": "nope" })).await;
    resp.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(mock.count("PUT", "/guilds/nope/members/u1").await, 0);
    Ok(())
}

#[tokio::test]
async fn sessions_list_and_delete() -> anyhow::Result<()> {
    let (_mock, state, _rx) = setup(&[]).await?;
    let id = state.sessions.create("G", "R", "C").await?;
    let server = test_server(Arc::clone(&state))?;

    let list: Vec<serde_json::Value> = server.get("/api/v1/sessions").await.json();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], id.as_str());
    let created = list[0]["created_at_ms"].as_u64().unwrap_or_default();
    assert_eq!(list[0]["expires_at_ms"], created + 86_400_000);

    let resp = server.delete(&format!("/api/v1/sessions/{id}")).await;
    resp.assert_status_ok();
    assert!(state.sessions.is_empty().await);

    let again = server.delete(&format!("/api/v1/sessions/{id}")).await;
    again.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn credentials_list_hides_tokens() -> anyhow::Result<()> {
    let (_mock, state, _rx) = setup(&[]).await?;
    state.credentials.upsert("u1", "secret-access", Some("secret-refresh"), Some(60), None).await?;
    let server = test_server(state)?;

    let resp = server.get("/api/v1/credentials").await;
    resp.assert_status_ok();
    let text = resp.text();
    assert!(!text.contains("secret-access"));
    assert!(!text.contains("secret-refresh"));

    let list: Vec<serde_json::Value> = resp.json();
    assert_eq!(list[0]["user_id"], "u1");
    assert_eq!(list[0]["has_refresh_token"], true);
    assert_eq!(list[0]["expired"], false);
    Ok(())
}
