// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{test_config, GateStateBuilder, MockDiscord};

async fn setup(mock: &MockDiscord) -> anyhow::Result<Arc<crate::state::GateState>> {
    let config = test_config(&mock.base_url(), &[])?;
    let (state, _rx) = GateStateBuilder::new(config).build();
    mock.respond("GET", "/guilds/G2", 200, r#"{"id":"G2","name":"Second"}"#).await;
    Ok(state)
}

fn outcome_of(report: &BatchReport, user: &str) -> Option<GrantOutcome> {
    report.results.iter().find(|r| r.user_id == user).map(|r| r.outcome)
}

#[tokio::test]
async fn batch_covers_every_user_once() -> anyhow::Result<()> {
    let mock = MockDiscord::start().await?;
    let state = setup(&mock).await?;
    let creds = &state.credentials;
    creds.upsert("u1", "a1", Some("r1"), Some(3600), None).await?;
    creds.upsert_at("u2", "a2", Some("r2"), Some(1), None, 0).await?;
    creds.upsert_at("u3", "a3", None, Some(1), None, 0).await?;
    creds.upsert("u4", "a4", None, None, None).await?;

    mock.respond("POST", "/oauth2/token", 200, r#"{"access_token":"a2-new","expires_in":3600}"#)
        .await;
    mock.respond("PUT", "/guilds/G2/members/u1", 201, "{}").await;
    mock.respond("PUT", "/guilds/G2/members/u2", 204, "").await;
    mock.respond(
        "PUT",
        "/guilds/G2/members/u4",
        403,
        r#"{"code":0,"message":"User account must be verified"}"#,
    )
    .await;

    let report = state.batch_runner().run_batch("G2").await?;
    assert_eq!(report.guild_name, "Second");
    assert_eq!(report.success_count + report.fail_count, 4);
    assert_eq!(report.results.len(), 4);
    let users: Vec<&str> = report.results.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(users, ["u1", "u2", "u3", "u4"]);

    assert_eq!(outcome_of(&report, "u1"), Some(GrantOutcome::Added));
    assert_eq!(outcome_of(&report, "u2"), Some(GrantOutcome::Added), "204 counts as success");
    assert_eq!(outcome_of(&report, "u3"), Some(GrantOutcome::SkippedRefreshFailed));
    assert_eq!(outcome_of(&report, "u4"), Some(GrantOutcome::FailedProviderError));
    assert_eq!(report.success_count, 2);

    let u4 = report.results.iter().find(|r| r.user_id == "u4");
    assert!(u4.is_some_and(|r| r.reason.contains("not verified")));

    // Expired credential was refreshed and the new token used.
    let u2_put = mock.requests_to("PUT", "/guilds/G2/members/u2").await;
    assert_eq!(u2_put[0].json()["access_token"], "a2-new");
    assert_eq!(mock.count("PUT", "/guilds/G2/members/u3").await, 0);
    Ok(())
}

#[tokio::test]
async fn unknown_guild_aborts_before_any_user() -> anyhow::Result<()> {
    let mock = MockDiscord::start().await?;
    let config = test_config(&mock.base_url(), &[])?;
    let (state, _rx) = GateStateBuilder::new(config).build();
    state.credentials.upsert("u1", "a1", None, None, None).await?;

    let result = state.batch_runner().run_batch("missing").await;
    assert!(matches!(result, Err(GateError::ProviderRejected { status: 404, .. })));
    assert_eq!(mock.count("PUT", "/guilds/missing/members/u1").await, 0);
    Ok(())
}

#[tokio::test]
async fn rate_limit_is_retried() -> anyhow::Result<()> {
    let mock = MockDiscord::start().await?;
    let state = setup(&mock).await?;
    state.credentials.upsert("u1", "a1", None, None, None).await?;
    mock.respond("PUT", "/guilds/G2/members/u1", 429, r#"{"retry_after":0.01,"global":false}"#)
        .await;
    mock.respond("PUT", "/guilds/G2/members/u1", 201, "{}").await;

    let report = state.batch_runner().run_batch("G2").await?;
    assert_eq!(report.success_count, 1);
    assert_eq!(mock.count("PUT", "/guilds/G2/members/u1").await, 2);
    Ok(())
}

#[tokio::test]
async fn rate_limit_retries_are_bounded() -> anyhow::Result<()> {
    let mock = MockDiscord::start().await?;
    let state = setup(&mock).await?;
    state.credentials.upsert("u1", "a1", None, None, None).await?;
    mock.respond("PUT", "/guilds/G2/members/u1", 429, r#"{"retry_after":0.01}"#).await;

    let report = state.batch_runner().run_batch("G2").await?;
    assert_eq!(report.fail_count, 1);
    assert_eq!(report.results[0].reason, "rate limited");
    // One attempt plus two retries.
    assert_eq!(mock.count("PUT", "/guilds/G2/members/u1").await, 3);
    Ok(())
}

#[tokio::test]
async fn empty_store_reports_zero() -> anyhow::Result<()> {
    let mock = MockDiscord::start().await?;
    let state = setup(&mock).await?;
    let report = state.batch_runner().run_batch("G2").await?;
    assert_eq!((report.success_count, report.fail_count), (0, 0));
    assert!(report.render(20).is_empty());
    Ok(())
}

#[test]
fn render_caps_items_and_counts_remainder() {
    let results = (0..25)
        .map(|i| UserResult::new(&format!("u{i}"), GrantOutcome::FailedNetwork, "network error"))
        .collect();
    let report = BatchReport {
        guild_id: "G".into(),
        guild_name: "Guild".into(),
        success_count: 0,
        fail_count: 25,
        results,
    };

    let rendered = report.render(20);
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines.len(), 21);
    assert_eq!(lines[0], "❌ <@u0> - network error");
    assert_eq!(lines[20], "+5 more");
}

#[test]
fn success_line_has_no_reason() {
    let result = UserResult::new("42", GrantOutcome::Added, "joined");
    assert_eq!(result.line(), "✅ <@42>");
}

#[tokio::test]
async fn network_failures_retry_then_report_failed_network() -> anyhow::Result<()> {
    let mock = MockDiscord::start().await?;
    let config = test_config(&mock.base_url(), &["--http-timeout-secs", "1"])?;
    let (state, _rx) = GateStateBuilder::new(config).build();
    mock.respond("GET", "/guilds/G2", 200, r#"{"id":"G2","name":"Second"}"#).await;
    mock.stall("PUT", "/guilds/G2/members/u1").await;
    state.credentials.upsert("u1", "a1", None, None, None).await?;

    let report = state.batch_runner().run_batch("G2").await?;
    assert_eq!(report.fail_count, 1);
    assert_eq!(outcome_of(&report, "u1"), Some(GrantOutcome::FailedNetwork));
    assert_eq!(report.results[0].reason, "network error");
    // Two retries after the first attempt.
    assert_eq!(mock.count("PUT", "/guilds/G2/members/u1").await, 3);
    Ok(())
}

#[yare::parameterized(
    first = { 0, 500 },
    second = { 1, 1000 },
    third = { 2, 2000 },
    capped = { 10, 60_000 },
)]
fn network_backoff_doubles(attempt: u32, expected_ms: u64) {
    let err = GateError::NetworkFailure("reset".into());
    assert_eq!(retry_delay(&err, attempt), Some(Duration::from_millis(expected_ms)));
}
