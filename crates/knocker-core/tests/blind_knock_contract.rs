//! Contract Test: Blind Knock Mode
//!
//! Without an IP check URL the orchestrator knocks on every tick and lets
//! the API infer the address.
//!
//! Constraints verified:
//! - Knocks carry no IP and the configured TTL
//! - Cadence follows the TTL granted by the server
//! - Success emits KnockTriggered, WhitelistApplied, StatusSnapshot in order
//! - A failed or timed-out knock is reported and retried, never fatal

mod common;

use common::*;
use knocker_core::error::Error;
use knocker_core::events::{
    FIELD_CONTEXT, FIELD_ERROR_CODE, FIELD_EXPIRES_UNIX, FIELD_NEXT_AT_UNIX, FIELD_RESULT,
    FIELD_SOURCE, FIELD_TRIGGER_SOURCE, FIELD_TTL_SEC, FIELD_WHITELIST_IP,
};
use knocker_core::LifecycleState;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn successful_knock_applies_lease_and_recomputes_cadence() {
    // Configured TTL 120 -> first knock at 108s. The server only grants 60s,
    // so the following knock comes 54s later.
    let client = ScriptedApiClient::new();
    client.push_knock(Ok(granted("203.0.113.7", BASE_UNIX + 108, 60)));
    client.push_knock(Ok(granted("203.0.113.7", BASE_UNIX + 162, 60)));

    let h = harness(blind_config(120), client, ScriptedResolver::new());
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(109)).await;

    assert_eq!(h.client.knock_calls(), 1);
    assert_eq!(h.client.knock_requests(), vec![(None, 120)]);
    assert_eq!(
        h.sink.kinds(),
        vec![
            "ServiceState",
            "NextKnockUpdated",
            "StatusSnapshot",
            "KnockTriggered",
            "WhitelistApplied",
            "StatusSnapshot",
            "NextKnockUpdated",
        ]
    );

    let triggered = &h.sink.records_of("KnockTriggered")[0];
    assert_eq!(triggered.field(FIELD_TRIGGER_SOURCE), Some("schedule"));
    assert_eq!(triggered.field(FIELD_RESULT), Some("success"));
    assert_eq!(triggered.field(FIELD_WHITELIST_IP), Some("203.0.113.7"));

    let applied = &h.sink.records_of("WhitelistApplied")[0];
    let expires = (BASE_UNIX + 168).to_string();
    assert_eq!(applied.field(FIELD_WHITELIST_IP), Some("203.0.113.7"));
    assert_eq!(applied.field(FIELD_TTL_SEC), Some("60"));
    assert_eq!(applied.field(FIELD_EXPIRES_UNIX), Some(expires.as_str()));
    assert_eq!(applied.field(FIELD_SOURCE), Some("schedule"));

    let snapshot = &h.sink.records_of("StatusSnapshot")[1];
    assert_eq!(snapshot.field(FIELD_WHITELIST_IP), Some("203.0.113.7"));
    assert_eq!(snapshot.field(FIELD_EXPIRES_UNIX), Some(expires.as_str()));

    let next = h.sink.records_of("NextKnockUpdated");
    let expected_next = (BASE_UNIX + 108 + 54).to_string();
    assert_eq!(
        next.last().unwrap().field(FIELD_NEXT_AT_UNIX),
        Some(expected_next.as_str())
    );

    tokio::time::sleep(Duration::from_secs(53)).await;
    assert_eq!(h.client.knock_calls(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.client.knock_calls(), 2);

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_knock_is_reported_and_retried() {
    let client = ScriptedApiClient::new();
    client.push_knock(Err(Error::api("knock failed with status 500")));
    client.push_knock(Ok(granted("203.0.113.7", BASE_UNIX + 108, 60)));

    let h = harness(blind_config(60), client, ScriptedResolver::new());
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(55)).await;

    assert_eq!(stop.state(), LifecycleState::Running);
    assert_eq!(h.sink.count("WhitelistApplied"), 0);

    let triggered = &h.sink.records_of("KnockTriggered")[0];
    assert_eq!(triggered.field(FIELD_RESULT), Some("failure"));
    assert_eq!(triggered.field(FIELD_WHITELIST_IP), None);

    let errors = h.sink.records_of("Error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field(FIELD_ERROR_CODE), Some("knock_failed"));
    assert_eq!(errors[0].field(FIELD_CONTEXT), Some("schedule"));
    assert!(errors[0].message.contains("500"));

    // Next tick still comes after the unchanged cadence
    tokio::time::sleep(Duration::from_secs(54)).await;

    assert_eq!(h.client.knock_calls(), 2);
    assert_eq!(h.sink.count("WhitelistApplied"), 1);
    assert_eq!(
        h.sink.records_of("KnockTriggered")[1].field(FIELD_RESULT),
        Some("success")
    );

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn slow_knock_is_bounded_by_request_timeout() {
    let client = ScriptedApiClient::answering(granted("203.0.113.7", BASE_UNIX + 120, 60));
    client.delay_knocks(Duration::from_secs(30));

    let h = harness(blind_config(60), client, ScriptedResolver::new());
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    // Tick at 54s, default request timeout 10s
    tokio::time::sleep(Duration::from_secs(65)).await;

    let errors = h.sink.records_of("Error");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("timed out"), "{}", errors[0].message);
    assert_eq!(h.sink.count("WhitelistApplied"), 0);

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn response_without_ttl_leaves_lease_and_cadence_alone() {
    let client = ScriptedApiClient::answering(granted("203.0.113.7", 0, 0));
    let h = harness(blind_config(60), client, ScriptedResolver::new());
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(55)).await;

    let applied = &h.sink.records_of("WhitelistApplied")[0];
    assert_eq!(applied.message, "Whitelisted 203.0.113.7");
    assert_eq!(applied.field(FIELD_TTL_SEC), None);

    let snapshot = h.sink.records_of("StatusSnapshot").pop().unwrap();
    assert_eq!(snapshot.field(FIELD_WHITELIST_IP), None);

    // Still on the 54s cadence derived from the configured TTL
    tokio::time::sleep(Duration::from_secs(54)).await;
    assert_eq!(h.client.knock_calls(), 2);

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn unknown_ttl_uses_default_cadence() {
    let client = ScriptedApiClient::answering(granted("203.0.113.7", 0, 0));
    let h = harness(blind_config(0), client, ScriptedResolver::new());
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(h.client.knock_calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.client.knock_calls(), 1);
    assert_eq!(h.client.knock_requests(), vec![(None, 0)]);

    stop.stop();
    task.await.unwrap().unwrap();
}
