//! Contract Test: Change-Detection Mode
//!
//! With an IP check URL the orchestrator resolves the public IP every check
//! interval and only knocks when it differs from the last knocked address.
//!
//! Constraints verified:
//! - An unchanged IP performs no knock and emits no KnockTriggered
//! - A changed IP is health-checked, then knocked explicitly
//! - Lookup and health failures are reported with context and skip the tick
//! - The last IP only advances on a successful knock

mod common;

use common::*;
use knocker_core::error::Error;
use knocker_core::events::{FIELD_CONTEXT, FIELD_ERROR_CODE, FIELD_WHITELIST_IP};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const IP_A: &str = "198.51.100.1";
const IP_B: &str = "198.51.100.2";

#[tokio::test(start_paused = true)]
async fn unchanged_ip_does_not_knock() {
    let client = ScriptedApiClient::answering(granted(IP_A, BASE_UNIX + 60, 600));
    let h = harness(change_detection_config(1), client, ScriptedResolver::fixed(IP_A));
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.client.knock_calls(), 1);
    assert_eq!(h.client.knock_requests(), vec![(Some(IP_A.to_string()), 0)]);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.resolver.calls(), 2);
    assert_eq!(h.client.knock_calls(), 1, "same IP must not knock again");
    assert_eq!(h.sink.count("KnockTriggered"), 1);
    // startup + the one pre-knock check
    assert_eq!(h.client.health_calls(), 2);

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn changed_ip_knocks_with_new_address() {
    let client = ScriptedApiClient::new();
    client.push_knock(Ok(granted(IP_A, BASE_UNIX + 60, 600)));
    client.push_knock(Ok(granted(IP_B, BASE_UNIX + 120, 600)));

    let resolver = ScriptedResolver::new();
    resolver.push_ip(IP_A);
    resolver.push_ip(IP_B);

    let config = change_detection_config(1).with_ttl_seconds(600);
    let h = harness(config, client, resolver);
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(121)).await;

    assert_eq!(
        h.client.knock_requests(),
        vec![
            (Some(IP_A.to_string()), 600),
            (Some(IP_B.to_string()), 600),
        ]
    );

    let applied = h.sink.records_of("WhitelistApplied");
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[1].field(FIELD_WHITELIST_IP), Some(IP_B));

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn lookup_failure_skips_tick() {
    let client = ScriptedApiClient::answering(granted(IP_A, BASE_UNIX + 120, 600));
    let resolver = ScriptedResolver::new();
    resolver.push_error("connection refused");
    resolver.push_ip(IP_A);

    let h = harness(change_detection_config(1), client, resolver);
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(h.client.knock_calls(), 0);
    assert_eq!(h.client.health_calls(), 1, "no health check after failed lookup");
    let errors = h.sink.records_of("Error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field(FIELD_ERROR_CODE), Some("ip_lookup_failed"));
    assert_eq!(errors[0].field(FIELD_CONTEXT), Some(IP_CHECK_URL));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.client.knock_calls(), 1);

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn health_failure_skips_knock() {
    let client = ScriptedApiClient::answering(granted(IP_A, BASE_UNIX + 120, 600));
    client.push_health(Ok(()));
    client.push_health(Err(Error::health_check("status 502")));

    let h = harness(change_detection_config(1), client, ScriptedResolver::fixed(IP_A));
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(h.client.knock_calls(), 0);
    let errors = h.sink.records_of("Error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field(FIELD_ERROR_CODE), Some("health_check_failed"));
    assert_eq!(errors[0].field(FIELD_CONTEXT), Some(API_URL));

    // Same IP, but it was never knocked: the next tick tries again.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.client.knock_calls(), 1);

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_knock_does_not_record_ip() {
    let client = ScriptedApiClient::new();
    client.push_knock(Err(Error::api("knock failed with status 403")));
    client.push_knock(Ok(granted(IP_A, BASE_UNIX + 120, 600)));

    let h = harness(change_detection_config(1), client, ScriptedResolver::fixed(IP_A));
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(61)).await;
    let errors = h.sink.records_of("Error");
    assert_eq!(errors[0].field(FIELD_ERROR_CODE), Some("knock_failed"));
    assert_eq!(errors[0].field(FIELD_CONTEXT), Some(IP_A));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.client.knock_calls(), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.client.knock_calls(), 2);

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn granted_ttl_does_not_change_check_interval() {
    // Server grants 30s, far below the 60s check interval; change-detection
    // keeps its configured cadence.
    let client = ScriptedApiClient::new();
    client.push_knock(Ok(granted(IP_A, BASE_UNIX + 60, 30)));
    client.push_knock(Ok(granted(IP_B, BASE_UNIX + 120, 30)));

    let resolver = ScriptedResolver::new();
    resolver.push_ip(IP_A);
    resolver.push_ip(IP_B);

    let h = harness(change_detection_config(1), client, resolver);
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(119)).await;
    assert_eq!(h.resolver.calls(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.resolver.calls(), 2);

    stop.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn invalid_check_interval_falls_back_to_default() {
    let client = ScriptedApiClient::answering(granted(IP_A, BASE_UNIX + 300, 600));
    let h = harness(change_detection_config(0), client, ScriptedResolver::fixed(IP_A));
    let stop = h.orchestrator.stop_handle();
    let task = tokio::spawn(h.orchestrator.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(h.resolver.calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.resolver.calls(), 1);

    stop.stop();
    task.await.unwrap().unwrap();
}
