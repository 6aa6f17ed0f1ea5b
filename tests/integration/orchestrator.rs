//! Integration tests for the batch orchestrator
//!
//! Tests cover:
//! - Wait-for-all semantics across concurrency ceilings
//! - Resource-group failure aborting the batch before any task launches
//! - The semaphore concurrency ceiling
//! - Partial failure aggregation
//! - Race-free concurrent insertion into the outcome aggregate
//! - Batch deadline behavior

use super::test_utils::MockRemoteClient;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use storbatch::batch::{BatchOutcome, BatchRequest, Orchestrator, SlotFailure};
use storbatch::error::{ProvisionError, RemoteError, RemoteErrorKind};
use storbatch::provision::{ConnectionDescriptor, KeySelection};
use storbatch::remote::{AccountKind, SkuName};
use storbatch::retry::RetryPolicy;

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        jitter_factor: 0.0,
    }
}

fn request(prefix: &str, count: usize, max_concurrency: usize) -> BatchRequest {
    BatchRequest {
        resource_group: "rg-test".to_string(),
        location: "northeurope".to_string(),
        name_prefix: prefix.to_string(),
        count,
        digit_width: 2,
        sku: SkuName::StandardLrs,
        kind: AccountKind::StorageV2,
        max_concurrency,
        key_selection: KeySelection::First,
        deadline: None,
    }
}

#[tokio::test]
async fn every_slot_settles_regardless_of_ceiling() {
    for ceiling in [1, 3, 10] {
        let client = Arc::new(MockRemoteClient::new());
        let orchestrator = Orchestrator::new(client.clone(), fast_policy());
        let outcome = orchestrator.run(&request("acct", 10, ceiling)).await.unwrap();

        assert_eq!(outcome.len(), 10, "ceiling {ceiling}");
        assert_eq!(outcome.connections().len(), 10);
        assert!(outcome.failures().is_empty());
        assert_eq!(client.create_calls.load(Ordering::SeqCst), 10);
    }
}

#[tokio::test]
async fn full_batch_matches_expected_names_and_strings() {
    let client = Arc::new(MockRemoteClient::new());
    let orchestrator = Orchestrator::new(client, fast_policy());
    let outcome = orchestrator
        .run(&request("efitabdesa", 10, 20))
        .await
        .unwrap();

    let keys: Vec<&String> = outcome.connections().keys().collect();
    let expected_keys: Vec<String> = (0..10).map(|i| format!("ConnectionString{i:02}")).collect();
    assert_eq!(keys, expected_keys.iter().collect::<Vec<_>>());

    for slot in 0..10 {
        let descriptor = &outcome.connections()[&format!("ConnectionString{slot:02}")];
        let name = format!("efitabdesa{slot:02}");
        assert_eq!(descriptor.account_name, name);
        assert_eq!(
            descriptor.connection_string,
            format!(
                "DefaultEndpointsProtocol=https;AccountName={name};AccountKey={name}-key1;EndpointSuffix=core.windows.net"
            )
        );
    }
}

#[tokio::test]
async fn group_failure_launches_zero_tasks() {
    let client = Arc::new(
        MockRemoteClient::new().with_group_errors(vec![RemoteError::Fatal("quota".into())]),
    );
    let orchestrator = Orchestrator::new(client.clone(), fast_policy());
    let result = orchestrator.run(&request("acct", 5, 5)).await;

    assert!(matches!(
        result,
        Err(ProvisionError::ResourceGroup { .. })
    ));
    assert_eq!(client.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(client.keys_calls.load(Ordering::SeqCst), 0);
    // Fatal is not retryable: exactly one attempt.
    assert_eq!(client.group_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn group_creation_retries_retryable_errors() {
    let client = Arc::new(MockRemoteClient::new().with_group_errors(vec![
        RemoteError::throttled("429"),
        RemoteError::Transient("503".into()),
    ]));
    let orchestrator = Orchestrator::new(client.clone(), fast_policy());
    let outcome = orchestrator.run(&request("acct", 2, 2)).await.unwrap();

    assert_eq!(outcome.connections().len(), 2);
    assert_eq!(client.group_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn ensure_resource_group_is_idempotent() {
    let client = Arc::new(MockRemoteClient::new());
    let orchestrator = Orchestrator::new(client.clone(), fast_policy());
    let req = request("acct", 1, 1);

    orchestrator.ensure_resource_group(&req).await.unwrap();
    orchestrator.ensure_resource_group(&req).await.unwrap();
    assert_eq!(client.group_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrency_never_exceeds_the_ceiling() {
    let client = Arc::new(
        MockRemoteClient::new().with_create_delay(Duration::from_millis(30)),
    );
    let orchestrator = Orchestrator::new(client.clone(), fast_policy());
    let outcome = orchestrator.run(&request("acct", 12, 4)).await.unwrap();

    assert_eq!(outcome.connections().len(), 12);
    let peak = client.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 4, "observed {peak} creations in flight");
    assert!(peak >= 2, "fan-out never overlapped");
}

#[tokio::test]
async fn partial_failures_are_aggregated_not_propagated() {
    let client = Arc::new(
        MockRemoteClient::new()
            .with_create_errors("acct02", vec![RemoteError::Conflict("name taken".into())])
            .with_create_errors("acct05", vec![RemoteError::Fatal("bad parameters".into())]),
    );
    let orchestrator = Orchestrator::new(client, fast_policy());
    let outcome = orchestrator.run(&request("acct", 8, 8)).await.unwrap();

    assert_eq!(outcome.len(), 8);
    assert_eq!(outcome.connections().len(), 6);
    assert_eq!(outcome.failures().len(), 2);

    let mut failed: Vec<(&str, RemoteErrorKind)> = outcome
        .failures()
        .iter()
        .map(|f| (f.account_name.as_str(), f.kind))
        .collect();
    failed.sort_by_key(|(name, _)| *name);
    assert_eq!(
        failed,
        vec![
            ("acct02", RemoteErrorKind::Conflict),
            ("acct05", RemoteErrorKind::Fatal)
        ]
    );
}

#[tokio::test]
async fn concurrent_insertions_lose_no_updates() {
    let outcome = Arc::new(Mutex::new(BatchOutcome::default()));
    let mut handles = Vec::new();

    for slot in 0..100usize {
        let outcome = Arc::clone(&outcome);
        handles.push(tokio::spawn(async move {
            let key = format!("ConnectionString{slot:03}");
            if slot % 2 == 0 {
                outcome.lock().record_success(
                    slot,
                    key,
                    ConnectionDescriptor::new(&format!("acct{slot:03}"), "k"),
                );
            } else {
                outcome.lock().record_failure(SlotFailure {
                    slot,
                    account_name: format!("acct{slot:03}"),
                    kind: RemoteErrorKind::Transient,
                    message: "simulated".to_string(),
                });
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let settled = outcome.lock();
    assert_eq!(settled.len(), 100);
    assert_eq!(settled.connections().len(), 50);
    assert_eq!(settled.failures().len(), 50);
}

#[tokio::test(start_paused = true)]
async fn deadline_marks_unfinished_slots_as_failures() {
    let client = Arc::new(
        MockRemoteClient::new().with_create_delay(Duration::from_secs(300)),
    );
    let orchestrator = Orchestrator::new(client, fast_policy());
    let req = BatchRequest {
        deadline: Some(Duration::from_secs(5)),
        ..request("acct", 4, 4)
    };
    let outcome = orchestrator.run(&req).await.unwrap();

    assert_eq!(outcome.len(), 4);
    assert!(outcome.connections().is_empty());
    assert_eq!(outcome.failures().len(), 4);
    for failure in outcome.failures() {
        assert_eq!(failure.kind, RemoteErrorKind::Transient);
        assert!(failure.message.contains("deadline"));
    }
}

#[tokio::test(start_paused = true)]
async fn deadline_keeps_finished_successes_and_fails_the_rest() {
    let client = Arc::new(
        MockRemoteClient::new()
            .with_create_delay_for("acct02", Duration::from_secs(300))
            .with_create_delay_for("acct03", Duration::from_secs(300)),
    );
    let orchestrator = Orchestrator::new(client, fast_policy());
    let req = BatchRequest {
        deadline: Some(Duration::from_secs(5)),
        ..request("acct", 4, 4)
    };
    let outcome = orchestrator.run(&req).await.unwrap();

    assert_eq!(outcome.len(), 4);
    // The two undelayed slots settled before the deadline and stay settled.
    assert_eq!(outcome.connections().len(), 2);
    assert!(outcome.connections().contains_key("ConnectionString00"));
    assert!(outcome.connections().contains_key("ConnectionString01"));

    let mut failed: Vec<&str> = outcome
        .failures()
        .iter()
        .map(|f| f.account_name.as_str())
        .collect();
    failed.sort_unstable();
    assert_eq!(failed, vec!["acct02", "acct03"]);
    for failure in outcome.failures() {
        assert_eq!(failure.kind, RemoteErrorKind::Transient);
        assert!(failure.message.contains("deadline"));
    }
}
