use fixtures::*;

use std::time::Duration;

use relay_core::rpc_clients::BundlerClient;
use relay_executors::reconcile::{HashReconciler, ReconcileOutcome};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

fn bundler(server: &MockServer) -> BundlerClient {
    BundlerClient::new(
        reqwest::Client::new(),
        server.uri().parse().unwrap(),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_same_pair_is_linked_once() {
    setup_tracing();
    let relayer = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/link-hashes"))
        .and(body_partial_json(json!({
            "clientHash": hash(1).to_string(),
            "relayerHash": hash(2).to_string(),
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&relayer)
        .await;

    let reconciler = HashReconciler::new();
    let client = bundler(&relayer);

    let first = reconciler
        .reconcile(&client, hash(1), Some(hash(2)), SENDER)
        .await;
    let second = reconciler
        .reconcile(&client, hash(1), Some(hash(2)), SENDER)
        .await;

    assert_eq!(first, ReconcileOutcome::Linked);
    assert_eq!(second, ReconcileOutcome::AlreadyLinked);
}

#[tokio::test]
async fn test_matching_or_missing_relayer_hash_needs_no_link() {
    setup_tracing();
    let relayer = MockServer::start().await;

    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&relayer)
        .await;

    let reconciler = HashReconciler::new();
    let client = bundler(&relayer);

    assert_eq!(
        reconciler.reconcile(&client, hash(1), Some(hash(1)), SENDER).await,
        ReconcileOutcome::NotNeeded
    );
    assert_eq!(
        reconciler.reconcile(&client, hash(1), None, SENDER).await,
        ReconcileOutcome::NotNeeded
    );
}

#[tokio::test]
async fn test_failed_link_is_degraded_and_retried_later() {
    setup_tracing();
    let relayer = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/link-hashes"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"message": "busy"})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&relayer)
        .await;

    Mock::given(method("POST"))
        .and(path("/link-hashes"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&relayer)
        .await;

    let reconciler = HashReconciler::new();
    let client = bundler(&relayer);

    let degraded = reconciler
        .reconcile(&client, hash(1), Some(hash(2)), SENDER)
        .await;
    assert!(matches!(degraded, ReconcileOutcome::Degraded { ref reason } if reason.contains("busy")));

    let retried = reconciler
        .reconcile(&client, hash(1), Some(hash(2)), SENDER)
        .await;
    assert_eq!(retried, ReconcileOutcome::Linked);
}
