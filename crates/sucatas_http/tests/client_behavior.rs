//! HTTP-boundary behavior: retry, breaker, tombstone and rate-limit
//! contracts against a local mock server.

use std::time::{Duration, Instant};
use sucatas_http::{ErrorClass, HttpClient};
use sucatas_protocol::{MinerConfig, PipelineStage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(max_retries: u32, rate_limit_secs: f64) -> MinerConfig {
    MinerConfig {
        max_retries,
        rate_limit_secs,
        backoff_base_secs: 0.01,
        backoff_cap_secs: 0.05,
        timeout_secs: 5,
        breaker_failure_threshold: 8,
        breaker_reset_secs: 60,
        ..Default::default()
    }
}

#[tokio::test]
async fn recovers_from_transient_503s_without_opening_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let client = HttpClient::new(&test_config(5, 0.0), "run-f", None).unwrap();
    let url = format!("{}/search", server.uri());
    let outcome = client.get_json(PipelineStage::Busca, &url, &[]).await;

    assert!(outcome.ok, "expected recovery after three 503s");
    assert_eq!(outcome.status, Some(200));
    assert!(outcome.json().unwrap().get("data").is_some());
    assert_eq!(server.received_requests().await.unwrap().len(), 4);

    // The breaker saw only 3 consecutive failures (threshold 8): still closed.
    let again = client.get_json(PipelineStage::Busca, &url, &[]).await;
    assert!(again.ok);
}

#[tokio::test]
async fn eight_failures_open_the_breaker_and_block_traffic() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(8)
        .mount(&server)
        .await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    // 7 retries = 8 attempts = exactly the failure threshold.
    let client = HttpClient::new(&test_config(7, 0.0), "run-g", Some(tx)).unwrap();
    let url = format!("{}/search", server.uri());

    let outcome = client.get(PipelineStage::Busca, &url, &[]).await;
    assert!(!outcome.ok);
    assert_eq!(outcome.status, Some(503));

    // Breaker now blocks without touching the network.
    let blocked = client.get(PipelineStage::Busca, &url, &[]).await;
    assert_eq!(blocked.error_class, Some(ErrorClass::CircuitOpen));
    server.verify().await;

    // Exactly one circuit_open event was emitted for the opening.
    let mut circuit_open_events = 0;
    while let Ok(event) = rx.try_recv() {
        if event.evento == "circuit_open" {
            circuit_open_events += 1;
        }
    }
    assert_eq!(circuit_open_events, 1);
}

#[tokio::test]
async fn tombstoned_urls_are_not_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&test_config(5, 0.0), "run-tomb", None).unwrap();
    let url = format!("{}/gone", server.uri());

    let first = client.get(PipelineStage::Coleta, &url, &[]).await;
    assert!(first.is_tombstone());
    assert_eq!(first.status, Some(404));
    assert!(client.is_tombstoned(&url));

    let second = client.get(PipelineStage::Coleta, &url, &[]).await;
    assert_eq!(second.error_class, Some(ErrorClass::Tombstone));
    server.verify().await;
}

#[tokio::test]
async fn plain_4xx_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&test_config(5, 0.0), "run-4xx", None).unwrap();
    let outcome = client
        .get(PipelineStage::Busca, &format!("{}/forbidden", server.uri()), &[])
        .await;
    assert!(!outcome.ok);
    assert_eq!(outcome.status, Some(403));
    server.verify().await;
}

#[tokio::test]
async fn same_host_calls_respect_the_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = HttpClient::new(&test_config(0, 0.2), "run-rate", None).unwrap();
    let url = format!("{}/ping", server.uri());

    let start = Instant::now();
    assert!(client.get(PipelineStage::Busca, &url, &[]).await.ok);
    assert!(client.get(PipelineStage::Busca, &url, &[]).await.ok);
    assert!(client.get(PipelineStage::Busca, &url, &[]).await.ok);
    // Three calls: at least two full intervals elapsed.
    assert!(start.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn decode_failure_is_structured_not_panicked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = HttpClient::new(&test_config(0, 0.0), "run-decode", None).unwrap();
    let outcome = client
        .get_json(PipelineStage::Busca, &format!("{}/bad", server.uri()), &[])
        .await;
    assert!(!outcome.ok);
    assert_eq!(outcome.error_class, Some(ErrorClass::Decode));
}
