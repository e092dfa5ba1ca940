//! End-to-end tests of the request pipeline over real sockets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

mod common;

#[tokio::test]
async fn test_correlation_and_request_ids() {
    let gateway = common::spawn_gateway(common::test_config()).await;
    let client = common::client();

    let res = client
        .get(gateway.url("/health"))
        .header("x-correlation-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-correlation-id"], "abc-123");

    let request_id = res.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());

    let res = client
        .get(gateway.url("/health"))
        .header("x-request-id", "req-77")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "req-77");
    assert_eq!(res.headers()["x-correlation-id"], "req-77");
}

#[tokio::test]
async fn test_admission_headers_on_every_response() {
    let gateway = common::spawn_gateway(common::test_config()).await;

    let res = common::client().get(gateway.url("/health")).send().await.unwrap();
    for header in ["x-queue-time", "x-processing-time", "x-active-requests", "x-queue-length"] {
        assert!(res.headers().contains_key(header), "missing {}", header);
    }
    assert!(res.headers()["x-processing-time"].to_str().unwrap().ends_with("ms"));
}

#[tokio::test]
async fn test_unknown_route_is_classified_not_found() {
    let gateway = common::spawn_gateway(common::test_config()).await;

    let res = common::client()
        .get(gateway.url("/no/such/route"))
        .header("x-request-id", "req-404")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["type"], "NOT_FOUND");
    assert_eq!(body["error"]["requestId"], "req-404");
}

#[tokio::test]
async fn test_transient_dependency_failure_is_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "warming up".to_string())
            } else {
                (200, "manuscript accepted".to_string())
            }
        }
    })
    .await;

    let mut config = common::test_config();
    config.dependencies.push(common::dependency("papers", backend, false));
    let gateway = common::spawn_gateway(config).await;

    let res = common::client()
        .post(gateway.url("/upstream/papers/submit"))
        .body("title=Resilience")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "manuscript accepted");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let retries = gateway.sink.retry_messages();
    assert_eq!(retries.len(), 2);
    assert!(retries[0].starts_with("Retry attempt 1:"));
    assert!(retries[1].starts_with("Retry attempt 2:"));
}

#[tokio::test]
async fn test_retries_exhausted_then_surfaced() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = common::start_programmable_backend(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (502, "bad".to_string()) }
    })
    .await;

    let mut config = common::test_config();
    config.recovery.max_retries = 2;
    config.circuit_breaker.failure_threshold = 10;
    config.dependencies.push(common::dependency("reviews", backend, false));
    let gateway = common::spawn_gateway(config).await;

    let res = common::client()
        .get(gateway.url("/upstream/reviews/pending"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["type"], "EXTERNAL_SERVICE_ERROR");
    assert!(body["error"]["requestId"].is_string());
    assert_eq!(gateway.sink.requests.lock().last().unwrap().retries, 2);
}

#[tokio::test]
async fn test_circuit_opens_and_fails_fast() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = common::start_programmable_backend(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (503, "down".to_string()) }
    })
    .await;

    let mut config = common::test_config();
    config.recovery.max_retries = 0;
    config.circuit_breaker.failure_threshold = 2;
    config.dependencies.push(common::dependency("search", backend, false));
    let gateway = common::spawn_gateway(config).await;
    let client = common::client();

    for _ in 0..2 {
        let res = client.get(gateway.url("/upstream/search")).send().await.unwrap();
        assert_eq!(res.status(), 502);
    }

    let res = client.get(gateway.url("/upstream/search")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["type"], "CIRCUIT_BREAKER_ERROR");
    assert!(body["error"]["message"].as_str().unwrap().contains("search"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_dependency_is_not_found() {
    let gateway = common::spawn_gateway(common::test_config()).await;
    let res = common::client()
        .get(gateway.url("/upstream/ghost/anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_overload_rejected_with_retry_after() {
    let backend = common::start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "slow".to_string())
    })
    .await;

    let mut config = common::test_config();
    config.admission.max_concurrent_requests = 1;
    config.admission.max_queue_size = 0;
    config.dependencies.push(common::dependency("slow", backend, false));
    let gateway = common::spawn_gateway(config).await;
    let client = common::client();

    let slow = tokio::spawn({
        let client = client.clone();
        let url = gateway.url("/upstream/slow");
        async move { client.get(url).send().await.unwrap().status() }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = client.get(gateway.url("/upstream/slow")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.headers()["retry-after"], "30");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["type"], "SERVICE_UNAVAILABLE");
    assert_eq!(body["error"]["retryAfter"], 30);

    assert_eq!(slow.await.unwrap(), 200);
}

#[tokio::test]
async fn test_queued_requests_all_complete() {
    let backend = common::start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        (200, "ok".to_string())
    })
    .await;

    let mut config = common::test_config();
    config.admission.max_concurrent_requests = 2;
    config.admission.max_queue_size = 50;
    config.dependencies.push(common::dependency("papers", backend, false));
    let gateway = common::spawn_gateway(config).await;
    let client = common::client();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let client = client.clone();
            let url = gateway.url("/upstream/papers");
            tokio::spawn(async move { client.get(url).send().await.unwrap().status() })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), 200);
    }

    let res = client.get(gateway.url("/health/load")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["healthy"], true);
    assert_eq!(body["stats"]["queueLength"], 0);
    assert_eq!(body["stats"]["maxConcurrentRequests"], 2);
}
