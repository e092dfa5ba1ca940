//! Health gate and admin API against a running gateway.

use std::net::SocketAddr;

use manuscript_gateway::config::CircuitBreakerConfig;
use manuscript_gateway::error::ErrorKind;
use manuscript_gateway::health::HealthGate;
use manuscript_gateway::resilience::{CircuitBreaker, CircuitBreakerRegistry};
use serde_json::Value;
use std::sync::Arc;

mod common;

const KEY: &str = "test-admin-key";

fn unused_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[tokio::test]
async fn test_gate_names_only_open_critical_dependencies() {
    let registry = Arc::new(CircuitBreakerRegistry::new());
    for name in ["db", "cache", "search"] {
        registry.register(CircuitBreaker::new(name, CircuitBreakerConfig::default()));
    }
    registry.force_open("db");
    let gate = HealthGate::new(registry);

    let err = gate.check(&["db", "cache"]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitBreaker);
    assert!(err.message.contains("db"));
    assert!(!err.message.contains("cache"));

    assert!(gate.check(&["cache"]).is_ok());
}

#[tokio::test]
async fn test_health_endpoint_follows_breakers() {
    let mut config = common::test_config();
    config.admin.enabled = true;
    config.admin.api_key = KEY.to_string();
    config.dependencies = vec![
        common::dependency("db", unused_addr(9), true),
        common::dependency("cache", unused_addr(9), false),
        common::dependency("search", unused_addr(9), true),
    ];
    let gateway = common::spawn_gateway(config).await;
    let client = common::client();

    let res = client.get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["circuitBreakers"]["db"]["state"], "CLOSED");

    let res = client
        .post(gateway.url("/admin/breakers/db/open"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let snapshot: Value = res.json().await.unwrap();
    assert_eq!(snapshot["state"], "OPEN");

    // Non-critical breakers never fail the gate.
    client
        .post(gateway.url("/admin/breakers/cache/open"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();

    let res = client.get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["type"], "CIRCUIT_BREAKER_ERROR");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("db"));
    assert!(!message.contains("cache"));
    assert!(!message.contains("search"));

    let res = client
        .post(gateway.url("/admin/breakers/reset-all"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = client.get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_admin_requires_token() {
    let mut config = common::test_config();
    config.admin.enabled = true;
    config.admin.api_key = KEY.to_string();
    let gateway = common::spawn_gateway(config).await;
    let client = common::client();

    let res = client.get(gateway.url("/admin/breakers")).send().await.unwrap();
    assert_eq!(res.status(), 401);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["type"], "AUTHENTICATION_ERROR");

    let res = client
        .get(gateway.url("/admin/breakers/ghost"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = client
        .get(gateway.url("/admin/load"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["healthy"], true);
    assert_eq!(body["maxQueueSize"], 500);
}

#[tokio::test]
async fn test_admin_disabled_by_default() {
    let gateway = common::spawn_gateway(common::test_config()).await;
    let res = common::client()
        .get(gateway.url("/admin/status"))
        .bearer_auth("CHANGE_ME_IN_PRODUCTION")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}
