//! Shared utilities for integration tests.

#![allow(dead_code)]

use manuscript_gateway::config::{DependencyConfig, GatewayConfig};
use manuscript_gateway::observability::{ErrorRecord, MonitoringSink, RequestRecord};
use manuscript_gateway::{HttpServer, Shutdown};
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Sink that keeps every record for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub errors: Mutex<Vec<ErrorRecord>>,
    pub requests: Mutex<Vec<RequestRecord>>,
}

impl RecordingSink {
    pub fn retry_messages(&self) -> Vec<String> {
        self.errors
            .lock()
            .iter()
            .filter(|r| r.message.starts_with("Retry attempt"))
            .map(|r| r.message.clone())
            .collect()
    }
}

impl MonitoringSink for RecordingSink {
    fn record_error(&self, record: ErrorRecord) {
        self.errors.lock().push(record);
    }

    fn record_request(&self, record: RequestRecord) {
        self.requests.lock().push(record);
    }
}

/// A running gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub sink: Arc<RecordingSink>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the gateway with `config`, returning once it accepts connections.
pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let sink = Arc::new(RecordingSink::default());
    let server = HttpServer::with_sink(config, sink.clone()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (_, config_updates) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestGateway {
        addr,
        shutdown,
        sink,
    }
}

/// Config with fast retries and no metrics listener.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.observability.metrics_enabled = false;
    config.recovery.retry_delay_ms = 10;
    config
}

pub fn dependency(name: &str, addr: SocketAddr, critical: bool) -> DependencyConfig {
    DependencyConfig {
        name: name.to_string(),
        address: format!("http://{}", addr),
        critical,
        timeout_ms: 2_000,
        failure_threshold: None,
        reset_timeout_ms: None,
        monitoring_period_ms: None,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Start a mock dependency whose status and body come from `f`, one call per request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let (status, body) = f().await;
                respond(socket, status, &body).await;
            });
        }
    });
    addr
}

async fn respond(mut socket: TcpStream, status: u16, body: &str) {
    read_request(&mut socket).await;

    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "OK",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Consume the request head and any Content-Length body so closing the
/// socket does not reset the connection.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut remaining = content_length.saturating_sub(buf.len() - head_end);
    while remaining > 0 {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => remaining = remaining.saturating_sub(n),
        }
    }
}
