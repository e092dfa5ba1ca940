//! Admission control.
//!
//! # Responsibilities
//! - Cap the number of requests processed concurrently
//! - Queue overflow by priority, FIFO among equals
//! - Reject when the queue is full, time out stale queue entries
//! - Report load counters on every processed response
//!
//! # Design Decisions
//! - One lock guards the active count and the queue, so pops are atomic and
//!   two drain passes can never hand out the same entry
//! - A slot is an RAII permit; dropping it (on any exit path) frees the slot
//!   and schedules the next drain pass on the runtime instead of recursing
//! - Queued waiters own their deadline. When the timer and a drain pass race,
//!   whichever removes the entry from the queue first decides the outcome

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BinaryHeap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::{AdmissionConfig, PriorityConfig};
use crate::error::{AppError, ErrorKind};
use crate::http::request::request_id_of;
use crate::http::response::{
    format_millis, set_header, unavailable_response, X_ACTIVE_REQUESTS, X_PROCESSING_TIME,
    X_QUEUE_LENGTH, X_QUEUE_TIME,
};
use crate::observability::metrics;

use super::priority::PriorityPolicy;
use super::queue::QueuedRequest;

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Server is overloaded")]
    Overloaded,

    #[error("Request timed out in queue")]
    QueueTimeout,
}

/// Point-in-time load counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    pub active_requests: usize,
    pub queue_length: usize,
    pub max_concurrent_requests: usize,
    pub max_queue_size: usize,
    pub load_percentage: f64,
}

#[derive(Debug, Default)]
struct AdmissionState {
    active: usize,
    queue: BinaryHeap<QueuedRequest>,
    next_seq: u64,
}

#[derive(Debug)]
struct Shared {
    limits: AdmissionConfig,
    state: Mutex<AdmissionState>,
}

/// Bounds concurrent request processing. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    shared: Arc<Shared>,
    policy: Arc<PriorityPolicy>,
}

/// A processing slot. Dropping it frees the slot.
pub struct AdmissionPermit {
    shared: Arc<Shared>,
}

/// Result of a synchronous admission decision.
#[derive(Debug)]
pub enum Ticket {
    /// Capacity was available.
    Ready(AdmissionPermit),
    /// Queued; await [`Ticket::wait`] for the slot.
    Queued(QueuedTicket),
}

/// Handle held by a queued request.
#[derive(Debug)]
pub struct QueuedTicket {
    shared: Arc<Shared>,
    seq: u64,
    deadline: Instant,
    receiver: oneshot::Receiver<AdmissionPermit>,
    settled: bool,
}

impl AdmissionController {
    pub fn new(limits: AdmissionConfig, priority: PriorityConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                limits,
                state: Mutex::new(AdmissionState::default()),
            }),
            policy: Arc::new(PriorityPolicy::new(priority)),
        }
    }

    pub fn limits(&self) -> &AdmissionConfig {
        &self.shared.limits
    }

    /// Decide immediately whether a request runs now, waits, or is rejected.
    /// Never blocks.
    pub fn try_admit(&self, priority: i32) -> Result<Ticket, AdmissionError> {
        let limits = &self.shared.limits;
        let mut state = self.shared.state.lock();

        if state.active < limits.max_concurrent_requests {
            state.active += 1;
            metrics::set_load(state.active, state.queue.len());
            drop(state);
            metrics::record_admission("immediate");
            return Ok(Ticket::Ready(AdmissionPermit {
                shared: self.shared.clone(),
            }));
        }

        if state.queue.len() >= limits.max_queue_size {
            let queued = state.queue.len();
            drop(state);
            metrics::record_admission("rejected");
            tracing::warn!(
                queue_length = queued,
                max_queue_size = limits.max_queue_size,
                "Admission queue full, rejecting request"
            );
            return Err(AdmissionError::Overloaded);
        }

        let (grant, receiver) = oneshot::channel();
        let seq = state.next_seq;
        state.next_seq += 1;
        let enqueued_at = Instant::now();
        state.queue.push(QueuedRequest {
            priority,
            seq,
            enqueued_at,
            grant,
        });
        metrics::set_load(state.active, state.queue.len());
        drop(state);

        metrics::record_admission("queued");
        tracing::debug!(priority, seq, "Request queued");

        Ok(Ticket::Queued(QueuedTicket {
            shared: self.shared.clone(),
            seq,
            deadline: enqueued_at + limits.request_timeout(),
            receiver,
            settled: false,
        }))
    }

    /// Admit, waiting in the queue if needed.
    pub async fn acquire(&self, priority: i32) -> Result<AdmissionPermit, AdmissionError> {
        self.try_admit(priority)?.wait().await
    }

    /// Run `process` once a slot is available and decorate its response with
    /// timing and load headers. Overload and queue timeout never reach `process`.
    pub async fn handle_request<F, Fut>(&self, request: Request, process: F) -> Response
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        let priority = self.policy.score(&request);
        let arrived = Instant::now();

        let permit = match self.acquire(priority).await {
            Ok(permit) => permit,
            Err(AdmissionError::Overloaded) => {
                let request_id = request_id_of(&request);
                return unavailable_response(
                    "Server is currently overloaded. Please try again later.",
                    self.shared.limits.retry_after_secs,
                    request_id.as_deref(),
                );
            }
            Err(AdmissionError::QueueTimeout) => {
                return AppError::new(
                    ErrorKind::RequestTimeout,
                    "Request timed out while waiting in queue",
                )
                .into_response();
            }
        };

        let queue_time = arrived.elapsed();
        let started = Instant::now();
        let mut response = process(request).await;
        let processing_time = started.elapsed();
        drop(permit);

        let stats = self.load_stats();
        set_header(&mut response, X_QUEUE_TIME, &format_millis(queue_time));
        set_header(&mut response, X_PROCESSING_TIME, &format_millis(processing_time));
        set_header(&mut response, X_ACTIVE_REQUESTS, &stats.active_requests.to_string());
        set_header(&mut response, X_QUEUE_LENGTH, &stats.queue_length.to_string());
        response
    }

    pub fn load_stats(&self) -> LoadStats {
        let limits = &self.shared.limits;
        let state = self.shared.state.lock();
        let load_percentage = if limits.max_concurrent_requests == 0 {
            100.0
        } else {
            state.active as f64 / limits.max_concurrent_requests as f64 * 100.0
        };
        LoadStats {
            active_requests: state.active,
            queue_length: state.queue.len(),
            max_concurrent_requests: limits.max_concurrent_requests,
            max_queue_size: limits.max_queue_size,
            load_percentage,
        }
    }

    /// Below 90% of the concurrency cap and 80% of the queue cap.
    pub fn is_healthy(&self) -> bool {
        let stats = self.load_stats();
        stats.active_requests * 10 < stats.max_concurrent_requests * 9
            && stats.queue_length * 10 < stats.max_queue_size * 8
    }
}

impl Ticket {
    pub async fn wait(self) -> Result<AdmissionPermit, AdmissionError> {
        match self {
            Ticket::Ready(permit) => Ok(permit),
            Ticket::Queued(ticket) => ticket.wait().await,
        }
    }
}

impl QueuedTicket {
    pub async fn wait(mut self) -> Result<AdmissionPermit, AdmissionError> {
        let outcome = match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(permit)) => Ok(permit),
            // Sender dropped: a drain pass found the entry expired.
            Ok(Err(_)) => Err(AdmissionError::QueueTimeout),
            Err(_) => {
                if remove_entry(&self.shared, self.seq) {
                    metrics::record_admission("timed_out");
                    tracing::debug!(seq = self.seq, "Queued request timed out");
                    Err(AdmissionError::QueueTimeout)
                } else {
                    // A drain pass already dequeued the entry; its decision stands.
                    (&mut self.receiver)
                        .await
                        .map_err(|_| AdmissionError::QueueTimeout)
                }
            }
        };
        self.settled = true;
        outcome
    }
}

impl Drop for QueuedTicket {
    fn drop(&mut self) {
        if !self.settled {
            remove_entry(&self.shared, self.seq);
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.active = state.active.saturating_sub(1);
            metrics::set_load(state.active, state.queue.len());
        }
        schedule_drain(self.shared.clone());
    }
}

impl fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPermit").finish_non_exhaustive()
    }
}

fn remove_entry(shared: &Shared, seq: u64) -> bool {
    let mut state = shared.state.lock();
    let before = state.queue.len();
    state.queue.retain(|entry| entry.seq != seq);
    let removed = state.queue.len() != before;
    if removed {
        metrics::set_load(state.active, state.queue.len());
    }
    removed
}

fn schedule_drain(shared: Arc<Shared>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { drain(&shared) });
        }
        Err(_) => drain(&shared),
    }
}

/// Hand free slots to the highest-priority live entries.
fn drain(shared: &Arc<Shared>) {
    let timeout = shared.limits.request_timeout();
    loop {
        let (entry, permit) = {
            let mut state = shared.state.lock();
            if state.active >= shared.limits.max_concurrent_requests {
                return;
            }
            let Some(entry) = state.queue.pop() else {
                return;
            };
            if entry.enqueued_at.elapsed() >= timeout {
                // Dropping the sender answers the waiter with a timeout.
                metrics::record_admission("timed_out");
                continue;
            }
            if entry.is_abandoned() {
                continue;
            }
            state.active += 1;
            metrics::set_load(state.active, state.queue.len());
            (
                entry,
                AdmissionPermit {
                    shared: shared.clone(),
                },
            )
        };

        // A waiter that vanished after the check hands the permit back,
        // which frees the slot again.
        if let Err(permit) = entry.grant.send(permit) {
            drop(permit);
        }
    }
}

/// Axum middleware running every request through the controller.
pub async fn admission_middleware(
    State(controller): State<AdmissionController>,
    request: Request,
    next: Next,
) -> Response {
    controller.handle_request(request, |req| next.run(req)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use std::time::Duration;
    use tower::ServiceExt;

    fn controller(max_concurrent: usize, max_queue: usize) -> AdmissionController {
        AdmissionController::new(
            AdmissionConfig {
                max_concurrent_requests: max_concurrent,
                max_queue_size: max_queue,
                request_timeout_ms: 30_000,
                retry_after_secs: 30,
            },
            PriorityConfig::default(),
        )
    }

    fn queued(ticket: Ticket) -> QueuedTicket {
        match ticket {
            Ticket::Queued(t) => t,
            Ticket::Ready(_) => panic!("expected the request to be queued"),
        }
    }

    #[tokio::test]
    async fn test_immediate_below_capacity() {
        let controller = controller(3, 5);
        let mut permits = Vec::new();
        for _ in 0..3 {
            match controller.try_admit(0).unwrap() {
                Ticket::Ready(p) => permits.push(p),
                Ticket::Queued(_) => panic!("should not queue below capacity"),
            }
        }
        let stats = controller.load_stats();
        assert_eq!(stats.active_requests, 3);
        assert_eq!(stats.queue_length, 0);
        assert_eq!(stats.load_percentage, 100.0);
    }

    #[tokio::test]
    async fn test_overflow_rejects_without_queue_growth() {
        let controller = controller(1, 1);
        let _running = controller.acquire(0).await.unwrap();
        let _waiting = queued(controller.try_admit(0).unwrap());
        assert_eq!(controller.load_stats().queue_length, 1);

        let err = controller.try_admit(100).unwrap_err();
        assert_eq!(err, AdmissionError::Overloaded);
        assert_eq!(controller.load_stats().queue_length, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_higher_priority_served_first() {
        let controller = controller(1, 10);
        let running = controller.acquire(0).await.unwrap();

        let mut low = tokio::spawn(controller.try_admit(1).unwrap().wait());
        let mut high = tokio::spawn(controller.try_admit(5).unwrap().wait());

        drop(running);
        let high_permit = (&mut high).await.unwrap().unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), &mut low)
            .await
            .is_err());

        drop(high_permit);
        assert!(low.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_priority_is_fifo() {
        let controller = controller(1, 10);
        let running = controller.acquire(0).await.unwrap();

        let mut first = tokio::spawn(controller.try_admit(3).unwrap().wait());
        let mut second = tokio::spawn(controller.try_admit(3).unwrap().wait());

        drop(running);
        let permit = (&mut first).await.unwrap().unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), &mut second)
            .await
            .is_err());
        drop(permit);
        assert!(second.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_principal_served_before_anonymous() {
        use crate::http::request::{Principal, Role};

        let controller = controller(1, 10);
        let running = controller.acquire(0).await.unwrap();
        let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();

        let submit = |label: &'static str, principal: Option<Principal>| {
            let controller = controller.clone();
            let order_tx = order_tx.clone();
            let mut request = Request::builder()
                .uri("/manuscripts")
                .body(Body::empty())
                .unwrap();
            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            tokio::spawn(async move {
                controller
                    .handle_request(request, |_| async move {
                        let _ = order_tx.send(label);
                        StatusCode::OK.into_response()
                    })
                    .await
            })
        };

        let anonymous = submit("anonymous", None);
        let admin = submit(
            "admin",
            Some(Principal {
                user_id: "editor-in-chief".to_string(),
                role: Role::Admin,
            }),
        );
        while controller.load_stats().queue_length < 2 {
            tokio::task::yield_now().await;
        }

        drop(running);
        assert_eq!(admin.await.unwrap().status(), StatusCode::OK);
        assert_eq!(anonymous.await.unwrap().status(), StatusCode::OK);
        drop(order_tx);

        let mut order = Vec::new();
        while let Some(label) = order_rx.recv().await {
            order.push(label);
        }
        assert_eq!(order, vec!["admin", "anonymous"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_timeout_removes_entry() {
        let controller = controller(1, 10);
        let _running = controller.acquire(0).await.unwrap();

        let ticket = controller.try_admit(0).unwrap();
        assert_eq!(controller.load_stats().queue_length, 1);

        let err = ticket.wait().await.unwrap_err();
        assert_eq!(err, AdmissionError::QueueTimeout);
        assert_eq!(controller.load_stats().queue_length, 0);
        assert_eq!(controller.load_stats().active_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_entry_does_not_consume_capacity() {
        let controller = controller(1, 10);
        let running = controller.acquire(0).await.unwrap();

        let abandoned = controller.try_admit(10).unwrap();
        let waiting = tokio::spawn(controller.try_admit(0).unwrap().wait());
        drop(abandoned);
        assert_eq!(controller.load_stats().queue_length, 1);

        drop(running);
        let permit = waiting.await.unwrap().unwrap();
        assert_eq!(controller.load_stats().active_requests, 1);
        drop(permit);
    }

    #[tokio::test]
    async fn test_permit_drop_frees_slot() {
        let controller = controller(1, 1);
        let permit = controller.acquire(0).await.unwrap();
        assert_eq!(controller.load_stats().active_requests, 1);
        drop(permit);
        assert_eq!(controller.load_stats().active_requests, 0);
    }

    #[tokio::test]
    async fn test_health_thresholds() {
        let controller = controller(10, 10);
        let mut permits = Vec::new();
        for _ in 0..8 {
            permits.push(controller.acquire(0).await.unwrap());
        }
        assert!(controller.is_healthy());
        permits.push(controller.acquire(0).await.unwrap());
        assert!(!controller.is_healthy());
    }

    fn app(controller: AdmissionController) -> Router {
        Router::new()
            .route("/work", get(|| async { "done" }))
            .layer(middleware::from_fn_with_state(controller, admission_middleware))
    }

    #[tokio::test]
    async fn test_middleware_adds_load_headers() {
        let response = app(controller(2, 2))
            .oneshot(Request::builder().uri("/work").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert!(headers[X_QUEUE_TIME].to_str().unwrap().ends_with("ms"));
        assert!(headers[X_PROCESSING_TIME].to_str().unwrap().ends_with("ms"));
        assert_eq!(headers[X_ACTIVE_REQUESTS], "0");
        assert_eq!(headers[X_QUEUE_LENGTH], "0");
    }

    #[tokio::test]
    async fn test_middleware_overload_response() {
        let controller = controller(1, 0);
        let _running = controller.acquire(0).await.unwrap();

        let response = app(controller.clone())
            .oneshot(
                Request::builder()
                    .uri("/work")
                    .header("x-request-id", "req-9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[axum::http::header::RETRY_AFTER], "30");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["type"], "SERVICE_UNAVAILABLE");
        assert_eq!(json["error"]["retryAfter"], 30);
        assert_eq!(json["error"]["requestId"], "req-9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_middleware_queue_timeout_is_408() {
        let controller = controller(1, 5);
        let _running = controller.acquire(0).await.unwrap();

        let response = app(controller.clone())
            .oneshot(Request::builder().uri("/work").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            response.extensions().get::<AppError>().unwrap().kind,
            ErrorKind::RequestTimeout
        );
        assert_eq!(controller.load_stats().queue_length, 0);
    }
}
