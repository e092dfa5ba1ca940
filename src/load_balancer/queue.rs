//! Admission queue entries.

use std::cmp::Ordering;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::admission::AdmissionPermit;

/// A request waiting for a processing slot.
///
/// The entry only holds the channel that hands the waiter its permit; the
/// request itself stays with the task awaiting the other end.
#[derive(Debug)]
pub struct QueuedRequest {
    pub priority: i32,
    pub seq: u64,
    pub enqueued_at: Instant,
    pub grant: oneshot::Sender<AdmissionPermit>,
}

impl QueuedRequest {
    pub fn is_abandoned(&self) -> bool {
        self.grant.is_closed()
    }
}

// Max-heap order: higher priority first, then lower sequence number (FIFO).
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn entry(priority: i32, seq: u64) -> QueuedRequest {
        let (grant, _rx) = oneshot::channel();
        QueuedRequest {
            priority,
            seq,
            enqueued_at: Instant::now(),
            grant,
        }
    }

    #[tokio::test]
    async fn test_heap_orders_by_priority_then_arrival() {
        let mut heap = BinaryHeap::new();
        heap.push(entry(0, 1));
        heap.push(entry(10, 2));
        heap.push(entry(-5, 3));
        heap.push(entry(10, 4));
        heap.push(entry(0, 5));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![2, 4, 1, 5, 3]);
    }

    #[tokio::test]
    async fn test_abandoned_when_waiter_gone() {
        let (grant, rx) = oneshot::channel();
        let queued = QueuedRequest {
            priority: 0,
            seq: 0,
            enqueued_at: Instant::now(),
            grant,
        };
        assert!(!queued.is_abandoned());
        drop(rx);
        assert!(queued.is_abandoned());
    }
}
