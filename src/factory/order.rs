use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

const NODE_ID: [u8; 6] = *b"factry";

/// Correlates the log lines of one fulfilment cycle. Never sent on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::now_v1(&NODE_ID))
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub requested_quantity: u32,
    pub worker_count: u32,
}

impl Order {
    pub fn new(requested_quantity: u32, worker_count: u32) -> Self {
        Self {
            id: OrderId::new(),
            requested_quantity,
            worker_count,
        }
    }
}

/// Units of an order not yet claimed by any sub-factory, and the
/// sub-factories still owing a completion report.
#[derive(Debug)]
pub struct OrderCounter {
    remaining: Mutex<u32>,
    unreported: AtomicU32,
}

impl OrderCounter {
    pub fn new(quantity: u32) -> Self {
        Self::with_workers(quantity, 0)
    }

    pub fn for_order(order: &Order) -> Self {
        Self::with_workers(order.requested_quantity, order.worker_count)
    }

    fn with_workers(quantity: u32, workers: u32) -> Self {
        Self {
            remaining: Mutex::new(quantity),
            unreported: AtomicU32::new(workers),
        }
    }

    /// Takes up to `requested` units. Returns 0 once the order is drained.
    pub fn claim(&self, requested: u32) -> u32 {
        // A plain integer is never left half-updated, so a poisoned lock is
        // still safe to use.
        let mut remaining = self
            .remaining
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let actual = requested.min(*remaining);
        *remaining -= actual;
        actual
    }

    pub fn remaining(&self) -> u32 {
        *self
            .remaining
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Called by a sub-factory right before it sends its completion report.
    pub fn mark_reported(&self) {
        let _ = self
            .unreported
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Once this reaches 0 the requester may already hold every completion.
    pub fn unreported(&self) -> u32 {
        self.unreported.load(Ordering::Acquire)
    }
}
