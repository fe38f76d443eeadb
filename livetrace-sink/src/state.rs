use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

/// Everything the sink remembers: accepted envelopes in arrival order
/// plus accept/reject counters for the health surface.
#[derive(Default)]
pub struct SinkState {
    events: RwLock<Vec<Value>>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl SinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Value) {
        self.events.write().push(event);
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn reject(&self) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<Value> {
        self.events.read().clone()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }
}
