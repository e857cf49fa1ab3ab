//! Parking lot for DAGs suspended on asynchronous continuations (T4).
//!
//! When a node returns a continuation token instead of a result, the
//! engine parks the owning DAG here, keyed by the continuation. Poll
//! continuations carry a wake deadline; webhook continuations wait for
//! an external arrival. The lot is bounded: a full lot with no runnable
//! DAG is the engine's signal to request deep sleep.

use std::collections::HashMap;

use tokio::time::{Duration, Instant};

use crate::domain::models::ids::{DagId, NodeId};

/// One parked continuation.
#[derive(Debug, Clone)]
pub struct ParkedDag {
    pub dag_id: DagId,
    pub node_id: NodeId,
    pub continuation: String,
    /// Set for poll-style continuations; `None` waits on a webhook.
    pub resume_at: Option<Instant>,
}

/// Bounded waiting queue keyed by continuation token.
pub struct ParkingLot {
    capacity: usize,
    parked: HashMap<String, ParkedDag>,
}

impl ParkingLot {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), parked: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.parked.len() >= self.capacity
    }

    /// Park a poll continuation. Returns `false` when the lot is full.
    pub fn park_poll(
        &mut self,
        dag_id: DagId,
        node_id: NodeId,
        continuation: impl Into<String>,
        poll_after: Duration,
    ) -> bool {
        if self.is_full() {
            return false;
        }
        let continuation = continuation.into();
        self.parked.insert(
            continuation.clone(),
            ParkedDag {
                dag_id,
                node_id,
                continuation,
                resume_at: Some(Instant::now() + poll_after),
            },
        );
        true
    }

    /// Park a webhook continuation. Returns `false` when the lot is full.
    pub fn park_webhook(
        &mut self,
        dag_id: DagId,
        node_id: NodeId,
        continuation: impl Into<String>,
    ) -> bool {
        if self.is_full() {
            return false;
        }
        let continuation = continuation.into();
        self.parked.insert(
            continuation.clone(),
            ParkedDag { dag_id, node_id, continuation, resume_at: None },
        );
        true
    }

    /// Remove and return the continuation resolved by an arrival.
    pub fn resolve(&mut self, continuation: &str) -> Option<ParkedDag> {
        self.parked.remove(continuation)
    }

    /// Remove and return every poll continuation whose deadline passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<ParkedDag> {
        let due: Vec<String> = self
            .parked
            .iter()
            .filter(|(_, p)| p.resume_at.is_some_and(|at| at <= now))
            .map(|(k, _)| k.clone())
            .collect();
        due.into_iter().filter_map(|k| self.parked.remove(&k)).collect()
    }

    /// The earliest poll deadline, for deep-sleep scheduling.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.parked.values().filter_map(|p| p.resume_at).min()
    }

    /// Drop every parked continuation owned by `dag_id`.
    pub fn forget_dag(&mut self, dag_id: DagId) {
        self.parked.retain(|_, p| p.dag_id != dag_id);
    }
}
