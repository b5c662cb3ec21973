//! # Waiting Requests
//!
//! An evidence whose related resources have not all been admitted yet is
//! parked as a [`WaitingRequest`]. Each request owns the receiving end of an
//! unbounded channel; the [`WaitingRegistry`] keeps the sending ends keyed
//! by evidence id.
//!
//! ## Protocol
//!
//! - Admitting any evidence broadcasts its resource id to every registered
//!   request for a different resource ([`WaitingRegistry::inform`]). Each
//!   broadcast is one non-blocking send per request.
//! - A request drains its channel in its own task
//!   ([`WaitingRequest::wait_ready`]) and removes every announced id from
//!   its outstanding set. Ids it was not waiting for are ignored.
//! - Once the set is empty the owner assesses the evidence and removes the
//!   registration.
//!
//! [`Pending`] counts live requests so callers can wait for all of them to
//! drain.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};

use crate::error::AssessmentError;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Registration {
    resource_id: String,
    tx: mpsc::UnboundedSender<String>,
}

/// Sending ends of all waiting requests, keyed by evidence id.
#[derive(Debug, Default)]
pub struct WaitingRegistry {
    requests: RwLock<HashMap<String, Registration>>,
}

impl WaitingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an evidence and return the receiver of its notifications.
    ///
    /// Fails if the evidence id is already registered.
    pub fn register(
        &self,
        evidence_id: &str,
        resource_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<String>, AssessmentError> {
        let mut requests = self.requests.write();
        if requests.contains_key(evidence_id) {
            return Err(AssessmentError::AlreadyWaiting {
                evidence_id: evidence_id.to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        requests.insert(
            evidence_id.to_string(),
            Registration {
                resource_id: resource_id.to_string(),
                tx,
            },
        );
        Ok(rx)
    }

    /// Announce that `resource_id` is available to every request waiting on
    /// behalf of another resource. Returns the number of requests notified.
    pub fn inform(&self, resource_id: &str) -> usize {
        let requests = self.requests.read();
        requests
            .values()
            .filter(|r| r.resource_id != resource_id)
            .filter(|r| r.tx.send(resource_id.to_string()).is_ok())
            .count()
    }

    /// Remove a registration. Returns whether it existed.
    pub fn remove(&self, evidence_id: &str) -> bool {
        self.requests.write().remove(evidence_id).is_some()
    }

    /// Whether the evidence is registered.
    pub fn contains(&self, evidence_id: &str) -> bool {
        self.requests.read().contains_key(evidence_id)
    }

    /// Ids of all registered evidences, sorted.
    pub fn evidence_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.requests.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered requests.
    pub fn len(&self) -> usize {
        self.requests.read().len()
    }

    /// Whether no request is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// An evidence waiting for related resources.
#[derive(Debug)]
pub struct WaitingRequest<T> {
    /// What the owner needs to resume the assessment.
    pub payload: T,
    started: Instant,
    waiting_for: HashSet<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl<T> WaitingRequest<T> {
    /// Park `payload` until every id in `waiting_for` has been announced on
    /// `rx`.
    pub fn new(payload: T, waiting_for: HashSet<String>, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            payload,
            started: Instant::now(),
            waiting_for,
            rx,
        }
    }

    /// Drain notifications until nothing is outstanding.
    ///
    /// Returns `false` if the channel closed first.
    pub async fn wait_ready(&mut self) -> bool {
        while !self.waiting_for.is_empty() {
            match self.rx.recv().await {
                Some(resource_id) => {
                    if self.waiting_for.remove(&resource_id) {
                        tracing::debug!(
                            resource_id = %resource_id,
                            outstanding = self.waiting_for.len(),
                            "related resource arrived"
                        );
                    }
                }
                None => return false,
            }
        }
        true
    }

    /// Related resource ids not yet announced.
    pub fn waiting_for(&self) -> &HashSet<String> {
        &self.waiting_for
    }

    /// Time since the request was parked.
    pub fn waited(&self) -> Duration {
        self.started.elapsed()
    }
}

// ---------------------------------------------------------------------------
// Pending counter
// ---------------------------------------------------------------------------

/// Counts live waiting requests and wakes waiters when it drops to zero.
#[derive(Debug, Default)]
pub struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    /// Record a new live request.
    pub fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a finished request.
    pub fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Number of live requests.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no request is live.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}
