//! # Admitted Evidence Store
//!
//! The latest admitted evidence per resource id. Waiting requests consult it
//! to decide which related resources are still missing, and read the
//! related resources from it once they become ready.
//!
//! All operations are synchronous: the `parking_lot::RwLock` is never held
//! across an `.await` point.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use vigil_core::{Evidence, Resource};

/// An evidence together with its decoded resource.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittedEvidence {
    /// The evidence as submitted.
    pub evidence: Evidence,
    /// Its decoded resource.
    pub resource: Resource,
}

/// Thread-safe, cloneable map from resource id to the latest evidence.
#[derive(Debug, Clone, Default)]
pub struct EvidenceStore {
    data: Arc<RwLock<HashMap<String, Arc<AdmittedEvidence>>>>,
}

impl EvidenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an evidence under its resource id, replacing any older one.
    pub fn insert(&self, admitted: Arc<AdmittedEvidence>) -> Option<Arc<AdmittedEvidence>> {
        let key = admitted.resource.id.clone();
        self.data.write().insert(key, admitted)
    }

    /// The latest evidence for a resource.
    pub fn get(&self, resource_id: &str) -> Option<Arc<AdmittedEvidence>> {
        self.data.read().get(resource_id).cloned()
    }

    /// Whether an evidence for the resource has been admitted.
    pub fn contains(&self, resource_id: &str) -> bool {
        self.data.read().contains_key(resource_id)
    }

    /// The subset of `resource_ids` with no admitted evidence.
    pub fn missing<'a>(&self, resource_ids: impl IntoIterator<Item = &'a String>) -> HashSet<String> {
        let data = self.data.read();
        resource_ids
            .into_iter()
            .filter(|id| !data.contains_key(id.as_str()))
            .cloned()
            .collect()
    }

    /// Number of resources with an admitted evidence.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether nothing has been admitted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
