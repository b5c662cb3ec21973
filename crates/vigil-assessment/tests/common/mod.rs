//! Fixtures shared by the assessment integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;
use vigil_assessment::{AssessmentError, AssessmentService, HookError, ResultHook};
use vigil_core::{AssessmentResult, Evidence};
use vigil_policy::RuleCatalog;

/// Metrics the bundled catalog defines for virtual machines.
pub const VM_METRICS: [&str; 11] = [
    "ActivityLoggingEnabled",
    "AutomaticUpdatesEnabled",
    "AutomaticUpdatesInterval",
    "BootLoggingEnabled",
    "BootLoggingRetention",
    "GeoLocation",
    "InternetAccessibleEndpoint",
    "MalwareProtectionDaysSinceActiveScan",
    "MalwareProtectionEnabled",
    "OSLoggingEnabled",
    "OSLoggingRetention",
];

pub const TARGET: &str = "00000000-0000-0000-0000-000000000000";

pub fn bundle_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../policies/bundles")
}

pub fn catalog() -> Arc<RuleCatalog> {
    Arc::new(RuleCatalog::from_dir(bundle_dir()).expect("bundled catalog loads"))
}

/// A service over the bundled catalog using catalog defaults.
pub fn service() -> AssessmentService {
    let catalog = catalog();
    AssessmentService::new(catalog.clone(), catalog)
}

/// A virtual machine that satisfies every bundled VM metric.
pub fn compliant_vm(id: &str) -> Value {
    json!({
        "id": id,
        "name": id,
        "type": ["VirtualMachine", "Compute", "Resource"],
        "automaticUpdates": {"enabled": true, "interval": 7},
        "bootLogging": {"enabled": true, "retentionPeriod": 35},
        "osLogging": {"enabled": true, "retentionPeriod": 90},
        "malwareProtection": {"enabled": true, "daysSinceActiveScan": 1},
        "activityLogging": {"enabled": true},
        "internetAccessibleEndpoint": false,
        "geoLocation": {"region": "westeurope"}
    })
}

pub fn account(id: &str) -> Value {
    json!({"id": id, "type": ["Account", "Resource"]})
}

pub fn evidence(resource: Value, related: &[&str]) -> Evidence {
    Evidence {
        id: Uuid::new_v4().to_string(),
        certification_target_id: TARGET.to_string(),
        tool_id: "vigil-discovery".to_string(),
        timestamp: Some(Utc::now()),
        resource: Some(resource),
        raw: None,
        related_resource_ids: related.iter().map(|s| s.to_string()).collect(),
    }
}

/// Everything the hooks of a service have seen.
#[derive(Default)]
pub struct Recorder {
    pub results: Mutex<Vec<AssessmentResult>>,
    pub errors: Mutex<Vec<String>>,
}

impl ResultHook for Recorder {
    fn on_result(
        &self,
        result: Option<&AssessmentResult>,
        error: Option<&AssessmentError>,
    ) -> Result<(), HookError> {
        if let Some(result) = result {
            self.results.lock().push(result.clone());
        }
        if let Some(error) = error {
            self.errors.lock().push(error.to_string());
        }
        Ok(())
    }
}

impl Recorder {
    pub fn attach(service: &AssessmentService) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        service.register_result_hook(recorder.clone());
        recorder
    }

    pub fn results_for(&self, resource_id: &str) -> Vec<AssessmentResult> {
        self.results
            .lock()
            .iter()
            .filter(|r| r.resource_id == resource_id)
            .cloned()
            .collect()
    }
}

/// Wait for every parked evidence to finish, failing the test after a
/// generous deadline.
pub async fn settle(service: &AssessmentService) {
    tokio::time::timeout(Duration::from_secs(5), service.wait_idle())
        .await
        .expect("waiting requests did not drain");
}
