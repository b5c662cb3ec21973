//! # Cross-Evidence Dependency Resolution
//!
//! Evidences that name related resources are assessed only once evidence
//! for every related resource has been admitted, whatever the arrival
//! order.

mod common;

use common::*;
use vigil_core::AssessmentStatus;

// =========================================================================
// Arrival order
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn evidence_without_relations_is_assessed_immediately() {
    let service = service();
    let recorder = Recorder::attach(&service);

    let response = service.assess_evidence(evidence(compliant_vm("vm-1"), &[])).await;

    assert_eq!(response.status, AssessmentStatus::Assessed);
    assert_eq!(recorder.results_for("vm-1").len(), VM_METRICS.len());
    assert_eq!(service.waiting_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn self_reference_does_not_wait() {
    let service = service();
    let recorder = Recorder::attach(&service);

    let response = service
        .assess_evidence(evidence(compliant_vm("vm-1"), &["vm-1", "vm-1"]))
        .await;

    assert_eq!(response.status, AssessmentStatus::Assessed);
    assert_eq!(recorder.results_for("vm-1").len(), VM_METRICS.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn related_evidence_already_present_means_no_wait() {
    let service = service();
    let recorder = Recorder::attach(&service);

    let first = service.assess_evidence(evidence(account("acc-1"), &[])).await;
    let second = service
        .assess_evidence(evidence(compliant_vm("vm-1"), &["acc-1"]))
        .await;

    assert_eq!(first.status, AssessmentStatus::Assessed);
    assert_eq!(second.status, AssessmentStatus::Assessed);
    assert_eq!(recorder.results_for("vm-1").len(), VM_METRICS.len());
    assert!(recorder.results_for("acc-1").is_empty());
    assert_eq!(service.waiting_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_evidence_is_assessed_when_related_arrives() {
    let service = service();
    let recorder = Recorder::attach(&service);

    let waiting = service
        .assess_evidence(evidence(compliant_vm("vm-1"), &["acc-1"]))
        .await;
    assert_eq!(waiting.status, AssessmentStatus::WaitingForRelated);
    assert_eq!(service.waiting_count(), 1);
    assert!(recorder.results_for("vm-1").is_empty());

    let arrived = service.assess_evidence(evidence(account("acc-1"), &[])).await;
    assert_eq!(arrived.status, AssessmentStatus::Assessed);

    settle(&service).await;
    assert_eq!(recorder.results_for("vm-1").len(), VM_METRICS.len());
    assert_eq!(service.waiting_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waits_for_every_related_resource() {
    let service = service();
    let recorder = Recorder::attach(&service);

    let response = service
        .assess_evidence(evidence(compliant_vm("vm-1"), &["acc-1", "acc-2"]))
        .await;
    assert_eq!(response.status, AssessmentStatus::WaitingForRelated);

    service.assess_evidence(evidence(account("acc-1"), &[])).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(recorder.results_for("vm-1").is_empty());
    assert_eq!(service.waiting_count(), 1);

    service.assess_evidence(evidence(account("acc-2"), &[])).await;
    settle(&service).await;
    assert_eq!(recorder.results_for("vm-1").len(), VM_METRICS.len());
}

// =========================================================================
// Mutual and shared dependencies
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mutual_dependency_resolves_both_sides() {
    let service = service();
    let recorder = Recorder::attach(&service);

    let a = service
        .assess_evidence(evidence(compliant_vm("vm-1"), &["vm-2"]))
        .await;
    let b = service
        .assess_evidence(evidence(compliant_vm("vm-2"), &["vm-1"]))
        .await;

    assert_eq!(a.status, AssessmentStatus::WaitingForRelated);
    assert_eq!(b.status, AssessmentStatus::Assessed);

    settle(&service).await;
    assert_eq!(recorder.results_for("vm-1").len(), VM_METRICS.len());
    assert_eq!(recorder.results_for("vm-2").len(), VM_METRICS.len());
    assert!(service.waiting_evidence_ids().is_empty());
}

/// Submit both halves of a mutual dependency in the given order and report
/// (results for vm-1, results for vm-2, still waiting).
async fn resolve_pair(vm_1_first: bool) -> (usize, usize, usize) {
    let service = service();
    let recorder = Recorder::attach(&service);
    let a = evidence(compliant_vm("vm-1"), &["vm-2"]);
    let b = evidence(compliant_vm("vm-2"), &["vm-1"]);
    let (first, second) = if vm_1_first { (a, b) } else { (b, a) };

    let first = service.assess_evidence(first).await;
    let second = service.assess_evidence(second).await;
    assert_eq!(first.status, AssessmentStatus::WaitingForRelated);
    assert_eq!(second.status, AssessmentStatus::Assessed);

    settle(&service).await;
    (
        recorder.results_for("vm-1").len(),
        recorder.results_for("vm-2").len(),
        service.waiting_count(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn arrival_order_does_not_change_the_outcome() {
    let forward = resolve_pair(true).await;
    let backward = resolve_pair(false).await;

    assert_eq!(forward, (VM_METRICS.len(), VM_METRICS.len(), 0));
    assert_eq!(forward, backward);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_arrival_releases_every_waiter() {
    let service = service();
    let recorder = Recorder::attach(&service);

    for vm in ["vm-1", "vm-2", "vm-3"] {
        let response = service
            .assess_evidence(evidence(compliant_vm(vm), &["acc-1"]))
            .await;
        assert_eq!(response.status, AssessmentStatus::WaitingForRelated);
    }
    assert_eq!(service.waiting_count(), 3);

    service.assess_evidence(evidence(account("acc-1"), &[])).await;
    settle(&service).await;

    for vm in ["vm-1", "vm-2", "vm-3"] {
        assert_eq!(recorder.results_for(vm).len(), VM_METRICS.len(), "{vm}");
    }
    assert_eq!(service.waiting_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_all_resolve() {
    let service = service();
    let recorder = Recorder::attach(&service);

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let own = format!("vm-{i}");
            let next = format!("vm-{}", (i + 1) % 20);
            service
                .assess_evidence(evidence(compliant_vm(&own), &[next.as_str()]))
                .await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        assert_ne!(response.status, AssessmentStatus::Failed);
    }

    settle(&service).await;
    assert_eq!(recorder.results.lock().len(), 20 * VM_METRICS.len());
    assert_eq!(service.waiting_count(), 0);
}

// =========================================================================
// Registry hygiene
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_waiting_evidence_is_rejected() {
    let service = service();
    let recorder = Recorder::attach(&service);

    let original = evidence(compliant_vm("vm-1"), &["acc-1"]);
    let duplicate = original.clone();

    let first = service.assess_evidence(original).await;
    let second = service.assess_evidence(duplicate).await;

    assert_eq!(first.status, AssessmentStatus::WaitingForRelated);
    assert_eq!(second.status, AssessmentStatus::Failed);
    assert!(second.message.unwrap().contains("already waiting"));
    assert_eq!(service.waiting_count(), 1);
    assert_eq!(recorder.errors.lock().len(), 1);

    service.assess_evidence(evidence(account("acc-1"), &[])).await;
    settle(&service).await;
    assert_eq!(recorder.results_for("vm-1").len(), VM_METRICS.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_evidence_does_not_satisfy_dependencies() {
    let service = service();

    service
        .assess_evidence(evidence(compliant_vm("vm-1"), &["acc-1"]))
        .await;

    let mut invalid = evidence(account("acc-1"), &[]);
    invalid.tool_id.clear();
    let response = service.assess_evidence(invalid).await;

    assert_eq!(response.status, AssessmentStatus::Failed);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(service.waiting_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unresolved_evidence_stays_parked() {
    let service = service();
    let parked = evidence(compliant_vm("vm-1"), &["never-submitted"]);
    let id = parked.id.clone();

    service.assess_evidence(parked).await;

    assert_eq!(service.waiting_evidence_ids(), vec![id]);
    let idle = tokio::time::timeout(
        std::time::Duration::from_millis(100),
        service.wait_idle(),
    )
    .await;
    assert!(idle.is_err());
}
