//! Integration tests for the request approval workflow and its atomic
//! hand-off to the domain lifecycle.

mod common;

use std::sync::Arc;

use common::{harness, request_for, unknown_domain};
use registrar_core::domain::model::{DomainState, PendingOperation};
use registrar_core::domain::store::DomainStore;
use registrar_core::errors::LifecycleError;
use registrar_core::request::model::{RejectionReason, RequestState};
use registrar_core::request::state_machine::RequestWorkflow;
use registrar_core::request::store::{MemoryRequestStore, RequestStore};

struct WorkflowHarness {
    h: common::Harness,
    requests: Arc<MemoryRequestStore>,
    workflow: RequestWorkflow,
}

fn workflow_harness() -> WorkflowHarness {
    let h = harness();
    let requests = Arc::new(MemoryRequestStore::new());
    let workflow = RequestWorkflow::new(requests.clone(), h.store.clone(), h.events.clone());
    WorkflowHarness {
        h,
        requests,
        workflow,
    }
}

#[tokio::test]
async fn approval_atomically_creates_the_domain() {
    let wh = workflow_harness();
    let mut rx = wh.h.events.subscribe();
    let id = wh.workflow.create(request_for("city.gov")).await.unwrap();
    wh.workflow.submit(id, "jo@city.gov").await.unwrap();
    wh.workflow.begin_review(id, "staff@gov").await.unwrap();

    let domain = wh.workflow.approve(id, "staff@gov").await.unwrap();

    // The domain exists locally in Unknown with the request's contacts and
    // the requester as first manager, queued for provisioning.
    let stored = wh.h.store.get(domain.name.as_str()).await.unwrap();
    assert_eq!(stored.state, DomainState::Unknown);
    assert_eq!(stored.contacts.len(), 4);
    assert_eq!(stored.managers, vec!["jo@city.gov".to_string()]);
    assert_eq!(stored.sync.pending, Some(PendingOperation::Provision));
    assert!(stored.sync.next_retry_at.is_some());
    assert_eq!(stored.request_id, id);

    // The request is terminally approved and permanently linked.
    let request = wh.requests.get(id).await.unwrap();
    assert_eq!(request.state, RequestState::Approved);
    assert_eq!(request.approved_domain.as_ref(), Some(&domain.name));

    // The approval decision itself never talks to the registry.
    assert!(wh.h.registry.command_kinds().is_empty());
    assert_eq!(rx.recv().await.unwrap().kind(), "domain.approved");
}

#[tokio::test]
async fn approving_twice_fails_and_leaves_the_domain_alone() {
    let wh = workflow_harness();
    let id = wh.workflow.create(request_for("city.gov")).await.unwrap();
    wh.workflow.submit(id, "jo@city.gov").await.unwrap();
    wh.workflow.begin_review(id, "staff@gov").await.unwrap();
    wh.workflow.approve(id, "staff@gov").await.unwrap();
    let before = wh.h.store.get("city.gov").await.unwrap();

    let err = wh.workflow.approve(id, "staff@gov").await.unwrap_err();
    assert!(err.to_string().contains("already approved"));

    let after = wh.h.store.get("city.gov").await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn approval_requires_review_first() {
    let wh = workflow_harness();
    let id = wh.workflow.create(request_for("city.gov")).await.unwrap();

    let err = wh.workflow.approve(id, "staff@gov").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    wh.workflow.submit(id, "jo@city.gov").await.unwrap();
    let err = wh.workflow.approve(id, "staff@gov").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
    assert!(wh.h.store.get("city.gov").await.is_err());
}

#[tokio::test]
async fn approval_rejects_incomplete_contact_sets() {
    let wh = workflow_harness();
    let mut request = request_for("city.gov");
    request.contacts.pop();
    let id = wh.workflow.create(request).await.unwrap();
    wh.workflow.submit(id, "jo@city.gov").await.unwrap();
    wh.workflow.begin_review(id, "staff@gov").await.unwrap();

    let err = wh.workflow.approve(id, "staff@gov").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
    // Still reviewable after the failed approval.
    assert_eq!(
        wh.requests.get(id).await.unwrap().state,
        RequestState::InReview
    );
}

#[tokio::test]
async fn approval_fails_when_the_domain_name_is_taken() {
    let wh = workflow_harness();
    wh.h.store.insert(unknown_domain("city.gov")).await.unwrap();
    let id = wh.workflow.create(request_for("city.gov")).await.unwrap();
    wh.workflow.submit(id, "jo@city.gov").await.unwrap();
    wh.workflow.begin_review(id, "staff@gov").await.unwrap();

    let err = wh.workflow.approve(id, "staff@gov").await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
    // The request survives un-approved.
    assert_eq!(
        wh.requests.get(id).await.unwrap().state,
        RequestState::InReview
    );
}

#[tokio::test]
async fn rejection_records_a_reason_and_never_creates_a_domain() {
    let wh = workflow_harness();
    let id = wh.workflow.create(request_for("city.gov")).await.unwrap();
    wh.workflow.submit(id, "jo@city.gov").await.unwrap();
    wh.workflow.begin_review(id, "staff@gov").await.unwrap();

    wh.workflow
        .reject(id, RejectionReason::Eligibility, "staff@gov")
        .await
        .unwrap();

    let request = wh.requests.get(id).await.unwrap();
    assert_eq!(request.state, RequestState::Rejected);
    assert_eq!(request.rejection_reason, Some(RejectionReason::Eligibility));
    assert!(wh.h.store.get("city.gov").await.is_err());

    // Rejected is terminal.
    let err = wh.workflow.resubmit(id, "jo@city.gov").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
}

#[tokio::test]
async fn withdrawn_requests_can_be_resubmitted() {
    let wh = workflow_harness();
    let id = wh.workflow.create(request_for("city.gov")).await.unwrap();
    wh.workflow.submit(id, "jo@city.gov").await.unwrap();
    wh.workflow.withdraw(id, "jo@city.gov").await.unwrap();
    assert!(wh.h.store.get("city.gov").await.is_err());

    wh.workflow.resubmit(id, "jo@city.gov").await.unwrap();
    assert_eq!(
        wh.requests.get(id).await.unwrap().state,
        RequestState::Submitted
    );
}

#[tokio::test]
async fn action_needed_round_trips_through_resubmission() {
    let wh = workflow_harness();
    let id = wh.workflow.create(request_for("city.gov")).await.unwrap();
    wh.workflow.submit(id, "jo@city.gov").await.unwrap();
    wh.workflow.begin_review(id, "staff@gov").await.unwrap();
    wh.workflow.request_action(id, "staff@gov").await.unwrap();
    wh.workflow.resubmit(id, "jo@city.gov").await.unwrap();
    wh.workflow.begin_review(id, "staff@gov").await.unwrap();

    wh.workflow.approve(id, "staff@gov").await.unwrap();

    let request = wh.requests.get(id).await.unwrap();
    assert_eq!(request.state, RequestState::Approved);
    // The audit trail records the whole journey.
    assert_eq!(request.history.len(), 6);
}

#[tokio::test]
async fn ineligible_is_terminal() {
    let wh = workflow_harness();
    let id = wh.workflow.create(request_for("city.gov")).await.unwrap();
    wh.workflow.submit(id, "jo@city.gov").await.unwrap();
    wh.workflow.begin_review(id, "staff@gov").await.unwrap();
    wh.workflow.mark_ineligible(id, "staff@gov").await.unwrap();

    assert!(wh.workflow.resubmit(id, "jo@city.gov").await.is_err());
    assert!(wh.workflow.approve(id, "staff@gov").await.is_err());
}
