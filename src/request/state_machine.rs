//! The approval workflow: a small human-review state machine whose terminal
//! approval provisions the Domain's local record atomically. The remote
//! provision call is deliberately decoupled — a registry outage never blocks
//! an approval decision.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::model::{Domain, DomainState, PendingOperation, PublicContact};
use crate::domain::store::DomainStore;
use crate::errors::{LifecycleError, StoreError};
use crate::events::{EventEmitter, LifecycleEvent};
use crate::request::model::{DomainRequest, RejectionReason, RequestState};
use crate::request::store::RequestStore;

/// Every legal request state pair. `Approved`, `Rejected`, and `Ineligible`
/// are terminal; a withdrawn request can be resubmitted by its requester.
pub const LEGAL_REQUEST_TRANSITIONS: &[(RequestState, RequestState)] = &[
    (RequestState::Started, RequestState::Submitted),
    (RequestState::Submitted, RequestState::InReview),
    (RequestState::Submitted, RequestState::Withdrawn),
    (RequestState::InReview, RequestState::Approved),
    (RequestState::InReview, RequestState::Rejected),
    (RequestState::InReview, RequestState::ActionNeeded),
    (RequestState::InReview, RequestState::Ineligible),
    (RequestState::InReview, RequestState::Withdrawn),
    (RequestState::ActionNeeded, RequestState::Submitted),
    (RequestState::Withdrawn, RequestState::Submitted),
];

pub fn request_transition_allowed(from: RequestState, to: RequestState) -> bool {
    LEGAL_REQUEST_TRANSITIONS.contains(&(from, to))
}

pub struct RequestWorkflow {
    requests: Arc<dyn RequestStore>,
    domains: Arc<dyn DomainStore>,
    events: EventEmitter,
}

impl RequestWorkflow {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        domains: Arc<dyn DomainStore>,
        events: EventEmitter,
    ) -> Self {
        Self {
            requests,
            domains,
            events,
        }
    }

    pub fn requests(&self) -> &Arc<dyn RequestStore> {
        &self.requests
    }

    /// Register a finalized request arriving from the web layer.
    pub async fn create(&self, request: DomainRequest) -> Result<Uuid, LifecycleError> {
        let id = request.id;
        self.requests.insert(request).await?;
        Ok(id)
    }

    async fn transition(
        &self,
        id: Uuid,
        to: RequestState,
        actor: &str,
    ) -> Result<DomainRequest, LifecycleError> {
        let mut request = self.requests.get(id).await?;
        if !request_transition_allowed(request.state, to) {
            return Err(LifecycleError::Validation(format!(
                "request cannot move from {} to {}",
                request.state, to
            )));
        }
        request.record_transition(to, actor);
        self.requests.update(request.clone()).await?;
        Ok(request)
    }

    pub async fn submit(&self, id: Uuid, actor: &str) -> Result<(), LifecycleError> {
        self.transition(id, RequestState::Submitted, actor).await?;
        Ok(())
    }

    pub async fn begin_review(&self, id: Uuid, actor: &str) -> Result<(), LifecycleError> {
        self.transition(id, RequestState::InReview, actor).await?;
        Ok(())
    }

    pub async fn request_action(&self, id: Uuid, actor: &str) -> Result<(), LifecycleError> {
        self.transition(id, RequestState::ActionNeeded, actor)
            .await?;
        Ok(())
    }

    /// Requester resubmits after fixing what review flagged, or revives a
    /// withdrawn request.
    pub async fn resubmit(&self, id: Uuid, actor: &str) -> Result<(), LifecycleError> {
        self.transition(id, RequestState::Submitted, actor).await?;
        Ok(())
    }

    pub async fn withdraw(&self, id: Uuid, actor: &str) -> Result<(), LifecycleError> {
        self.transition(id, RequestState::Withdrawn, actor).await?;
        Ok(())
    }

    pub async fn reject(
        &self,
        id: Uuid,
        reason: RejectionReason,
        actor: &str,
    ) -> Result<(), LifecycleError> {
        let mut request = self.transition(id, RequestState::Rejected, actor).await?;
        request.rejection_reason = Some(reason);
        self.requests.update(request).await?;
        Ok(())
    }

    pub async fn mark_ineligible(&self, id: Uuid, actor: &str) -> Result<(), LifecycleError> {
        self.transition(id, RequestState::Ineligible, actor).await?;
        Ok(())
    }

    /// Approve a reviewed request. One atomic local operation: the Domain
    /// is created in `Unknown` with the request's declared contacts, the
    /// requester becomes its first manager, and the request is permanently
    /// linked. Provisioning is handed to the reconciliation scheduler.
    pub async fn approve(&self, id: Uuid, actor: &str) -> Result<Domain, LifecycleError> {
        let mut request = self.requests.get(id).await?;

        if request.state == RequestState::Approved {
            return Err(LifecycleError::Validation(
                "request is already approved".to_string(),
            ));
        }
        if !request_transition_allowed(request.state, RequestState::Approved) {
            return Err(LifecycleError::Validation(format!(
                "request cannot move from {} to approved",
                request.state
            )));
        }
        if !request.has_required_contacts() {
            return Err(LifecycleError::Validation(
                "request must declare exactly one contact per required role".to_string(),
            ));
        }

        let contacts: Vec<PublicContact> = request
            .contacts
            .iter()
            .map(|c| {
                PublicContact::new(
                    c.role,
                    &c.name,
                    c.organization.as_deref(),
                    &c.email,
                    c.voice.as_deref(),
                )
            })
            .collect();

        let mut domain = Domain::new_unknown(
            request.requested_domain.clone(),
            request.id,
            contacts,
            &request.requestor_email,
        );
        debug_assert_eq!(domain.state, DomainState::Unknown);
        // Into the scheduler's retry set immediately; the remote create
        // happens on the next pass even if the registry is down right now.
        domain.sync.pending = Some(PendingOperation::Provision);
        domain.sync.next_retry_at = Some(Utc::now());

        match self.domains.insert(domain.clone()).await {
            Ok(()) => {}
            Err(StoreError::DomainExists(name)) => {
                return Err(LifecycleError::Validation(format!(
                    "a domain named {name} already exists"
                )));
            }
            Err(err) => return Err(err.into()),
        }

        request.record_transition(RequestState::Approved, actor);
        request.approved_domain = Some(domain.name.clone());
        self.requests.update(request.clone()).await?;

        self.events.emit(LifecycleEvent::Approved {
            domain: domain.name.clone(),
            request_id: request.id,
            at: Utc::now(),
        });
        Ok(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_exits() {
        for (from, _) in LEGAL_REQUEST_TRANSITIONS {
            assert!(
                !matches!(
                    from,
                    RequestState::Approved | RequestState::Rejected | RequestState::Ineligible
                ),
                "terminal state {from} must not appear as a source"
            );
        }
    }

    #[test]
    fn withdrawal_is_available_to_the_requester() {
        assert!(request_transition_allowed(
            RequestState::Submitted,
            RequestState::Withdrawn
        ));
        assert!(request_transition_allowed(
            RequestState::InReview,
            RequestState::Withdrawn
        ));
        assert!(!request_transition_allowed(
            RequestState::Started,
            RequestState::Withdrawn
        ));
    }

    #[test]
    fn approval_requires_review() {
        assert!(request_transition_allowed(
            RequestState::InReview,
            RequestState::Approved
        ));
        for from in [
            RequestState::Started,
            RequestState::Submitted,
            RequestState::ActionNeeded,
            RequestState::Withdrawn,
        ] {
            assert!(!request_transition_allowed(from, RequestState::Approved));
        }
    }
}
