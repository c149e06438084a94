use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::model::{ContactRole, DomainName};

/// Review state of a domain request. Closed set; legality lives in the
/// workflow's lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Started,
    Submitted,
    InReview,
    ActionNeeded,
    Approved,
    Rejected,
    Withdrawn,
    Ineligible,
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RequestState::Started => "started",
            RequestState::Submitted => "submitted",
            RequestState::InReview => "in review",
            RequestState::ActionNeeded => "action needed",
            RequestState::Approved => "approved",
            RequestState::Rejected => "rejected",
            RequestState::Withdrawn => "withdrawn",
            RequestState::Ineligible => "ineligible",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Eligibility,
    DomainPurpose,
    NamingRequirements,
    Other,
}

/// Contact declared on a request; becomes a PublicContact at approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedContact {
    pub role: ContactRole,
    pub name: String,
    pub organization: Option<String>,
    pub email: String,
    pub voice: Option<String>,
}

/// Audit entry for one request transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTransition {
    pub from: RequestState,
    pub to: RequestState,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// A domain request moving through human review. Arrives here already
/// input-validated by the web layer; only business rules are checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRequest {
    pub id: Uuid,
    pub requested_domain: DomainName,
    pub organization: String,
    pub requestor_email: String,
    pub contacts: Vec<RequestedContact>,
    pub state: RequestState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Permanent once approval occurs; exactly one Domain per Request.
    pub approved_domain: Option<DomainName>,
    pub rejection_reason: Option<RejectionReason>,
    pub history: Vec<RequestTransition>,
}

impl DomainRequest {
    pub fn new(
        requested_domain: DomainName,
        organization: &str,
        requestor_email: &str,
        contacts: Vec<RequestedContact>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requested_domain,
            organization: organization.to_string(),
            requestor_email: requestor_email.to_string(),
            contacts,
            state: RequestState::Started,
            created_at: now,
            updated_at: now,
            approved_domain: None,
            rejection_reason: None,
            history: Vec::new(),
        }
    }

    /// Exactly one declared contact per required role.
    pub fn has_required_contacts(&self) -> bool {
        ContactRole::REQUIRED.iter().all(|role| {
            self.contacts.iter().filter(|c| c.role == *role).count() == 1
        })
    }

    pub fn record_transition(&mut self, to: RequestState, actor: &str) {
        let record = RequestTransition {
            from: self.state,
            to,
            actor: actor.to_string(),
            at: Utc::now(),
        };
        tracing::info!(
            request = %self.id,
            domain = %self.requested_domain,
            from = %record.from,
            to = %record.to,
            actor = %record.actor,
            "request state transition"
        );
        self.history.push(record);
        self.state = to;
        self.updated_at = Utc::now();
    }
}
