use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of a registered domain. Closed set; transition legality
/// lives in the state machine's lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainState {
    /// Linked to an approved request but not yet provisioned remotely.
    Unknown,
    /// Provisioned at the registry with no delegation.
    DnsNeeded,
    /// Provisioned and delegated.
    Ready,
    /// Administratively suspended; resolution stopped, data retained.
    OnHold,
    /// Terminal. The local record survives for audit.
    Deleted,
}

impl DomainState {
    /// States in which the domain has a live remote object that resolves.
    pub fn is_active(&self) -> bool {
        matches!(self, DomainState::Ready | DomainState::DnsNeeded)
    }
}

impl std::fmt::Display for DomainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DomainState::Unknown => "unknown",
            DomainState::DnsNeeded => "dns needed",
            DomainState::Ready => "ready",
            DomainState::OnHold => "on hold",
            DomainState::Deleted => "deleted",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainNameError {
    #[error("domain name is empty")]
    Empty,
    #[error("domain name {0} is longer than 253 characters")]
    TooLong(String),
    #[error("domain name {0} needs at least two labels")]
    MissingLabels(String),
    #[error("domain name contains invalid label {0:?}")]
    BadLabel(String),
}

/// A validated, lowercased fully-qualified domain name. Identity of a
/// Domain; immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainName(String);

impl DomainName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DomainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DomainName {
    type Err = DomainNameError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim().trim_end_matches('.').to_ascii_lowercase();
        if name.is_empty() {
            return Err(DomainNameError::Empty);
        }
        if name.len() > 253 {
            return Err(DomainNameError::TooLong(name));
        }
        let labels: Vec<&str> = name.split('.').collect();
        if labels.len() < 2 {
            return Err(DomainNameError::MissingLabels(name));
        }
        for label in &labels {
            if !is_valid_label(label) {
                return Err(DomainNameError::BadLabel((*label).to_string()));
            }
        }
        Ok(DomainName(name))
    }
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Whether `host` is a syntactically valid nameserver name.
pub fn is_valid_host_name(host: &str) -> bool {
    host.parse::<DomainName>().is_ok()
}

/// Contact roles every post-creation domain must fill exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactRole {
    Registrant,
    Administrative,
    Technical,
    Security,
}

impl ContactRole {
    pub const REQUIRED: [ContactRole; 4] = [
        ContactRole::Registrant,
        ContactRole::Administrative,
        ContactRole::Technical,
        ContactRole::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactRole::Registrant => "registrant",
            ContactRole::Administrative => "administrative",
            ContactRole::Technical => "technical",
            ContactRole::Security => "security",
        }
    }
}

/// A role-tagged contact owned by exactly one Domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicContact {
    pub id: Uuid,
    pub role: ContactRole,
    pub name: String,
    pub organization: Option<String>,
    pub email: String,
    pub voice: Option<String>,
    /// Remote registry contact identifier once synchronized.
    pub registry_id: Option<String>,
    pub active: bool,
}

impl PublicContact {
    pub fn new(
        role: ContactRole,
        name: &str,
        organization: Option<&str>,
        email: &str,
        voice: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            name: name.to_string(),
            organization: organization.map(str::to_string),
            email: email.to_string(),
            voice: voice.map(str::to_string),
            registry_id: None,
            active: true,
        }
    }
}

/// A nameserver attached to a domain, with glue addresses where required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub addresses: Vec<IpAddr>,
    pub active: bool,
}

impl Host {
    /// Glue is required when the host lives inside the domain's own zone.
    pub fn is_subordinate_to(&self, domain: &DomainName) -> bool {
        host_is_subordinate(&self.name, domain)
    }
}

pub fn host_is_subordinate(host: &str, domain: &DomainName) -> bool {
    host == domain.as_str() || host.ends_with(&format!(".{}", domain.as_str()))
}

/// Requested nameserver set entry, before it becomes a stored Host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

/// Delegation-signer record for DNSSEC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsRecord {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: String,
}

/// A registry operation that failed transiently and waits in the
/// reconciliation retry set, with the arguments needed to re-drive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingOperation {
    Provision,
    SetNameservers(Vec<HostSpec>),
    SetDsData(Vec<DsRecord>),
    UpdateContact(PublicContact),
    PlaceHold,
    RemoveHold,
    Renew { years: u8 },
    Delete,
}

impl PendingOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            PendingOperation::Provision => "provision",
            PendingOperation::SetNameservers(_) => "set-nameservers",
            PendingOperation::SetDsData(_) => "set-ds-data",
            PendingOperation::UpdateContact(_) => "update-contact",
            PendingOperation::PlaceHold => "place-hold",
            PendingOperation::RemoveHold => "remove-hold",
            PendingOperation::Renew { .. } => "renew",
            PendingOperation::Delete => "delete",
        }
    }
}

/// Registry-synchronization bookkeeping, separate from lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub pending: Option<PendingOperation>,
    /// Retries exhausted; waiting for an operator.
    pub parked: bool,
    /// When the divergence cross-check last looked at this domain.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Guards against repeated domain.expiring emissions.
    pub expiry_notice_sent: bool,
}

/// Audit entry for one applied state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: DomainState,
    pub to: DomainState,
    pub operation: String,
    pub at: DateTime<Utc>,
}

/// The local system-of-record entry for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: DomainName,
    pub state: DomainState,
    pub created_at: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// Remote registry identifier once provisioned.
    pub registry_id: Option<String>,
    pub first_ready: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// The request whose approval created this domain. Permanent.
    pub request_id: Uuid,
    /// Domain manager identities; the requester is linked at approval.
    pub managers: Vec<String>,
    pub contacts: Vec<PublicContact>,
    /// Last known remote nameserver set.
    pub nameservers: Vec<Host>,
    pub ds_data: Vec<DsRecord>,
    pub sync: SyncState,
    pub history: Vec<TransitionRecord>,
}

impl Domain {
    /// A freshly approved domain: local only, awaiting provisioning.
    pub fn new_unknown(
        name: DomainName,
        request_id: Uuid,
        contacts: Vec<PublicContact>,
        first_manager: &str,
    ) -> Self {
        Self {
            name,
            state: DomainState::Unknown,
            created_at: Utc::now(),
            expiration_date: None,
            registry_id: None,
            first_ready: None,
            deleted_at: None,
            request_id,
            managers: vec![first_manager.to_string()],
            contacts,
            nameservers: Vec::new(),
            ds_data: Vec::new(),
            sync: SyncState::default(),
            history: Vec::new(),
        }
    }

    pub fn contact(&self, role: ContactRole) -> Option<&PublicContact> {
        self.contacts
            .iter()
            .find(|c| c.role == role && c.active)
    }

    /// Exactly one active contact per required role.
    pub fn has_required_contacts(&self) -> bool {
        ContactRole::REQUIRED.iter().all(|role| {
            self.contacts
                .iter()
                .filter(|c| c.role == *role && c.active)
                .count()
                == 1
        })
    }

    pub fn active_nameservers(&self) -> Vec<&Host> {
        self.nameservers.iter().filter(|h| h.active).collect()
    }

    /// Append an audit record and apply the new state. Legality is the
    /// state machine's job; this only records.
    pub fn record_transition(&mut self, to: DomainState, operation: &str) {
        let record = TransitionRecord {
            from: self.state,
            to,
            operation: operation.to_string(),
            at: Utc::now(),
        };
        tracing::info!(
            domain = %self.name,
            from = %record.from,
            to = %record.to,
            operation = %record.operation,
            "domain state transition"
        );
        self.history.push(record);
        self.state = to;
    }
}
