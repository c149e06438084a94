use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::domain::model::{ContactRole, DsRecord};

/// Result codes follow the provisioning-protocol convention: 1xxx completed,
/// 2xxx failed. The client maps failures onto `RegistryError` in one place.
pub const CODE_COMPLETED: u16 = 1000;
pub const CODE_COMPLETED_PENDING: u16 = 1001;
pub const CODE_COMPLETED_ENDING_SESSION: u16 = 1500;

/// One framed request: a client transaction id plus the command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub transaction_id: String,
    pub command: Command,
}

/// Typed command set for the provisioning protocol. Session commands first,
/// then domain, host, and contact object commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    Login {
        client_id: String,
        password: String,
    },
    Logout,
    /// Session keepalive; the registry answers with a greeting.
    Keepalive,

    DomainCheck {
        name: String,
    },
    DomainCreate {
        name: String,
        period_years: u8,
        registrant_id: String,
        contacts: Vec<ContactAssignment>,
        nameservers: Vec<String>,
        auth_info: String,
    },
    DomainInfo {
        name: String,
    },
    DomainUpdate {
        name: String,
        add_nameservers: Vec<String>,
        remove_nameservers: Vec<String>,
        add_statuses: Vec<ObjectStatus>,
        remove_statuses: Vec<ObjectStatus>,
        /// `Some` replaces the full DS set; `None` leaves DS data untouched.
        ds_data: Option<Vec<DsRecord>>,
    },
    DomainRenew {
        name: String,
        current_expiration: DateTime<Utc>,
        period_years: u8,
    },
    DomainDelete {
        name: String,
    },
    DomainTransfer {
        name: String,
        op: TransferOp,
    },

    HostCreate {
        name: String,
        addresses: Vec<IpAddr>,
    },
    HostUpdate {
        name: String,
        add_addresses: Vec<IpAddr>,
        remove_addresses: Vec<IpAddr>,
    },
    HostDelete {
        name: String,
    },

    ContactCreate(ContactData),
    ContactUpdate(ContactData),
    ContactDelete {
        id: String,
    },
}

impl Command {
    /// Short name for logging and span attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::Logout => "logout",
            Command::Keepalive => "keepalive",
            Command::DomainCheck { .. } => "domain-check",
            Command::DomainCreate { .. } => "domain-create",
            Command::DomainInfo { .. } => "domain-info",
            Command::DomainUpdate { .. } => "domain-update",
            Command::DomainRenew { .. } => "domain-renew",
            Command::DomainDelete { .. } => "domain-delete",
            Command::DomainTransfer { .. } => "domain-transfer",
            Command::HostCreate { .. } => "host-create",
            Command::HostUpdate { .. } => "host-update",
            Command::HostDelete { .. } => "host-delete",
            Command::ContactCreate(_) => "contact-create",
            Command::ContactUpdate(_) => "contact-update",
            Command::ContactDelete { .. } => "contact-delete",
        }
    }

    /// The object an error about this command refers to.
    pub fn object_id(&self) -> &str {
        match self {
            Command::Login { client_id, .. } => client_id,
            Command::Logout | Command::Keepalive => "",
            Command::DomainCheck { name }
            | Command::DomainCreate { name, .. }
            | Command::DomainInfo { name }
            | Command::DomainUpdate { name, .. }
            | Command::DomainRenew { name, .. }
            | Command::DomainDelete { name }
            | Command::DomainTransfer { name, .. }
            | Command::HostCreate { name, .. }
            | Command::HostUpdate { name, .. }
            | Command::HostDelete { name } => name,
            Command::ContactCreate(contact) | Command::ContactUpdate(contact) => &contact.id,
            Command::ContactDelete { id } => id,
        }
    }

    /// Commands that change remote state. A timed-out mutating command means
    /// the session can no longer be trusted without a fresh info.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Command::Keepalive
                | Command::DomainCheck { .. }
                | Command::DomainInfo { .. }
                | Command::Login { .. }
                | Command::Logout
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TransferOp {
    Request,
    Approve,
    Reject,
    Cancel,
    Query,
}

/// Role-tagged contact attachment used in domain create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactAssignment {
    pub role: ContactRole,
    pub id: String,
}

/// Contact payload for create/update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactData {
    pub id: String,
    pub name: String,
    pub organization: Option<String>,
    pub email: String,
    pub voice: Option<String>,
}

/// Registry-side object statuses the core acts on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ObjectStatus {
    Ok,
    ClientHold,
    ServerHold,
    PendingCreate,
    PendingDelete,
    Inactive,
}

/// One framed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub code: u16,
    pub message: String,
    /// Echo of the client transaction id this response answers.
    pub transaction_id: String,
    pub data: Option<ResponseData>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (1000..2000).contains(&self.code)
    }
}

/// Domain-specific payloads carried on successful responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ResponseData {
    Greeting {
        server_id: String,
    },
    Check {
        name: String,
        available: bool,
        reason: Option<String>,
    },
    DomainCreated {
        name: String,
        registry_id: String,
        expiration_date: DateTime<Utc>,
    },
    Domain(DomainRecord),
    Renewed {
        name: String,
        expiration_date: DateTime<Utc>,
    },
    Host(HostRecord),
    Contact(ContactRecord),
    Transfer {
        name: String,
        status: String,
    },
}

/// The registry's authoritative record for a domain, as returned by info.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainRecord {
    pub name: String,
    pub registry_id: String,
    /// Client id of the registrar sponsoring this object.
    pub sponsor_client_id: String,
    pub statuses: Vec<ObjectStatus>,
    pub nameservers: Vec<String>,
    pub created_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

impl DomainRecord {
    pub fn is_on_hold(&self) -> bool {
        self.statuses
            .iter()
            .any(|s| matches!(s, ObjectStatus::ClientHold | ObjectStatus::ServerHold))
    }

    pub fn is_pending_delete(&self) -> bool {
        self.statuses
            .iter()
            .any(|s| matches!(s, ObjectStatus::PendingDelete))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostRecord {
    pub name: String,
    pub addresses: Vec<IpAddr>,
    pub sponsor_client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactRecord {
    pub id: String,
    pub sponsor_client_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_round_trip_through_the_wire_encoding() {
        let command = Command::DomainUpdate {
            name: "city.gov".to_string(),
            add_nameservers: vec!["ns1.city.gov".to_string()],
            remove_nameservers: vec![],
            add_statuses: vec![ObjectStatus::ClientHold],
            remove_statuses: vec![],
            ds_data: None,
        };
        let encoded = serde_json::to_vec(&command).unwrap();
        let decoded: Command = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, command);
        assert_eq!(decoded.kind(), "domain-update");
        assert_eq!(decoded.object_id(), "city.gov");
    }

    #[test]
    fn hold_statuses_are_detected() {
        let record = DomainRecord {
            name: "city.gov".to_string(),
            registry_id: "D123".to_string(),
            sponsor_client_id: "govreg".to_string(),
            statuses: vec![ObjectStatus::ClientHold],
            nameservers: vec![],
            created_date: Utc::now(),
            expiration_date: Utc::now(),
        };
        assert!(record.is_on_hold());
        assert!(!record.is_pending_delete());
    }

    #[test]
    fn mutating_commands_are_classified() {
        assert!(Command::DomainDelete {
            name: "city.gov".to_string()
        }
        .is_mutating());
        assert!(!Command::DomainInfo {
            name: "city.gov".to_string()
        }
        .is_mutating());
        assert!(!Command::Keepalive.is_mutating());
    }
}
