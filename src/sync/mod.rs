//! Contact/Host Synchronizer: translates local contacts and host/glue
//! records into the ordered remote call sequence required by the
//! protocol's object-dependency rules.

pub mod contacts;
pub mod hosts;

pub use contacts::{contact_payload, provision_contacts, registry_contact_id, SyncError};
pub use hosts::{diff_hosts, validate_host_set, HostDelta, MAX_NAMESERVERS, MIN_NAMESERVERS};
