//! Host set validation and diffing. The registry is only ever sent
//! add/remove deltas against the last known remote set, never the whole
//! desired set, to avoid spurious "already linked" rejections.

use crate::domain::model::{is_valid_host_name, DomainName, Host, HostSpec};
use crate::errors::LifecycleError;

/// Registry delegation limits.
pub const MIN_NAMESERVERS: usize = 2;
pub const MAX_NAMESERVERS: usize = 13;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostDelta {
    pub add: Vec<HostSpec>,
    pub remove: Vec<String>,
}

impl HostDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Validate a desired nameserver set before anything touches the registry.
/// An empty set is legal and clears delegation.
pub fn validate_host_set(domain: &DomainName, hosts: &[HostSpec]) -> Result<(), LifecycleError> {
    if hosts.is_empty() {
        return Ok(());
    }
    if hosts.len() < MIN_NAMESERVERS || hosts.len() > MAX_NAMESERVERS {
        return Err(LifecycleError::Validation(format!(
            "a delegated domain needs between {MIN_NAMESERVERS} and {MAX_NAMESERVERS} nameservers, got {}",
            hosts.len()
        )));
    }
    for host in hosts {
        if !is_valid_host_name(&host.name) {
            return Err(LifecycleError::Validation(format!(
                "{} is not a valid nameserver name",
                host.name
            )));
        }
        let subordinate = crate::domain::model::host_is_subordinate(&host.name, domain);
        if subordinate && host.addresses.is_empty() {
            return Err(LifecycleError::Validation(format!(
                "{} is inside the {} zone and needs at least one glue address",
                host.name, domain
            )));
        }
    }
    let mut names: Vec<&str> = hosts.iter().map(|h| h.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    if names.len() != hosts.len() {
        return Err(LifecycleError::Validation(
            "nameserver set contains duplicates".to_string(),
        ));
    }
    Ok(())
}

/// Diff the desired set against the last known remote set.
pub fn diff_hosts(desired: &[HostSpec], current: &[Host]) -> HostDelta {
    let current_active: Vec<&Host> = current.iter().filter(|h| h.active).collect();

    let add = desired
        .iter()
        .filter(|spec| !current_active.iter().any(|h| h.name == spec.name))
        .cloned()
        .collect();

    let remove = current_active
        .iter()
        .filter(|h| !desired.iter().any(|spec| spec.name == h.name))
        .map(|h| h.name.clone())
        .collect();

    HostDelta { add, remove }
}
