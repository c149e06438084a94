//! Contact synchronization: local role-tagged contacts become remote
//! contact objects before any domain references them. A failure part-way
//! through aborts the whole provisioning attempt and unwinds what this run
//! created, so the registry never holds a half-provisioned contact set.

use crate::domain::model::{ContactRole, Domain, PublicContact};
use crate::registry::client::RegistryOps;
use crate::registry::errors::RegistryError;
use crate::registry::types::{ContactAssignment, ContactData};

/// Registry contact handles are short opaque strings. Derive a stable one
/// from the contact's local identity.
pub fn registry_contact_id(contact: &PublicContact) -> String {
    let prefix = match contact.role {
        ContactRole::Registrant => "REG",
        ContactRole::Administrative => "ADM",
        ContactRole::Technical => "TEC",
        ContactRole::Security => "SEC",
    };
    let id = contact.id.simple().to_string();
    format!("{prefix}-{}", &id[..12])
}

/// The wire payload for a contact under a given registry handle.
pub fn contact_payload(contact: &PublicContact, registry_id: &str) -> ContactData {
    ContactData {
        id: registry_id.to_string(),
        name: contact.name.clone(),
        organization: contact.organization.clone(),
        email: contact.email.clone(),
        voice: contact.voice.clone(),
    }
}

/// Failures surfaced by contact synchronization.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("domain has no active {} contact", .0.as_str())]
    MissingContact(ContactRole),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Create every required contact at the registry, in dependency order
/// (registrant first — domain create references it directly). On success
/// the domain's contacts carry their registry ids and the returned
/// assignments are ready for the create call. On any failure the contacts
/// created by this run are best-effort deleted and the single underlying
/// error is returned.
pub async fn provision_contacts(
    registry: &dyn RegistryOps,
    domain: &mut Domain,
) -> Result<Vec<ContactAssignment>, SyncError> {
    let mut created_this_run: Vec<String> = Vec::new();
    let mut assignments = Vec::new();
    let mut failure: Option<SyncError> = None;

    'roles: for role in ContactRole::REQUIRED {
        let contact = match domain
            .contacts
            .iter_mut()
            .find(|c| c.role == role && c.active)
        {
            Some(contact) => contact,
            None => {
                failure = Some(SyncError::MissingContact(role));
                break 'roles;
            }
        };

        let registry_id = contact
            .registry_id
            .clone()
            .unwrap_or_else(|| registry_contact_id(contact));

        if contact.registry_id.is_none() {
            match registry
                .create_contact(contact_payload(contact, &registry_id))
                .await
            {
                Ok(()) => {
                    created_this_run.push(registry_id.clone());
                    contact.registry_id = Some(registry_id.clone());
                }
                // Already at the registry from an earlier attempt: adopt it.
                Err(RegistryError::ObjectExists { .. }) => {
                    contact.registry_id = Some(registry_id.clone());
                }
                Err(err) => {
                    failure = Some(SyncError::Registry(err));
                    break 'roles;
                }
            }
        }

        assignments.push(ContactAssignment {
            role,
            id: registry_id,
        });
    }

    if let Some(err) = failure {
        unwind(registry, &created_this_run).await;
        // The unwound contacts no longer exist remotely; forget their ids.
        for contact in &mut domain.contacts {
            if let Some(id) = &contact.registry_id {
                if created_this_run.contains(id) {
                    contact.registry_id = None;
                }
            }
        }
        return Err(err);
    }

    Ok(assignments)
}

async fn unwind(registry: &dyn RegistryOps, created: &[String]) {
    for id in created {
        if let Err(err) = registry.delete_contact(id).await {
            tracing::warn!(
                contact = %id,
                error = %err,
                "failed to unwind contact after aborted provisioning"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{DomainName, PublicContact};
    use std::str::FromStr;
    use uuid::Uuid;

    fn domain_with_contacts() -> Domain {
        let contacts = ContactRole::REQUIRED
            .iter()
            .map(|role| PublicContact::new(*role, "Jo Staff", Some("City"), "jo@city.gov", None))
            .collect();
        Domain::new_unknown(
            DomainName::from_str("city.gov").unwrap(),
            Uuid::new_v4(),
            contacts,
            "jo@city.gov",
        )
    }

    #[test]
    fn registry_handles_are_short_and_role_tagged() {
        let contact = PublicContact::new(ContactRole::Security, "Jo", None, "jo@city.gov", None);
        let handle = registry_contact_id(&contact);
        assert!(handle.starts_with("SEC-"));
        assert!(handle.len() <= 16);
    }

    #[test]
    fn registrant_is_synchronized_first() {
        // Ordering is load-bearing: the create command references the
        // registrant id, so it must exist before the domain does.
        let domain = domain_with_contacts();
        let roles: Vec<ContactRole> = ContactRole::REQUIRED.to_vec();
        assert_eq!(roles[0], ContactRole::Registrant);
        assert!(domain.has_required_contacts());
    }
}
