//! The domain state machine: owns lifecycle state, validates transitions
//! against a closed legality table, and drives the registry client through
//! the synchronizer. Every operation either fully succeeds (local and
//! remote updated) or fully fails (lifecycle state unchanged, typed error
//! returned); partial application is the one outcome designed out.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::domain::locks::DomainLocks;
use crate::domain::model::{
    Domain, DomainState, DsRecord, Host, HostSpec, PendingOperation, PublicContact,
};
use crate::domain::store::DomainStore;
use crate::errors::LifecycleError;
use crate::events::{EventEmitter, LifecycleEvent};
use crate::registry::client::{DomainUpdateSpec, RegistryOps};
use crate::registry::errors::RegistryError;
use crate::registry::retry::{attempts_exhausted, backoff_delay};
use crate::registry::types::{DomainRecord, ObjectStatus};
use crate::sync;

/// Every legal state pair. Anything not listed (and not the identity) is
/// rejected; `Deleted` appears only as a target because it is terminal.
pub const LEGAL_TRANSITIONS: &[(DomainState, DomainState)] = &[
    (DomainState::Unknown, DomainState::DnsNeeded),
    // Adopting an existing remote object can land anywhere live.
    (DomainState::Unknown, DomainState::Ready),
    (DomainState::Unknown, DomainState::OnHold),
    (DomainState::DnsNeeded, DomainState::Ready),
    (DomainState::Ready, DomainState::DnsNeeded),
    (DomainState::DnsNeeded, DomainState::OnHold),
    (DomainState::Ready, DomainState::OnHold),
    (DomainState::OnHold, DomainState::DnsNeeded),
    (DomainState::OnHold, DomainState::Ready),
    (DomainState::Unknown, DomainState::Deleted),
    (DomainState::DnsNeeded, DomainState::Deleted),
    (DomainState::Ready, DomainState::Deleted),
    (DomainState::OnHold, DomainState::Deleted),
];

pub fn transition_allowed(from: DomainState, to: DomainState) -> bool {
    from == to || LEGAL_TRANSITIONS.contains(&(from, to))
}

/// Outcome of a divergence cross-check against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Local and remote agree.
    Unchanged,
    /// Remote truth was adopted locally (nameservers, expiration, hold).
    Updated,
    /// The remote object is gone; the domain was transitioned to deleted.
    RemoteMissing,
    /// Not provisioned yet; nothing to compare.
    NotProvisioned,
}

pub struct DomainStateMachine {
    registry: Arc<dyn RegistryOps>,
    store: Arc<dyn DomainStore>,
    events: EventEmitter,
    locks: Arc<DomainLocks>,
    retry: RetryConfig,
    default_period_years: u8,
}

impl DomainStateMachine {
    pub fn new(
        registry: Arc<dyn RegistryOps>,
        store: Arc<dyn DomainStore>,
        events: EventEmitter,
        retry: RetryConfig,
        default_period_years: u8,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            locks: Arc::new(DomainLocks::new()),
            retry,
            default_period_years,
        }
    }

    pub fn store(&self) -> &Arc<dyn DomainStore> {
        &self.store
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn apply_transition(
        &self,
        domain: &mut Domain,
        to: DomainState,
        operation: &'static str,
    ) -> Result<(), LifecycleError> {
        if domain.state == to {
            return Ok(());
        }
        if !transition_allowed(domain.state, to) {
            return Err(LifecycleError::InvalidTransition {
                operation,
                from: domain.state,
            });
        }
        domain.record_transition(to, operation);
        Ok(())
    }

    /// Registry state wins: compute the lifecycle state a remote record
    /// implies.
    fn state_for_record(record: &DomainRecord) -> DomainState {
        if record.is_pending_delete() {
            DomainState::Deleted
        } else if record.is_on_hold() {
            DomainState::OnHold
        } else if record.nameservers.is_empty() {
            DomainState::DnsNeeded
        } else {
            DomainState::Ready
        }
    }

    fn clear_sync(&self, domain: &mut Domain) {
        domain.sync.last_attempt_at = Some(Utc::now());
        domain.sync.attempts = 0;
        domain.sync.next_retry_at = None;
        domain.sync.pending = None;
        domain.sync.parked = false;
    }

    /// Record a transient failure: keep lifecycle state untouched, schedule
    /// the retry with capped, jittered exponential backoff, and park the
    /// domain for an operator once attempts are exhausted.
    fn schedule_retry(&self, domain: &mut Domain, operation: PendingOperation) {
        let kind = operation.kind();
        domain.sync.last_attempt_at = Some(Utc::now());
        domain.sync.attempts += 1;
        domain.sync.pending = Some(operation);
        if attempts_exhausted(&self.retry, domain.sync.attempts) {
            domain.sync.parked = true;
            domain.sync.next_retry_at = None;
            tracing::error!(
                domain = %domain.name,
                attempts = domain.sync.attempts,
                operation = kind,
                "retries exhausted; domain parked for operator attention"
            );
        } else {
            let delay = backoff_delay(&self.retry, domain.sync.attempts);
            domain.sync.next_retry_at =
                Some(Utc::now() + Duration::from_std(delay).unwrap_or_else(|_| Duration::zero()));
        }
    }

    async fn persist(&self, domain: Domain) -> Result<(), LifecycleError> {
        self.store.update(domain).await?;
        Ok(())
    }

    /// Create the remote object for a locally approved domain. Valid only
    /// from `Unknown`. An already-existing remote object sponsored by this
    /// registrar is idempotent success; sponsored by anyone else it is a
    /// conflict that only an operator can resolve.
    pub async fn provision(&self, name: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;

        if domain.state != DomainState::Unknown {
            return Err(LifecycleError::InvalidTransition {
                operation: "provision",
                from: domain.state,
            });
        }
        if !domain.has_required_contacts() {
            return Err(LifecycleError::Validation(
                "domain must carry exactly one active contact per required role".to_string(),
            ));
        }

        let assignments = match sync::provision_contacts(self.registry.as_ref(), &mut domain).await
        {
            Ok(assignments) => assignments,
            Err(sync::SyncError::MissingContact(role)) => {
                return Err(LifecycleError::Validation(format!(
                    "domain has no active {} contact",
                    role.as_str()
                )));
            }
            Err(sync::SyncError::Registry(err)) => {
                return self
                    .fail_registry(domain, PendingOperation::Provision, err)
                    .await;
            }
        };

        let registrant = assignments
            .iter()
            .find(|a| a.role == crate::domain::model::ContactRole::Registrant)
            .map(|a| a.id.clone())
            .unwrap_or_default();
        let other_contacts = assignments
            .iter()
            .filter(|a| a.role != crate::domain::model::ContactRole::Registrant)
            .cloned()
            .collect();

        let create = self
            .registry
            .create_domain(
                name,
                self.default_period_years,
                &registrant,
                other_contacts,
                Vec::new(),
            )
            .await;

        match create {
            Ok(created) => {
                domain.registry_id = Some(created.registry_id.clone());
                domain.expiration_date = Some(created.expiration_date);
                self.apply_transition(&mut domain, DomainState::DnsNeeded, "provision")?;
                self.clear_sync(&mut domain);
                let event = LifecycleEvent::Provisioned {
                    domain: domain.name.clone(),
                    registry_id: created.registry_id,
                    at: Utc::now(),
                };
                self.persist(domain).await?;
                self.events.emit(event);
                Ok(())
            }
            Err(RegistryError::ObjectExists { .. }) => {
                // Decide idempotence vs conflict from the authoritative
                // record, never by overwriting.
                let info = match self.registry.domain_info(name).await {
                    Ok(info) => info,
                    Err(err) => {
                        return self
                            .fail_registry(domain, PendingOperation::Provision, err)
                            .await;
                    }
                };
                if info.sponsor_client_id != self.registry.client_id() {
                    let reference = Uuid::new_v4();
                    tracing::error!(
                        domain = %domain.name,
                        sponsor = %info.sponsor_client_id,
                        reference = %reference,
                        "remote object exists under another sponsor; operator intervention required"
                    );
                    return Err(LifecycleError::RegistryConflict {
                        domain: name.to_string(),
                        reference,
                    });
                }
                let registry_id = info.registry_id.clone();
                self.adopt_record(&mut domain, &info, "provision")?;
                self.clear_sync(&mut domain);
                let event = LifecycleEvent::Provisioned {
                    domain: domain.name.clone(),
                    registry_id,
                    at: Utc::now(),
                };
                self.persist(domain).await?;
                self.events.emit(event);
                Ok(())
            }
            Err(err) => {
                self.fail_registry(domain, PendingOperation::Provision, err)
                    .await
            }
        }
    }

    /// Replace the domain's delegation. The post-call state is recomputed
    /// from what the registry reports, not from the requested set, so a
    /// partial failure leaves local state consistent with remote truth.
    pub async fn set_nameservers(
        &self,
        name: &str,
        desired: Vec<HostSpec>,
    ) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;

        if !matches!(domain.state, DomainState::Ready | DomainState::DnsNeeded) {
            return Err(LifecycleError::InvalidTransition {
                operation: "set-nameservers",
                from: domain.state,
            });
        }
        sync::validate_host_set(&domain.name, &desired)?;

        let delta = sync::diff_hosts(&desired, &domain.nameservers);

        // Glue hosts must exist as registry objects before delegation.
        for host in &delta.add {
            if !crate::domain::model::host_is_subordinate(&host.name, &domain.name) {
                continue;
            }
            let created = self
                .registry
                .create_host(&host.name, host.addresses.clone())
                .await;
            match created {
                Ok(()) => {}
                Err(RegistryError::ObjectExists { .. }) => {
                    if let Err(err) = self
                        .registry
                        .update_host(&host.name, host.addresses.clone(), Vec::new())
                        .await
                    {
                        return self
                            .fail_registry(domain, PendingOperation::SetNameservers(desired), err)
                            .await;
                    }
                }
                Err(err) => {
                    return self
                        .fail_registry(domain, PendingOperation::SetNameservers(desired), err)
                        .await;
                }
            }
        }

        if !delta.is_empty() {
            let update = DomainUpdateSpec {
                add_nameservers: delta.add.iter().map(|h| h.name.clone()).collect(),
                remove_nameservers: delta.remove.clone(),
                ..Default::default()
            };
            if let Err(err) = self.registry.update_domain(name, update).await {
                return self
                    .fail_registry(domain, PendingOperation::SetNameservers(desired), err)
                    .await;
            }
        }

        // Post-update truth, not pre-call intent.
        let info = match self.registry.domain_info(name).await {
            Ok(info) => info,
            Err(err) => {
                return self
                    .fail_registry(domain, PendingOperation::SetNameservers(desired), err)
                    .await;
            }
        };
        domain.nameservers = hosts_from_record(&info, &desired);
        let new_state = Self::state_for_record(&info);
        if new_state == DomainState::Ready && domain.first_ready.is_none() {
            domain.first_ready = Some(Utc::now());
        }
        self.apply_transition(&mut domain, new_state, "set-nameservers")?;
        self.clear_sync(&mut domain);
        self.persist(domain).await
    }

    /// Attach delegation-signer data. Requires an existing delegation:
    /// DS data without a nameserver would break the zone at validation time.
    pub async fn set_ds_data(
        &self,
        name: &str,
        records: Vec<DsRecord>,
    ) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;

        if !matches!(domain.state, DomainState::Ready | DomainState::DnsNeeded) {
            return Err(LifecycleError::InvalidTransition {
                operation: "set-ds-data",
                from: domain.state,
            });
        }
        if !records.is_empty() && domain.active_nameservers().is_empty() {
            return Err(LifecycleError::Validation(
                "DS data requires at least one nameserver with resolvable glue".to_string(),
            ));
        }

        let update = DomainUpdateSpec {
            ds_data: Some(records.clone()),
            ..Default::default()
        };
        if let Err(err) = self.registry.update_domain(name, update).await {
            return self
                .fail_registry(domain, PendingOperation::SetDsData(records), err)
                .await;
        }

        domain.ds_data = records;
        self.clear_sync(&mut domain);
        self.persist(domain).await
    }

    /// Replace one role's contact. Post-provisioning the remote contact
    /// object is updated in place under its existing registry handle, so
    /// the exactly-one-contact-per-role invariant holds throughout.
    pub async fn update_contact(
        &self,
        name: &str,
        mut updated: PublicContact,
    ) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;

        if domain.state == DomainState::Deleted {
            return Err(LifecycleError::InvalidTransition {
                operation: "update-contact",
                from: domain.state,
            });
        }
        let Some(index) = domain
            .contacts
            .iter()
            .position(|c| c.role == updated.role && c.active)
        else {
            return Err(LifecycleError::Validation(format!(
                "domain has no active {} contact to update",
                updated.role.as_str()
            )));
        };

        let registry_id = domain.contacts[index].registry_id.clone();
        if let Some(id) = &registry_id {
            let payload = sync::contact_payload(&updated, id);
            if let Err(err) = self.registry.update_contact(payload).await {
                return self
                    .fail_registry(domain, PendingOperation::UpdateContact(updated), err)
                    .await;
            }
        }

        updated.registry_id = registry_id;
        updated.active = true;
        domain.contacts[index] = updated;
        self.clear_sync(&mut domain);
        self.persist(domain).await
    }

    /// Suspend resolution at the registry without deleting anything.
    pub async fn place_hold(&self, name: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;

        if domain.state == DomainState::OnHold {
            return Ok(());
        }
        if !matches!(domain.state, DomainState::Ready | DomainState::DnsNeeded) {
            return Err(LifecycleError::InvalidTransition {
                operation: "place-hold",
                from: domain.state,
            });
        }

        let update = DomainUpdateSpec {
            add_statuses: vec![ObjectStatus::ClientHold],
            ..Default::default()
        };
        if let Err(err) = self.registry.update_domain(name, update).await {
            return self
                .fail_registry(domain, PendingOperation::PlaceHold, err)
                .await;
        }

        self.apply_transition(&mut domain, DomainState::OnHold, "place-hold")?;
        self.clear_sync(&mut domain);
        let event = LifecycleEvent::OnHold {
            domain: domain.name.clone(),
            at: Utc::now(),
        };
        self.persist(domain).await?;
        self.events.emit(event);
        Ok(())
    }

    /// Lift an administrative hold; the resulting state follows the
    /// registry's post-update nameserver count.
    pub async fn remove_hold(&self, name: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;

        if domain.state.is_active() {
            return Ok(());
        }
        if domain.state != DomainState::OnHold {
            return Err(LifecycleError::InvalidTransition {
                operation: "remove-hold",
                from: domain.state,
            });
        }

        let update = DomainUpdateSpec {
            remove_statuses: vec![ObjectStatus::ClientHold],
            ..Default::default()
        };
        if let Err(err) = self.registry.update_domain(name, update).await {
            return self
                .fail_registry(domain, PendingOperation::RemoveHold, err)
                .await;
        }

        let info = match self.registry.domain_info(name).await {
            Ok(info) => info,
            Err(err) => {
                return self
                    .fail_registry(domain, PendingOperation::RemoveHold, err)
                    .await;
            }
        };
        let new_state = Self::state_for_record(&info);
        self.apply_transition(&mut domain, new_state, "remove-hold")?;
        self.clear_sync(&mut domain);
        let event = LifecycleEvent::HoldRemoved {
            domain: domain.name.clone(),
            at: Utc::now(),
        };
        self.persist(domain).await?;
        self.events.emit(event);
        Ok(())
    }

    /// Extend the registration period. A duplicate renewal reported by the
    /// registry is success when the authoritative expiration already covers
    /// the request.
    pub async fn renew(&self, name: &str, years: u8) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;

        if matches!(domain.state, DomainState::Unknown | DomainState::Deleted) {
            return Err(LifecycleError::InvalidTransition {
                operation: "renew",
                from: domain.state,
            });
        }
        let current_expiration = domain.expiration_date.ok_or_else(|| {
            LifecycleError::Validation("domain has no expiration date on record".to_string())
        })?;

        let new_expiration = match self
            .registry
            .renew_domain(name, current_expiration, years)
            .await
        {
            Ok(expiration) => expiration,
            Err(err @ RegistryError::PolicyViolation { .. }) => {
                // Possibly a duplicate renewal inside the same billing
                // cycle. The follow-up info decides.
                let requested = current_expiration + Duration::days(365 * i64::from(years));
                match self.registry.domain_info(name).await {
                    Ok(info) if info.expiration_date >= requested => {
                        tracing::info!(
                            domain = %domain.name,
                            expiration = %info.expiration_date,
                            "duplicate renewal detected; registry already covers the requested period"
                        );
                        info.expiration_date
                    }
                    Ok(_) => {
                        return Err(LifecycleError::from_registry(name, err));
                    }
                    Err(info_err) => {
                        return self
                            .fail_registry(domain, PendingOperation::Renew { years }, info_err)
                            .await;
                    }
                }
            }
            Err(err) => {
                return self
                    .fail_registry(domain, PendingOperation::Renew { years }, err)
                    .await;
            }
        };

        domain.expiration_date = Some(new_expiration);
        domain.sync.expiry_notice_sent = false;
        self.clear_sync(&mut domain);
        let event = LifecycleEvent::Renewed {
            domain: domain.name.clone(),
            new_expiration,
            at: Utc::now(),
        };
        self.persist(domain).await?;
        self.events.emit(event);
        Ok(())
    }

    /// Delete the domain. Local ownership is cascaded as a state change —
    /// contacts and hosts are marked inactive, never erased, and the record
    /// itself survives for audit. Deleting a deleted domain is success.
    pub async fn delete(&self, name: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;

        if domain.state == DomainState::Deleted {
            return Ok(());
        }

        if domain.registry_id.is_some() {
            match self.registry.delete_domain(name).await {
                Ok(()) => {}
                // Already gone remotely; converge.
                Err(RegistryError::ObjectNotFound { .. }) => {}
                Err(err) => {
                    return self
                        .fail_registry(domain, PendingOperation::Delete, err)
                        .await;
                }
            }
        }

        self.apply_transition(&mut domain, DomainState::Deleted, "delete")?;
        for contact in &mut domain.contacts {
            contact.active = false;
        }
        for host in &mut domain.nameservers {
            host.active = false;
        }
        domain.deleted_at = Some(Utc::now());
        self.clear_sync(&mut domain);
        let event = LifecycleEvent::Deleted {
            domain: domain.name.clone(),
            at: Utc::now(),
        };
        self.persist(domain).await?;
        self.events.emit(event);
        Ok(())
    }

    /// Cross-check local state against the registry's authoritative record
    /// and adopt remote truth. Used by the reconciliation scheduler, and
    /// before re-driving any pending operation whose previous attempt may
    /// have half-applied (a timed-out update is indistinguishable from an
    /// applied one until info says so).
    pub async fn refresh_from_registry(
        &self,
        name: &str,
    ) -> Result<RefreshOutcome, LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;

        if domain.registry_id.is_none() || domain.state == DomainState::Deleted {
            domain.sync.last_checked_at = Some(Utc::now());
            self.persist(domain).await?;
            return Ok(RefreshOutcome::NotProvisioned);
        }

        let info = match self.registry.domain_info(name).await {
            Ok(info) => info,
            Err(RegistryError::ObjectNotFound { .. }) => {
                // Registry-driven removal: converge on deleted.
                self.apply_transition(&mut domain, DomainState::Deleted, "reconcile")?;
                for contact in &mut domain.contacts {
                    contact.active = false;
                }
                for host in &mut domain.nameservers {
                    host.active = false;
                }
                domain.deleted_at = Some(Utc::now());
                domain.sync.last_checked_at = Some(Utc::now());
                self.clear_sync(&mut domain);
                let event = LifecycleEvent::Deleted {
                    domain: domain.name.clone(),
                    at: Utc::now(),
                };
                self.persist(domain).await?;
                self.events.emit(event);
                return Ok(RefreshOutcome::RemoteMissing);
            }
            Err(err) => return Err(LifecycleError::from_registry(name, err)),
        };

        let remote_state = Self::state_for_record(&info);
        let remote_hosts: Vec<String> = info.nameservers.clone();
        let local_hosts: Vec<String> = domain
            .active_nameservers()
            .iter()
            .map(|h| h.name.clone())
            .collect();
        let diverged = remote_state != domain.state
            || remote_hosts != local_hosts
            || domain.expiration_date != Some(info.expiration_date);

        domain.sync.last_checked_at = Some(Utc::now());
        if !diverged {
            self.persist(domain).await?;
            return Ok(RefreshOutcome::Unchanged);
        }

        tracing::warn!(
            domain = %domain.name,
            local_state = %domain.state,
            remote_state = %remote_state,
            "registry record diverged from local state; adopting remote truth"
        );
        let known_glue: Vec<HostSpec> = domain
            .nameservers
            .iter()
            .map(|h| HostSpec {
                name: h.name.clone(),
                addresses: h.addresses.clone(),
            })
            .collect();
        domain.nameservers = hosts_from_record(&info, &known_glue);
        domain.expiration_date = Some(info.expiration_date);
        if remote_state == DomainState::Ready && domain.first_ready.is_none() {
            domain.first_ready = Some(Utc::now());
        }
        self.apply_transition(&mut domain, remote_state, "reconcile")?;
        self.persist(domain).await?;
        Ok(RefreshOutcome::Updated)
    }

    /// Re-drive the pending operation recorded by an earlier transient
    /// failure. Called by the scheduler once the backoff deadline passes.
    pub async fn retry_pending(&self, name: &str) -> Result<(), LifecycleError> {
        let snapshot = self.store.get(name).await?;
        let Some(operation) = snapshot.sync.pending.clone() else {
            return Ok(());
        };

        // Anything with a remote object gets a fresh info first so deltas
        // are computed against what the registry actually holds.
        if snapshot.registry_id.is_some() {
            self.refresh_from_registry(name).await?;
        }

        tracing::info!(
            domain = name,
            operation = operation.kind(),
            "re-driving pending registry operation"
        );
        match operation {
            PendingOperation::Provision => self.provision(name).await,
            PendingOperation::SetNameservers(hosts) => self.set_nameservers(name, hosts).await,
            PendingOperation::SetDsData(records) => self.set_ds_data(name, records).await,
            PendingOperation::UpdateContact(contact) => self.update_contact(name, contact).await,
            PendingOperation::PlaceHold => self.place_hold(name).await,
            PendingOperation::RemoveHold => self.remove_hold(name).await,
            PendingOperation::Renew { years } => self.renew(name, years).await,
            PendingOperation::Delete => self.delete(name).await,
        }
    }

    /// Emit `domain.expiring` once per registration period when the
    /// expiration date enters the notice window. Renewal resets the flag.
    pub async fn emit_expiring_if_due(
        &self,
        name: &str,
        window: Duration,
    ) -> Result<bool, LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;
        if !domain.state.is_active() || domain.sync.expiry_notice_sent {
            return Ok(false);
        }
        let Some(expiration) = domain.expiration_date else {
            return Ok(false);
        };
        if expiration > Utc::now() + window {
            return Ok(false);
        }
        domain.sync.expiry_notice_sent = true;
        let event = LifecycleEvent::Expiring {
            domain: domain.name.clone(),
            expiration,
            at: Utc::now(),
        };
        self.persist(domain).await?;
        self.events.emit(event);
        Ok(true)
    }

    /// Park a domain's pending work for operator attention (credential
    /// failures, exhausted retries). Parked domains leave the retry set
    /// until an operator intervenes.
    pub async fn park(&self, name: &str, reason: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;
        domain.sync.parked = true;
        domain.sync.next_retry_at = None;
        tracing::error!(domain = name, reason = reason, "domain parked for operator attention");
        self.persist(domain).await
    }

    /// Drop a pending operation that can no longer apply (e.g. the domain
    /// was deleted while a nameserver change waited for retry).
    pub async fn abandon_pending(&self, name: &str, reason: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.try_acquire(name)?;
        let mut domain = self.store.get(name).await?;
        if let Some(pending) = domain.sync.pending.take() {
            tracing::warn!(
                domain = name,
                operation = pending.kind(),
                reason = reason,
                "abandoning pending registry operation"
            );
        }
        domain.sync.next_retry_at = None;
        self.persist(domain).await
    }

    fn adopt_record(
        &self,
        domain: &mut Domain,
        info: &DomainRecord,
        operation: &'static str,
    ) -> Result<(), LifecycleError> {
        domain.registry_id = Some(info.registry_id.clone());
        domain.expiration_date = Some(info.expiration_date);
        domain.nameservers = hosts_from_record(info, &[]);
        let state = Self::state_for_record(info);
        if state == DomainState::Ready && domain.first_ready.is_none() {
            domain.first_ready = Some(Utc::now());
        }
        self.apply_transition(domain, state, operation)
    }

    /// Transient failures schedule a retry and surface the error; anything
    /// else surfaces without touching sync bookkeeping beyond the attempt
    /// timestamp.
    async fn fail_registry(
        &self,
        mut domain: Domain,
        operation: PendingOperation,
        err: RegistryError,
    ) -> Result<(), LifecycleError> {
        let name = domain.name.as_str().to_string();
        if err.is_retryable() {
            self.schedule_retry(&mut domain, operation);
            self.persist(domain).await?;
        } else {
            domain.sync.last_attempt_at = Some(Utc::now());
            self.persist(domain).await?;
        }
        Err(LifecycleError::from_registry(&name, err))
    }
}

/// Build the stored host list from a registry record, keeping glue
/// addresses from the requested specs where names match.
fn hosts_from_record(record: &DomainRecord, requested: &[HostSpec]) -> Vec<Host> {
    record
        .nameservers
        .iter()
        .map(|name| Host {
            name: name.clone(),
            addresses: requested
                .iter()
                .find(|spec| &spec.name == name)
                .map(|spec| spec.addresses.clone())
                .unwrap_or_default(),
            active: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_is_terminal_in_the_table() {
        for (from, _) in LEGAL_TRANSITIONS {
            assert_ne!(
                *from,
                DomainState::Deleted,
                "no transition may leave the deleted state"
            );
        }
    }

    #[test]
    fn every_live_state_can_reach_deleted() {
        for from in [
            DomainState::Unknown,
            DomainState::DnsNeeded,
            DomainState::Ready,
            DomainState::OnHold,
        ] {
            assert!(transition_allowed(from, DomainState::Deleted));
        }
    }

    #[test]
    fn identity_transitions_are_allowed() {
        for state in [
            DomainState::Unknown,
            DomainState::DnsNeeded,
            DomainState::Ready,
            DomainState::OnHold,
            DomainState::Deleted,
        ] {
            assert!(transition_allowed(state, state));
        }
    }

    #[test]
    fn unknown_cannot_be_reentered() {
        for to in [DomainState::Unknown] {
            for from in [DomainState::DnsNeeded, DomainState::Ready, DomainState::OnHold] {
                assert!(!transition_allowed(from, to));
            }
        }
    }
}
