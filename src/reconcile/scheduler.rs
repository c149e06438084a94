//! Reconciliation scheduler: bounded periodic passes that re-drive
//! transiently failed registry operations and cross-check active domains
//! against the registry's authoritative record.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::watch;

use crate::config::ReconciliationConfig;
use crate::domain::state_machine::{DomainStateMachine, RefreshOutcome};
use crate::domain::store::DomainStore;
use crate::domain::model::DomainState;
use crate::errors::LifecycleError;

/// What one pass did. Counts only; details are in the logs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub examined: u32,
    pub retried: u32,
    pub retry_failures: u32,
    pub abandoned: u32,
    pub parked: u32,
    pub checked: u32,
    pub repaired: u32,
    pub removed_remotely: u32,
    pub check_failures: u32,
    pub skipped_locked: u32,
    pub expiring_notices: u32,
}

pub struct ReconciliationScheduler {
    engine: Arc<DomainStateMachine>,
    store: Arc<dyn DomainStore>,
    config: ReconciliationConfig,
}

impl ReconciliationScheduler {
    pub fn new(
        engine: Arc<DomainStateMachine>,
        store: Arc<dyn DomainStore>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    /// One bounded pass: first the retry set, then the divergence
    /// cross-check. Locked domains are skipped, never waited on, so a
    /// foreground operation always wins.
    pub async fn run_once(&self) -> Result<PassReport, LifecycleError> {
        let mut report = PassReport::default();
        let limit = self.config.max_items_per_run as usize;

        let due = self.store.due_for_retry(Utc::now(), limit).await?;
        for domain in due {
            let name = domain.name.as_str().to_string();
            report.examined += 1;
            match self.engine.retry_pending(&name).await {
                Ok(()) => report.retried += 1,
                Err(LifecycleError::Concurrency { .. }) => report.skipped_locked += 1,
                Err(err) if err.is_retryable() => {
                    // The engine already rescheduled with backoff.
                    report.retry_failures += 1;
                }
                Err(LifecycleError::RegistryAuth { .. }) => {
                    // Credential problems are system-wide; retrying other
                    // domains this pass would only multiply the alerts.
                    self.engine
                        .park(&name, "registry authentication failed")
                        .await
                        .ok();
                    report.parked += 1;
                    break;
                }
                Err(err) => {
                    // Permanent failure: the operation will never succeed
                    // as recorded. Drop it and leave the rest to operators.
                    self.engine
                        .abandon_pending(&name, &err.to_string())
                        .await
                        .ok();
                    report.abandoned += 1;
                }
            }
        }

        let active = self
            .store
            .in_states(&[DomainState::Ready, DomainState::DnsNeeded], limit)
            .await?;
        for domain in active {
            let name = domain.name.as_str().to_string();
            if domain.sync.pending.is_some() {
                // The retry path already verified this domain against the
                // registry.
                continue;
            }
            report.checked += 1;
            match self.engine.refresh_from_registry(&name).await {
                Ok(RefreshOutcome::Updated) => report.repaired += 1,
                Ok(RefreshOutcome::RemoteMissing) => report.removed_remotely += 1,
                Ok(_) => {}
                Err(LifecycleError::Concurrency { .. }) => {
                    report.skipped_locked += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(domain = %name, error = %err, "divergence cross-check failed");
                    report.check_failures += 1;
                    continue;
                }
            }

            match self
                .engine
                .emit_expiring_if_due(&name, Duration::days(self.config.expiring_window_days))
                .await
            {
                Ok(true) => report.expiring_notices += 1,
                Ok(false) => {}
                Err(LifecycleError::Concurrency { .. }) => report.skipped_locked += 1,
                Err(err) => {
                    tracing::warn!(domain = %name, error = %err, "expiring-notice check failed");
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            retried = report.retried,
            retry_failures = report.retry_failures,
            abandoned = report.abandoned,
            checked = report.checked,
            repaired = report.repaired,
            removed_remotely = report.removed_remotely,
            skipped_locked = report.skipped_locked,
            expiring_notices = report.expiring_notices,
            "reconciliation pass complete"
        );
        Ok(report)
    }

    /// Run passes on the configured interval until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = std::time::Duration::from_secs(self.config.interval_seconds);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::error!(error = %err, "reconciliation pass aborted");
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        tracing::info!("reconciliation scheduler stopping");
                        return;
                    }
                }
            }
        }
    }
}
