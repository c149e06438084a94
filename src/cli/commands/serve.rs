use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::RegistrarConfig;
use crate::domain::state_machine::DomainStateMachine;
use crate::domain::store::MemoryDomainStore;
use crate::events::EventEmitter;
use crate::reconcile::scheduler::ReconciliationScheduler;
use crate::shutdown::ShutdownCoordinator;

const KEEPALIVE_PERIOD: Duration = Duration::from_secs(60);

pub struct ServeCommand {
    pub once: bool,
}

impl ServeCommand {
    pub fn new(once: bool) -> Self {
        Self { once }
    }

    pub async fn execute(&self, config: &RegistrarConfig) -> Result<()> {
        let client = super::build_client(config)?;
        let store = Arc::new(MemoryDomainStore::new());
        let events = EventEmitter::default();
        let engine = Arc::new(DomainStateMachine::new(
            client.clone(),
            store.clone(),
            events.clone(),
            config.reconciliation.retry.clone(),
            config.registry.default_period_years,
        ));
        let scheduler = Arc::new(ReconciliationScheduler::new(
            engine,
            store,
            config.reconciliation.clone(),
        ));

        if self.once {
            let report = scheduler.run_once().await?;
            println!(
                "reconciliation pass: {} retried, {} repaired, {} skipped (locked), {} expiring notices",
                report.retried, report.repaired, report.skipped_locked, report.expiring_notices
            );
            client.logout().await.ok();
            return Ok(());
        }

        let coordinator = ShutdownCoordinator::new();
        let scheduler_task = {
            let scheduler = scheduler.clone();
            let shutdown = coordinator.subscribe();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        info!(
            host = %config.registry.host,
            interval_seconds = config.reconciliation.interval_seconds,
            "registrar lifecycle service running"
        );

        // Keepalive holds the registry session open between passes; the
        // loop ends on the first shutdown signal.
        let mut shutdown_rx = coordinator.subscribe();
        let mut keepalive = tokio::time::interval(KEEPALIVE_PERIOD);
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    if let Err(err) = client.keepalive().await {
                        warn!(error = %err, "registry keepalive failed");
                    }
                }
                _ = ShutdownCoordinator::wait_for_signal() => {
                    break;
                }
                _ = shutdown_rx.changed() => {
                    break;
                }
            }
        }

        coordinator
            .shutdown(Some(scheduler_task), Some(client))
            .await
    }
}
