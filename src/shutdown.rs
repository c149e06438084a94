use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::registry::client::RegistryClient;

/// Graceful shutdown coordinator: stops the reconciliation scheduler and
/// logs the registry session out before the process exits.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Receiver handed to long-running tasks (the scheduler loop).
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Block until SIGINT.
    pub async fn wait_for_signal() -> Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        Ok(())
    }

    /// Perform graceful shutdown: signal tasks, wait for the scheduler to
    /// finish its current pass, then log out of the registry session.
    pub async fn shutdown(
        self,
        scheduler: Option<JoinHandle<()>>,
        client: Option<Arc<RegistryClient>>,
    ) -> Result<()> {
        info!("Initiating graceful shutdown of all services...");
        let _ = self.tx.send(true);

        if let Some(handle) = scheduler {
            if timeout(Duration::from_secs(30), handle).await.is_err() {
                warn!("reconciliation scheduler did not stop within 30s");
            }
        }

        if let Some(client) = client {
            match timeout(Duration::from_secs(10), client.logout()).await {
                Ok(Ok(())) => info!("registry session logged out"),
                Ok(Err(err)) => warn!("registry logout failed: {}", err),
                Err(_) => warn!("registry logout timed out"),
            }
        }

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_signal_reaches_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        assert!(!*rx.borrow());

        coordinator.shutdown(None, None).await.unwrap();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
