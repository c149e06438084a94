use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::model::{Domain, DomainState};
use crate::errors::StoreError;

/// Local system of record for domains. Persistence technology is a seam;
/// the in-memory implementation backs the binary and the tests.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Insert a new domain. Fails if the name is already present — domain
    /// names are identities, never reused while a record exists.
    async fn insert(&self, domain: Domain) -> Result<(), StoreError>;

    async fn get(&self, name: &str) -> Result<Domain, StoreError>;

    /// Replace an existing domain record.
    async fn update(&self, domain: Domain) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Domain>, StoreError>;

    /// Domains whose pending operation is due for a retry, oldest first,
    /// bounded by `limit`. Parked domains are excluded.
    async fn due_for_retry(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Domain>, StoreError>;

    /// Domains in the given states, least recently cross-checked first,
    /// bounded by `limit`.
    async fn in_states(
        &self,
        states: &[DomainState],
        limit: usize,
    ) -> Result<Vec<Domain>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryDomainStore {
    inner: RwLock<HashMap<String, Domain>>,
}

impl MemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DomainStore for MemoryDomainStore {
    async fn insert(&self, domain: Domain) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let key = domain.name.as_str().to_string();
        if inner.contains_key(&key) {
            return Err(StoreError::DomainExists(key));
        }
        inner.insert(key, domain);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Domain, StoreError> {
        self.inner
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::DomainNotFound(name.to_string()))
    }

    async fn update(&self, domain: Domain) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let key = domain.name.as_str().to_string();
        if !inner.contains_key(&key) {
            return Err(StoreError::DomainNotFound(key));
        }
        inner.insert(key, domain);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Domain>, StoreError> {
        let mut domains: Vec<Domain> = self.inner.read().await.values().cloned().collect();
        domains.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        Ok(domains)
    }

    async fn due_for_retry(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Domain>, StoreError> {
        let inner = self.inner.read().await;
        let mut due: Vec<Domain> = inner
            .values()
            .filter(|d| {
                !d.sync.parked
                    && d.sync.pending.is_some()
                    && d.sync.next_retry_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|d| d.sync.next_retry_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn in_states(
        &self,
        states: &[DomainState],
        limit: usize,
    ) -> Result<Vec<Domain>, StoreError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<Domain> = inner
            .values()
            .filter(|d| states.contains(&d.state))
            .cloned()
            .collect();
        matching.sort_by_key(|d| d.sync.last_checked_at);
        matching.truncate(limit);
        Ok(matching)
    }
}
