use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::request::model::DomainRequest;

/// Local system of record for requests. The audit trail must survive
/// approval, so records are only ever inserted and updated.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: DomainRequest) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<DomainRequest, StoreError>;
    async fn update(&self, request: DomainRequest) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<DomainRequest>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryRequestStore {
    inner: RwLock<HashMap<Uuid, DomainRequest>>,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn insert(&self, request: DomainRequest) -> Result<(), StoreError> {
        self.inner.write().await.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<DomainRequest, StoreError> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::RequestNotFound(id))
    }

    async fn update(&self, request: DomainRequest) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.contains_key(&request.id) {
            return Err(StoreError::RequestNotFound(request.id));
        }
        inner.insert(request.id, request);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DomainRequest>, StoreError> {
        let mut requests: Vec<DomainRequest> = self.inner.read().await.values().cloned().collect();
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }
}
