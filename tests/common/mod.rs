//! Shared harness: a domain state machine wired to the in-process fake
//! registry through the real client, plus seed helpers.
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use registrar_core::config::{RegistrarConfig, RetryConfig};
use registrar_core::domain::model::{ContactRole, DomainName, HostSpec, PublicContact};
use registrar_core::domain::state_machine::DomainStateMachine;
use registrar_core::domain::store::{DomainStore, MemoryDomainStore};
use registrar_core::domain::Domain;
use registrar_core::events::EventEmitter;
use registrar_core::registry::client::RegistryClient;
use registrar_core::registry::mock::{FakeRegistry, FakeRegistryHandle};
use registrar_core::request::model::{DomainRequest, RequestedContact};
use uuid::Uuid;

pub const CLIENT_ID: &str = "govreg";

pub struct Harness {
    pub engine: Arc<DomainStateMachine>,
    pub store: Arc<MemoryDomainStore>,
    pub events: EventEmitter,
    pub registry: FakeRegistryHandle,
    pub client: Arc<RegistryClient>,
}

pub fn harness() -> Harness {
    harness_with_retry(RetryConfig {
        max_attempts: 8,
        base_delay_ms: 0,
        max_delay_ms: 0,
        jitter: false,
    })
}

pub fn harness_with_retry(retry: RetryConfig) -> Harness {
    let mut registry_config = RegistrarConfig::default().registry;
    registry_config.password = Some("secret".to_string());
    registry_config.command_timeout_seconds = 1;
    // Keep the pacing limiter out of the way so paused-clock tests never
    // wait on real time.
    registry_config.rate_limit.commands_per_second = 1_000;
    registry_config.rate_limit.burst_capacity = 1_000;

    let (transport, handle) = FakeRegistry::new(CLIENT_ID, "secret");
    let client = Arc::new(RegistryClient::new(&registry_config, Box::new(transport)).unwrap());
    let store = Arc::new(MemoryDomainStore::new());
    let events = EventEmitter::default();
    let engine = Arc::new(DomainStateMachine::new(
        client.clone(),
        store.clone(),
        events.clone(),
        retry,
        1,
    ));
    Harness {
        engine,
        store,
        events,
        registry: handle,
        client,
    }
}

pub fn required_contacts() -> Vec<PublicContact> {
    ContactRole::REQUIRED
        .iter()
        .map(|role| PublicContact::new(*role, "Jo Staff", Some("City of Testing"), "jo@city.gov", None))
        .collect()
}

pub fn requested_contacts() -> Vec<RequestedContact> {
    ContactRole::REQUIRED
        .iter()
        .map(|role| RequestedContact {
            role: *role,
            name: "Jo Staff".to_string(),
            organization: Some("City of Testing".to_string()),
            email: "jo@city.gov".to_string(),
            voice: Some("+1.2025550100".to_string()),
        })
        .collect()
}

pub fn unknown_domain(name: &str) -> Domain {
    Domain::new_unknown(
        DomainName::from_str(name).unwrap(),
        Uuid::new_v4(),
        required_contacts(),
        "jo@city.gov",
    )
}

pub fn request_for(name: &str) -> DomainRequest {
    DomainRequest::new(
        DomainName::from_str(name).unwrap(),
        "City of Testing",
        "jo@city.gov",
        requested_contacts(),
    )
}

pub fn host(name: &str) -> HostSpec {
    HostSpec {
        name: name.to_string(),
        addresses: Vec::new(),
    }
}

pub fn glue_host(name: &str, addr: &str) -> HostSpec {
    HostSpec {
        name: name.to_string(),
        addresses: vec![addr.parse().unwrap()],
    }
}

/// Seed a provisioned domain: insert locally in Unknown, then provision
/// through the engine so local and fake-remote state agree.
pub async fn provisioned_domain(h: &Harness, name: &str) -> Domain {
    h.store.insert(unknown_domain(name)).await.unwrap();
    h.engine.provision(name).await.unwrap();
    h.store.get(name).await.unwrap()
}
