//! Registry protocol client: one authenticated session, one outstanding
//! command at a time, typed operations over the closed error taxonomy.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use moka::future::Cache;
use std::net::IpAddr;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::domain::model::DsRecord;
use crate::registry::errors::RegistryError;
use crate::registry::transport::{RegistryTransport, TransportError};
use crate::registry::types::{
    Command, ContactData, DomainRecord, ObjectStatus, Request, Response, ResponseData,
};

/// Result of a domain availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub available: bool,
    pub reason: Option<String>,
}

/// Result of a successful domain create.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedDomain {
    pub registry_id: String,
    pub expiration_date: DateTime<Utc>,
}

/// A domain update, diffed by the synchronizer into add/remove deltas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainUpdateSpec {
    pub add_nameservers: Vec<String>,
    pub remove_nameservers: Vec<String>,
    pub add_statuses: Vec<ObjectStatus>,
    pub remove_statuses: Vec<ObjectStatus>,
    /// `Some` replaces the full DS set.
    pub ds_data: Option<Vec<DsRecord>>,
}

impl DomainUpdateSpec {
    pub fn is_empty(&self) -> bool {
        self.add_nameservers.is_empty()
            && self.remove_nameservers.is_empty()
            && self.add_statuses.is_empty()
            && self.remove_statuses.is_empty()
            && self.ds_data.is_none()
    }
}

/// Typed registry operations consumed by the domain state machine and the
/// synchronizer. A trait seam so tests can exercise the lifecycle without a
/// network.
#[async_trait]
pub trait RegistryOps: Send + Sync {
    async fn check_domain(&self, name: &str) -> Result<CheckResult, RegistryError>;
    async fn create_domain(
        &self,
        name: &str,
        period_years: u8,
        registrant_id: &str,
        contacts: Vec<crate::registry::types::ContactAssignment>,
        nameservers: Vec<String>,
    ) -> Result<CreatedDomain, RegistryError>;
    async fn domain_info(&self, name: &str) -> Result<DomainRecord, RegistryError>;
    async fn update_domain(
        &self,
        name: &str,
        update: DomainUpdateSpec,
    ) -> Result<(), RegistryError>;
    async fn renew_domain(
        &self,
        name: &str,
        current_expiration: DateTime<Utc>,
        period_years: u8,
    ) -> Result<DateTime<Utc>, RegistryError>;
    async fn delete_domain(&self, name: &str) -> Result<(), RegistryError>;
    async fn create_host(&self, name: &str, addresses: Vec<IpAddr>) -> Result<(), RegistryError>;
    async fn update_host(
        &self,
        name: &str,
        add_addresses: Vec<IpAddr>,
        remove_addresses: Vec<IpAddr>,
    ) -> Result<(), RegistryError>;
    async fn delete_host(&self, name: &str) -> Result<(), RegistryError>;
    async fn create_contact(&self, contact: ContactData) -> Result<(), RegistryError>;
    async fn update_contact(&self, contact: ContactData) -> Result<(), RegistryError>;
    async fn delete_contact(&self, id: &str) -> Result<(), RegistryError>;
    fn client_id(&self) -> &str;
}

struct Session {
    transport: Box<dyn RegistryTransport>,
    authenticated: bool,
}

/// The production client. Holds the single session behind an async mutex;
/// callers block (with a timeout) for their turn rather than opening
/// parallel sessions.
pub struct RegistryClient {
    session: Arc<tokio::sync::Mutex<Session>>,
    client_id: String,
    password: String,
    command_timeout: Duration,
    session_acquire_timeout: Duration,
    limiter: Arc<DefaultDirectRateLimiter>,
    check_cache: Cache<String, CheckResult>,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl RegistryClient {
    pub fn new(
        config: &RegistryConfig,
        transport: Box<dyn RegistryTransport>,
    ) -> Result<Self, RegistryError> {
        let password = config
            .password
            .clone()
            .ok_or_else(|| RegistryError::AuthenticationFailed {
                detail: "registry password is not configured".to_string(),
            })?;

        let per_second = NonZeroU32::new(config.rate_limit.commands_per_second)
            .unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.rate_limit.burst_capacity).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        let check_cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(config.check_cache_ttl_seconds))
            .build();

        Ok(Self {
            session: Arc::new(tokio::sync::Mutex::new(Session {
                transport,
                authenticated: false,
            })),
            client_id: config.client_id.clone(),
            password,
            command_timeout: Duration::from_secs(config.command_timeout_seconds),
            session_acquire_timeout: Duration::from_secs(config.session_acquire_timeout_seconds),
            limiter: Arc::new(RateLimiter::direct(quota)),
            check_cache,
        })
    }

    /// Issue one command through the shared session. Reconnects a dropped
    /// transport at most once and re-authenticates a rejected session at
    /// most once before failing.
    async fn run(&self, command: Command) -> Result<Response, RegistryError> {
        self.limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let mut session = timeout(self.session_acquire_timeout, self.session.lock())
            .await
            .map_err(|_| RegistryError::Transient {
                detail: "timed out waiting for the registry session".to_string(),
            })?;

        let mut reconnected = false;
        let mut reauthenticated = false;
        loop {
            self.ensure_session(&mut session).await?;

            let request = Request {
                transaction_id: Uuid::new_v4().to_string(),
                command: command.clone(),
            };
            tracing::debug!(
                command = request.command.kind(),
                object = request.command.object_id(),
                transaction_id = %request.transaction_id,
                "issuing registry command"
            );

            let outcome = timeout(self.command_timeout, session.transport.exchange(&request)).await;
            match outcome {
                Err(_elapsed) => {
                    // A timed-out command leaves the exchange in an unknown
                    // state: drop the session so nothing reuses it, and make
                    // the caller verify with a fresh info before trusting
                    // local state.
                    session.transport.close().await.ok();
                    session.authenticated = false;
                    tracing::warn!(
                        command = command.kind(),
                        object = command.object_id(),
                        "registry command timed out; session discarded pending verification"
                    );
                    return Err(RegistryError::Transient {
                        detail: format!("command {} timed out", command.kind()),
                    });
                }
                Ok(Err(err)) => {
                    session.authenticated = false;
                    if reconnected {
                        return Err(transport_failure(err));
                    }
                    reconnected = true;
                    tracing::warn!(
                        command = command.kind(),
                        error = %err,
                        "registry session dropped; re-establishing once"
                    );
                    continue;
                }
                Ok(Ok(response)) => {
                    if response.is_success() {
                        return Ok(response);
                    }
                    let err = RegistryError::from_response_code(
                        response.code,
                        &response.message,
                        command.object_id(),
                    );
                    if matches!(err, RegistryError::AuthenticationFailed { .. })
                        && !reauthenticated
                        && !matches!(command, Command::Login { .. })
                    {
                        reauthenticated = true;
                        session.transport.close().await.ok();
                        session.authenticated = false;
                        tracing::warn!(
                            command = command.kind(),
                            "registry rejected the session; re-authenticating once"
                        );
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn ensure_session(&self, session: &mut Session) -> Result<(), RegistryError> {
        if !session.transport.is_connected() {
            session
                .transport
                .connect()
                .await
                .map_err(transport_failure)?;
            session.authenticated = false;
        }
        if session.authenticated {
            return Ok(());
        }

        let request = Request {
            transaction_id: Uuid::new_v4().to_string(),
            command: Command::Login {
                client_id: self.client_id.clone(),
                password: self.password.clone(),
            },
        };
        let response = timeout(self.command_timeout, session.transport.exchange(&request))
            .await
            .map_err(|_| RegistryError::Transient {
                detail: "login timed out".to_string(),
            })?
            .map_err(transport_failure)?;

        if !response.is_success() {
            return Err(RegistryError::from_response_code(
                response.code,
                &response.message,
                &self.client_id,
            ));
        }
        session.authenticated = true;
        tracing::info!(client_id = %self.client_id, "registry session established");
        Ok(())
    }

    /// Session keepalive. Returns the registry's server identifier.
    pub async fn keepalive(&self) -> Result<String, RegistryError> {
        let response = self.run(Command::Keepalive).await?;
        match response.data {
            Some(ResponseData::Greeting { server_id }) => Ok(server_id),
            _ => Ok(String::new()),
        }
    }

    /// Log out and drop the connection. Used by graceful shutdown.
    pub async fn logout(&self) -> Result<(), RegistryError> {
        let mut session = self.session.lock().await;
        if session.transport.is_connected() && session.authenticated {
            let request = Request {
                transaction_id: Uuid::new_v4().to_string(),
                command: Command::Logout,
            };
            let _ = timeout(self.command_timeout, session.transport.exchange(&request)).await;
        }
        session.authenticated = false;
        session.transport.close().await.ok();
        Ok(())
    }

    /// Request a transfer action on a domain sponsored elsewhere.
    pub async fn transfer_domain(
        &self,
        name: &str,
        op: crate::registry::types::TransferOp,
    ) -> Result<String, RegistryError> {
        let response = self
            .run(Command::DomainTransfer {
                name: name.to_string(),
                op,
            })
            .await?;
        match response.data {
            Some(ResponseData::Transfer { status, .. }) => Ok(status),
            _ => Err(missing_payload("domain-transfer")),
        }
    }
}

fn transport_failure(err: TransportError) -> RegistryError {
    RegistryError::Transient {
        detail: err.to_string(),
    }
}

fn missing_payload(command: &str) -> RegistryError {
    RegistryError::Transient {
        detail: format!("registry answered {command} without the expected payload"),
    }
}

#[async_trait]
impl RegistryOps for RegistryClient {
    async fn check_domain(&self, name: &str) -> Result<CheckResult, RegistryError> {
        if let Some(cached) = self.check_cache.get(name).await {
            tracing::debug!(domain = name, "availability served from cache");
            return Ok(cached);
        }
        let response = self
            .run(Command::DomainCheck {
                name: name.to_string(),
            })
            .await?;
        match response.data {
            Some(ResponseData::Check {
                name,
                available,
                reason,
            }) => {
                let result = CheckResult {
                    name: name.clone(),
                    available,
                    reason,
                };
                self.check_cache.insert(name, result.clone()).await;
                Ok(result)
            }
            _ => Err(missing_payload("domain-check")),
        }
    }

    async fn create_domain(
        &self,
        name: &str,
        period_years: u8,
        registrant_id: &str,
        contacts: Vec<crate::registry::types::ContactAssignment>,
        nameservers: Vec<String>,
    ) -> Result<CreatedDomain, RegistryError> {
        let response = self
            .run(Command::DomainCreate {
                name: name.to_string(),
                period_years,
                registrant_id: registrant_id.to_string(),
                contacts,
                nameservers,
                auth_info: Uuid::new_v4().to_string(),
            })
            .await?;
        match response.data {
            Some(ResponseData::DomainCreated {
                registry_id,
                expiration_date,
                ..
            }) => Ok(CreatedDomain {
                registry_id,
                expiration_date,
            }),
            _ => Err(missing_payload("domain-create")),
        }
    }

    async fn domain_info(&self, name: &str) -> Result<DomainRecord, RegistryError> {
        let response = self
            .run(Command::DomainInfo {
                name: name.to_string(),
            })
            .await?;
        match response.data {
            Some(ResponseData::Domain(record)) => Ok(record),
            _ => Err(missing_payload("domain-info")),
        }
    }

    async fn update_domain(
        &self,
        name: &str,
        update: DomainUpdateSpec,
    ) -> Result<(), RegistryError> {
        if update.is_empty() {
            return Ok(());
        }
        self.run(Command::DomainUpdate {
            name: name.to_string(),
            add_nameservers: update.add_nameservers,
            remove_nameservers: update.remove_nameservers,
            add_statuses: update.add_statuses,
            remove_statuses: update.remove_statuses,
            ds_data: update.ds_data,
        })
        .await?;
        Ok(())
    }

    async fn renew_domain(
        &self,
        name: &str,
        current_expiration: DateTime<Utc>,
        period_years: u8,
    ) -> Result<DateTime<Utc>, RegistryError> {
        let response = self
            .run(Command::DomainRenew {
                name: name.to_string(),
                current_expiration,
                period_years,
            })
            .await?;
        match response.data {
            Some(ResponseData::Renewed {
                expiration_date, ..
            }) => Ok(expiration_date),
            _ => Err(missing_payload("domain-renew")),
        }
    }

    async fn delete_domain(&self, name: &str) -> Result<(), RegistryError> {
        self.run(Command::DomainDelete {
            name: name.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn create_host(&self, name: &str, addresses: Vec<IpAddr>) -> Result<(), RegistryError> {
        self.run(Command::HostCreate {
            name: name.to_string(),
            addresses,
        })
        .await?;
        Ok(())
    }

    async fn update_host(
        &self,
        name: &str,
        add_addresses: Vec<IpAddr>,
        remove_addresses: Vec<IpAddr>,
    ) -> Result<(), RegistryError> {
        self.run(Command::HostUpdate {
            name: name.to_string(),
            add_addresses,
            remove_addresses,
        })
        .await?;
        Ok(())
    }

    async fn delete_host(&self, name: &str) -> Result<(), RegistryError> {
        self.run(Command::HostDelete {
            name: name.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn create_contact(&self, contact: ContactData) -> Result<(), RegistryError> {
        self.run(Command::ContactCreate(contact)).await?;
        Ok(())
    }

    async fn update_contact(&self, contact: ContactData) -> Result<(), RegistryError> {
        self.run(Command::ContactUpdate(contact)).await?;
        Ok(())
    }

    async fn delete_contact(&self, id: &str) -> Result<(), RegistryError> {
        self.run(Command::ContactDelete { id: id.to_string() })
            .await?;
        Ok(())
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistrarConfig;
    use crate::registry::mock::{FakeRegistry, InjectedFailure};

    fn test_client() -> (RegistryClient, crate::registry::mock::FakeRegistryHandle) {
        let mut config = RegistrarConfig::default().registry;
        config.password = Some("secret".to_string());
        config.command_timeout_seconds = 1;
        let (transport, handle) = FakeRegistry::new(&config.client_id, "secret");
        let client = RegistryClient::new(&config, Box::new(transport)).unwrap();
        (client, handle)
    }

    #[tokio::test]
    async fn login_happens_lazily_before_the_first_command() {
        let (client, handle) = test_client();
        let result = client.check_domain("city.gov").await.unwrap();
        assert!(result.available);
        assert_eq!(handle.login_count(), 1);
        assert_eq!(handle.command_kinds(), vec!["login", "domain-check"]);
    }

    #[tokio::test]
    async fn dropped_connections_are_reestablished_once() {
        let (client, handle) = test_client();
        // Prime the session.
        client.check_domain("warmup.gov").await.unwrap();
        handle.inject_failure(InjectedFailure::Io);

        let info = client.domain_info("city.gov").await;
        // The command was resent on a fresh session; city.gov does not
        // exist, so the *protocol* answer comes back, not a transport error.
        assert_eq!(
            info.unwrap_err(),
            RegistryError::ObjectNotFound {
                object_id: "city.gov".to_string()
            }
        );
        assert_eq!(handle.login_count(), 2);
    }

    #[tokio::test]
    async fn rejected_sessions_reauthenticate_exactly_once() {
        let (client, handle) = test_client();
        client.check_domain("warmup.gov").await.unwrap();

        // The registry invalidates the session server-side; next command is
        // answered with an auth failure, then succeeds after re-login.
        handle.inject_failure(InjectedFailure::Code(
            2200,
            "session expired".to_string(),
        ));
        let result = client.check_domain("city.gov").await;
        assert!(result.is_ok());
        assert_eq!(handle.login_count(), 2);
    }

    #[tokio::test]
    async fn persistent_auth_failures_escalate() {
        let mut config = RegistrarConfig::default().registry;
        config.password = Some("wrong".to_string());
        config.command_timeout_seconds = 1;
        let (transport, handle) = FakeRegistry::new(&config.client_id, "secret");
        let client = RegistryClient::new(&config, Box::new(transport)).unwrap();

        let err = client.check_domain("city.gov").await.unwrap_err();
        assert!(matches!(err, RegistryError::AuthenticationFailed { .. }));
        assert_eq!(handle.login_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_commands_discard_the_session() {
        let (client, handle) = test_client();
        client.check_domain("warmup.gov").await.unwrap();

        handle.inject_failure(InjectedFailure::Hang);
        let err = client.domain_info("city.gov").await.unwrap_err();
        assert!(matches!(err, RegistryError::Transient { .. }));

        // The next command re-establishes the session from scratch.
        let result = client.check_domain("after.gov").await;
        assert!(result.is_ok());
        assert_eq!(handle.login_count(), 2);
    }

    #[tokio::test]
    async fn keepalive_and_logout_manage_the_session() {
        let (client, handle) = test_client();
        let server_id = client.keepalive().await.unwrap();
        assert_eq!(server_id, "fake-registry");

        client.logout().await.unwrap();
        // The next command transparently starts a new session.
        client.check_domain("city.gov").await.unwrap();
        assert_eq!(handle.login_count(), 2);
    }

    #[tokio::test]
    async fn transfer_reports_the_registry_status() {
        use crate::registry::types::{DomainRecord, TransferOp};
        use chrono::Utc;

        let (client, handle) = test_client();
        handle.seed_domain(DomainRecord {
            name: "city.gov".to_string(),
            registry_id: "D1-GOV".to_string(),
            sponsor_client_id: "elsewhere".to_string(),
            statuses: vec![],
            nameservers: vec![],
            created_date: Utc::now(),
            expiration_date: Utc::now(),
        });

        let status = client
            .transfer_domain("city.gov", TransferOp::Request)
            .await
            .unwrap();
        assert_eq!(status, "pending");
    }

    #[tokio::test]
    async fn check_results_are_cached() {
        let (client, handle) = test_client();
        client.check_domain("city.gov").await.unwrap();
        client.check_domain("city.gov").await.unwrap();
        let kinds = handle.command_kinds();
        let checks = kinds.iter().filter(|k| **k == "domain-check").count();
        assert_eq!(checks, 1);
    }
}
