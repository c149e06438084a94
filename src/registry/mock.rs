//! An in-process fake registry for tests. It keeps real object state
//! (domains, hosts, contacts) behind the transport seam so callers exercise
//! the full client/session path, and it supports failure injection for
//! transient/auth/policy scenarios.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::domain::model::DsRecord;
use crate::registry::transport::{RegistryTransport, TransportError};
use crate::registry::types::{
    Command, ContactRecord, DomainRecord, HostRecord, ObjectStatus, Request, Response,
    ResponseData, CODE_COMPLETED, CODE_COMPLETED_ENDING_SESSION,
};

/// A failure applied to the next command, in injection order.
#[derive(Debug, Clone)]
pub enum InjectedFailure {
    /// Connection-level failure: the exchange errors and drops the stream.
    Io,
    /// Protocol-level failure with a specific result code.
    Code(u16, String),
    /// The command never completes; the caller's timeout fires.
    Hang,
    /// The command completes normally after a delay (milliseconds).
    Delay(u64),
}

#[derive(Debug, Default)]
pub struct FakeRegistryState {
    pub client_id: String,
    pub password: String,
    pub logged_in: bool,
    pub domains: HashMap<String, DomainRecord>,
    pub ds_data: HashMap<String, Vec<DsRecord>>,
    pub hosts: HashMap<String, HostRecord>,
    pub contacts: HashMap<String, ContactRecord>,
    pub command_log: Vec<Command>,
    pub domain_create_count: HashMap<String, u32>,
    pub login_count: u32,
    failures: VecDeque<InjectedFailure>,
    keyed_failures: HashMap<&'static str, VecDeque<InjectedFailure>>,
    connect_failures: u32,
}

/// Test-side handle onto the fake registry's shared state.
#[derive(Debug, Clone)]
pub struct FakeRegistryHandle {
    state: Arc<Mutex<FakeRegistryState>>,
}

impl FakeRegistryHandle {
    pub fn inject_failure(&self, failure: InjectedFailure) {
        self.state.lock().unwrap().failures.push_back(failure);
    }

    /// Apply a failure to the next command of the given kind (e.g.
    /// "domain-create"), letting unrelated commands through untouched.
    pub fn inject_failure_for(&self, kind: &'static str, failure: InjectedFailure) {
        self.state
            .lock()
            .unwrap()
            .keyed_failures
            .entry(kind)
            .or_default()
            .push_back(failure);
    }

    /// Drop a domain record, simulating registry-side removal.
    pub fn remove_domain(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.domains.remove(name);
        state.ds_data.remove(name);
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().unwrap().connect_failures = count;
    }

    pub fn domain(&self, name: &str) -> Option<DomainRecord> {
        self.state.lock().unwrap().domains.get(name).cloned()
    }

    pub fn ds_data(&self, name: &str) -> Vec<DsRecord> {
        self.state
            .lock()
            .unwrap()
            .ds_data
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contact_count(&self) -> usize {
        self.state.lock().unwrap().contacts.len()
    }

    pub fn domain_create_count(&self, name: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .domain_create_count
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn login_count(&self) -> u32 {
        self.state.lock().unwrap().login_count
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().unwrap().command_log.clone()
    }

    pub fn command_kinds(&self) -> Vec<&'static str> {
        self.state
            .lock()
            .unwrap()
            .command_log
            .iter()
            .map(|c| c.kind())
            .collect()
    }

    /// Seed a domain record directly, e.g. one sponsored by another
    /// registrar for conflict scenarios.
    pub fn seed_domain(&self, record: DomainRecord) {
        self.state
            .lock()
            .unwrap()
            .domains
            .insert(record.name.clone(), record);
    }
}

/// Transport implementation backed by the fake state.
#[derive(Debug)]
pub struct FakeRegistry {
    state: Arc<Mutex<FakeRegistryState>>,
    connected: bool,
}

impl FakeRegistry {
    pub fn new(client_id: &str, password: &str) -> (Self, FakeRegistryHandle) {
        let state = Arc::new(Mutex::new(FakeRegistryState {
            client_id: client_id.to_string(),
            password: password.to_string(),
            ..Default::default()
        }));
        (
            Self {
                state: state.clone(),
                connected: false,
            },
            FakeRegistryHandle { state },
        )
    }

    fn respond(
        transaction_id: &str,
        code: u16,
        message: &str,
        data: Option<ResponseData>,
    ) -> Response {
        Response {
            code,
            message: message.to_string(),
            transaction_id: transaction_id.to_string(),
            data,
        }
    }

    fn apply(state: &mut FakeRegistryState, request: &Request) -> Response {
        let txid = &request.transaction_id;
        let command = &request.command;
        state.command_log.push(command.clone());

        // Session commands are always admissible.
        match command {
            Command::Login {
                client_id,
                password,
            } => {
                state.login_count += 1;
                if *client_id == state.client_id && *password == state.password {
                    state.logged_in = true;
                    return Self::respond(txid, CODE_COMPLETED, "command completed", None);
                }
                return Self::respond(txid, 2200, "authentication error", None);
            }
            Command::Logout => {
                state.logged_in = false;
                return Self::respond(
                    txid,
                    CODE_COMPLETED_ENDING_SESSION,
                    "command completed; ending session",
                    None,
                );
            }
            Command::Keepalive => {
                return Self::respond(
                    txid,
                    CODE_COMPLETED,
                    "greeting",
                    Some(ResponseData::Greeting {
                        server_id: "fake-registry".to_string(),
                    }),
                );
            }
            _ => {}
        }

        if !state.logged_in {
            return Self::respond(txid, 2200, "command issued outside authenticated session", None);
        }

        match command {
            Command::DomainCheck { name } => {
                let taken = state.domains.contains_key(name);
                Self::respond(
                    txid,
                    CODE_COMPLETED,
                    "command completed",
                    Some(ResponseData::Check {
                        name: name.clone(),
                        available: !taken,
                        reason: taken.then(|| "object exists".to_string()),
                    }),
                )
            }
            Command::DomainCreate {
                name,
                period_years,
                registrant_id,
                contacts,
                nameservers,
                ..
            } => {
                *state.domain_create_count.entry(name.clone()).or_insert(0) += 1;
                if state.domains.contains_key(name) {
                    return Self::respond(txid, 2302, "object exists", None);
                }
                if !state.contacts.contains_key(registrant_id) {
                    return Self::respond(txid, 2303, "registrant does not exist", None);
                }
                for assignment in contacts {
                    if !state.contacts.contains_key(&assignment.id) {
                        return Self::respond(txid, 2303, "contact does not exist", None);
                    }
                }
                let now = Utc::now();
                let expiration = now + Duration::days(365 * i64::from(*period_years));
                let record = DomainRecord {
                    name: name.clone(),
                    registry_id: format!("D{}-GOV", state.domains.len() + 1),
                    sponsor_client_id: state.client_id.clone(),
                    statuses: if nameservers.is_empty() {
                        vec![ObjectStatus::Inactive]
                    } else {
                        vec![ObjectStatus::Ok]
                    },
                    nameservers: nameservers.clone(),
                    created_date: now,
                    expiration_date: expiration,
                };
                let data = ResponseData::DomainCreated {
                    name: name.clone(),
                    registry_id: record.registry_id.clone(),
                    expiration_date: expiration,
                };
                state.domains.insert(name.clone(), record);
                Self::respond(txid, CODE_COMPLETED, "command completed", Some(data))
            }
            Command::DomainInfo { name } => match state.domains.get(name) {
                Some(record) => Self::respond(
                    txid,
                    CODE_COMPLETED,
                    "command completed",
                    Some(ResponseData::Domain(record.clone())),
                ),
                None => Self::respond(txid, 2303, "object does not exist", None),
            },
            Command::DomainUpdate {
                name,
                add_nameservers,
                remove_nameservers,
                add_statuses,
                remove_statuses,
                ds_data,
            } => {
                // Subordinate hosts must exist as host objects before they
                // can be delegated to.
                for ns in add_nameservers {
                    if ns.ends_with(&format!(".{name}")) && !state.hosts.contains_key(ns) {
                        return Self::respond(txid, 2303, "host object does not exist", None);
                    }
                }
                let Some(record) = state.domains.get_mut(name) else {
                    return Self::respond(txid, 2303, "object does not exist", None);
                };
                for ns in add_nameservers {
                    if record.nameservers.contains(ns) {
                        return Self::respond(txid, 2306, "object already linked", None);
                    }
                }
                record
                    .nameservers
                    .retain(|ns| !remove_nameservers.contains(ns));
                record.nameservers.extend(add_nameservers.iter().cloned());
                for status in remove_statuses {
                    record.statuses.retain(|s| s != status);
                }
                for status in add_statuses {
                    if !record.statuses.contains(status) {
                        record.statuses.push(*status);
                    }
                }
                if let Some(ds) = ds_data {
                    state.ds_data.insert(name.clone(), ds.clone());
                }
                Self::respond(txid, CODE_COMPLETED, "command completed", None)
            }
            Command::DomainRenew {
                name,
                current_expiration,
                period_years,
            } => {
                let Some(record) = state.domains.get_mut(name) else {
                    return Self::respond(txid, 2303, "object does not exist", None);
                };
                if record.expiration_date.date_naive() != current_expiration.date_naive() {
                    return Self::respond(txid, 2306, "current expiration date mismatch", None);
                }
                record.expiration_date =
                    record.expiration_date + Duration::days(365 * i64::from(*period_years));
                let data = ResponseData::Renewed {
                    name: name.clone(),
                    expiration_date: record.expiration_date,
                };
                Self::respond(txid, CODE_COMPLETED, "command completed", Some(data))
            }
            Command::DomainDelete { name } => {
                if state.domains.remove(name).is_some() {
                    state.ds_data.remove(name);
                    Self::respond(txid, CODE_COMPLETED, "command completed", None)
                } else {
                    Self::respond(txid, 2303, "object does not exist", None)
                }
            }
            Command::DomainTransfer { name, .. } => match state.domains.get(name) {
                Some(_) => Self::respond(
                    txid,
                    CODE_COMPLETED,
                    "command completed",
                    Some(ResponseData::Transfer {
                        name: name.clone(),
                        status: "pending".to_string(),
                    }),
                ),
                None => Self::respond(txid, 2303, "object does not exist", None),
            },
            Command::HostCreate { name, addresses } => {
                if state.hosts.contains_key(name) {
                    return Self::respond(txid, 2302, "object exists", None);
                }
                state.hosts.insert(
                    name.clone(),
                    HostRecord {
                        name: name.clone(),
                        addresses: addresses.clone(),
                        sponsor_client_id: state.client_id.clone(),
                    },
                );
                Self::respond(txid, CODE_COMPLETED, "command completed", None)
            }
            Command::HostUpdate {
                name,
                add_addresses,
                remove_addresses,
            } => {
                let Some(host) = state.hosts.get_mut(name) else {
                    return Self::respond(txid, 2303, "object does not exist", None);
                };
                host.addresses.retain(|a| !remove_addresses.contains(a));
                host.addresses.extend(add_addresses.iter().copied());
                Self::respond(txid, CODE_COMPLETED, "command completed", None)
            }
            Command::HostDelete { name } => {
                if state.hosts.remove(name).is_some() {
                    Self::respond(txid, CODE_COMPLETED, "command completed", None)
                } else {
                    Self::respond(txid, 2303, "object does not exist", None)
                }
            }
            Command::ContactCreate(contact) => {
                if state.contacts.contains_key(&contact.id) {
                    return Self::respond(txid, 2302, "object exists", None);
                }
                state.contacts.insert(
                    contact.id.clone(),
                    ContactRecord {
                        id: contact.id.clone(),
                        sponsor_client_id: state.client_id.clone(),
                    },
                );
                Self::respond(txid, CODE_COMPLETED, "command completed", None)
            }
            Command::ContactUpdate(contact) => {
                if state.contacts.contains_key(&contact.id) {
                    Self::respond(txid, CODE_COMPLETED, "command completed", None)
                } else {
                    Self::respond(txid, 2303, "object does not exist", None)
                }
            }
            Command::ContactDelete { id } => {
                if state.contacts.remove(id).is_some() {
                    Self::respond(txid, CODE_COMPLETED, "command completed", None)
                } else {
                    Self::respond(txid, 2303, "object does not exist", None)
                }
            }
            Command::Login { .. } | Command::Logout | Command::Keepalive => unreachable!(),
        }
    }
}

#[async_trait]
impl RegistryTransport for FakeRegistry {
    async fn connect(&mut self) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "injected connect failure",
                )));
            }
            // A fresh connection is a fresh session.
            state.logged_in = false;
        }
        self.connected = true;
        Ok(())
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let injected = {
            let mut state = self.state.lock().unwrap();
            let keyed = state
                .keyed_failures
                .get_mut(request.command.kind())
                .and_then(VecDeque::pop_front);
            let next = keyed.or_else(|| state.failures.pop_front());
            match next {
                Some(InjectedFailure::Io) => {
                    state.command_log.push(request.command.clone());
                    self.connected = false;
                    return Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "injected I/O failure",
                    )));
                }
                Some(InjectedFailure::Code(code, message)) => {
                    state.command_log.push(request.command.clone());
                    return Ok(Self::respond(
                        &request.transaction_id,
                        code,
                        &message,
                        None,
                    ));
                }
                Some(failure @ (InjectedFailure::Hang | InjectedFailure::Delay(_))) => {
                    Some(failure)
                }
                None => None,
            }
        };
        match injected {
            Some(InjectedFailure::Hang) => {
                self.state
                    .lock()
                    .unwrap()
                    .command_log
                    .push(request.command.clone());
                // Never completes; the caller's timeout fires.
                std::future::pending::<()>().await;
            }
            Some(InjectedFailure::Delay(millis)) => {
                tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
            }
            _ => {}
        }

        let mut state = self.state.lock().unwrap();
        Ok(Self::apply(&mut state, request))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
