//! Registry protocol client: session-oriented command layer, typed wire
//! model, closed error taxonomy, and backoff computation.

pub mod client;
pub mod errors;
pub mod mock;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::{CheckResult, CreatedDomain, DomainUpdateSpec, RegistryClient, RegistryOps};
pub use errors::RegistryError;
pub use transport::{RegistryTransport, TlsTransport, TransportError};
