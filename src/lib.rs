// Registrar Core - .gov domain lifecycle engine
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod reconcile;
pub mod registry;
pub mod request;
pub mod shutdown;
pub mod sync;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{RegistrarConfig, RetryConfig};
pub use domain::{
    Domain, DomainName, DomainState, DomainStateMachine, DomainStore, MemoryDomainStore,
};
pub use errors::{LifecycleError, StoreError};
pub use events::{EventEmitter, LifecycleEvent};
pub use reconcile::{PassReport, ReconciliationScheduler};
pub use registry::{
    CheckResult, RegistryClient, RegistryError, RegistryOps, RegistryTransport, TlsTransport,
};
pub use request::{DomainRequest, RequestState, RequestStore, RequestWorkflow};
pub use shutdown::ShutdownCoordinator;
pub use telemetry::{
    create_lifecycle_span, generate_correlation_id, init_telemetry, shutdown_telemetry,
};
