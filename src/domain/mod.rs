//! Domain lifecycle: the local model, its system of record, per-domain
//! advisory locks, and the state machine that drives the registry.

pub mod locks;
pub mod model;
pub mod state_machine;
pub mod store;

pub use locks::{DomainGuard, DomainLocks};
pub use model::{
    ContactRole, Domain, DomainName, DomainState, DsRecord, Host, HostSpec, PendingOperation,
    PublicContact, SyncState, TransitionRecord,
};
pub use state_machine::{transition_allowed, DomainStateMachine, RefreshOutcome};
pub use store::{DomainStore, MemoryDomainStore};
