//! Request approval workflow: the human-review state machine that, on
//! approval, creates a Domain and its dependent objects locally.

pub mod model;
pub mod state_machine;
pub mod store;

pub use model::{DomainRequest, RejectionReason, RequestState, RequestedContact};
pub use state_machine::{request_transition_allowed, RequestWorkflow, LEGAL_REQUEST_TRANSITIONS};
pub use store::{MemoryRequestStore, RequestStore};
