//! Reconciliation/retry: periodic, bounded repair of divergence between the
//! local system of record and the registry.

pub mod scheduler;

pub use scheduler::{PassReport, ReconciliationScheduler};
