use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use crate::errors::LifecycleError;

/// Per-domain advisory locks. Foreground operations and the reconciliation
/// scheduler both try-acquire; contention is reported, never waited on, so
/// two transitions can never interleave on one domain.
#[derive(Debug, Default)]
pub struct DomainLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Holding this guard is holding the domain.
#[derive(Debug)]
pub struct DomainGuard {
    _guard: OwnedMutexGuard<()>,
}

impl DomainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, domain: &str) -> Result<DomainGuard, LifecycleError> {
        let lock = {
            let mut inner = self.inner.lock().expect("domain lock table poisoned");
            inner
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        match lock.try_lock_owned() {
            Ok(guard) => Ok(DomainGuard { _guard: guard }),
            Err(_) => Err(LifecycleError::Concurrency {
                domain: domain.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_while_held() {
        let locks = DomainLocks::new();
        let guard = locks.try_acquire("city.gov").unwrap();
        let err = locks.try_acquire("city.gov").unwrap_err();
        assert!(matches!(err, LifecycleError::Concurrency { .. }));
        drop(guard);
        assert!(locks.try_acquire("city.gov").is_ok());
    }

    #[test]
    fn locks_are_per_domain() {
        let locks = DomainLocks::new();
        let _a = locks.try_acquire("a.gov").unwrap();
        assert!(locks.try_acquire("b.gov").is_ok());
    }
}
