use thiserror::Error;
use uuid::Uuid;

use crate::domain::model::DomainState;
use crate::registry::errors::RegistryError;

/// Errors surfaced by lifecycle operations (domain state machine, approval
/// workflow, reconciliation). Callers branch on the variant, never on the
/// rendered message.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Caller-supplied data violates a local invariant. Never reaches the
    /// registry.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested operation is not legal from the domain's current state.
    #[error("operation '{operation}' is not valid from state {from}")]
    InvalidTransition {
        operation: &'static str,
        from: DomainState,
    },

    /// Network/timeout/rate-limit failure talking to the registry. Local
    /// state is unchanged; the reconciliation scheduler will retry.
    #[error("registry temporarily unavailable: {detail}")]
    RegistryTransient { detail: String },

    /// The remote object exists under a different sponsoring client. Never
    /// auto-resolved; an operator must intervene.
    #[error("registry conflict on {domain} (support reference {reference})")]
    RegistryConflict { domain: String, reference: Uuid },

    /// Permanent remote business-rule rejection, surfaced verbatim.
    #[error("registry rejected the operation: {message}")]
    RegistryPolicy { message: String },

    /// Session/credential failure that survived one re-authentication
    /// attempt. Fatal until an operator rotates credentials.
    #[error("registry authentication failed (support reference {reference})")]
    RegistryAuth { reference: Uuid },

    /// Another operation holds this domain's lock. Retry the whole operation
    /// later.
    #[error("domain {domain} is busy with another operation")]
    Concurrency { domain: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Local system-of-record failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("domain {0} not found")]
    DomainNotFound(String),
    #[error("request {0} not found")]
    RequestNotFound(Uuid),
    #[error("domain {0} already exists")]
    DomainExists(String),
}

impl LifecycleError {
    /// Map a typed registry failure onto the lifecycle taxonomy. Conflict
    /// and not-found handling is context-dependent, so `OBJECT_EXISTS` and
    /// `OBJECT_NOT_FOUND` must be intercepted by the caller before reaching
    /// this fallback.
    pub fn from_registry(domain: &str, err: RegistryError) -> Self {
        match err {
            RegistryError::Transient { detail } => LifecycleError::RegistryTransient { detail },
            RegistryError::Unavailable { detail } => LifecycleError::RegistryTransient { detail },
            RegistryError::PolicyViolation { message } => LifecycleError::RegistryPolicy { message },
            RegistryError::AuthenticationFailed { detail } => {
                let reference = Uuid::new_v4();
                tracing::error!(
                    domain = %domain,
                    reference = %reference,
                    detail = %detail,
                    "registry authentication failed after re-authentication attempt; operator action required"
                );
                LifecycleError::RegistryAuth { reference }
            }
            RegistryError::ObjectExists { object_id } => {
                let reference = Uuid::new_v4();
                tracing::error!(
                    domain = %domain,
                    object_id = %object_id,
                    reference = %reference,
                    "unexpected object-exists from registry; treating as conflict"
                );
                LifecycleError::RegistryConflict {
                    domain: domain.to_string(),
                    reference,
                }
            }
            RegistryError::ObjectNotFound { object_id } => LifecycleError::Validation(format!(
                "registry has no object named {object_id}"
            )),
        }
    }

    /// Operator-facing message. Transient failures read as "try again";
    /// conflict/auth failures hide detail behind an opaque reference.
    pub fn user_message(&self) -> String {
        match self {
            LifecycleError::Validation(msg) => msg.clone(),
            LifecycleError::InvalidTransition { operation, from } => {
                format!("cannot {operation} a domain that is {from}")
            }
            LifecycleError::RegistryTransient { .. } => {
                "the registry is temporarily unavailable; try again shortly".to_string()
            }
            LifecycleError::RegistryConflict { reference, .. }
            | LifecycleError::RegistryAuth { reference } => {
                format!("contact support and quote reference {reference}")
            }
            LifecycleError::RegistryPolicy { message } => message.clone(),
            LifecycleError::Concurrency { .. } => {
                "another change to this domain is in progress; try again shortly".to_string()
            }
            LifecycleError::Store(err) => err.to_string(),
        }
    }

    /// Whether the reconciliation scheduler should re-drive the failed
    /// operation automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LifecycleError::RegistryTransient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_registry_errors_are_retryable() {
        let err = LifecycleError::from_registry(
            "city.gov",
            RegistryError::Transient {
                detail: "connection reset".to_string(),
            },
        );
        assert!(err.is_retryable());
        assert!(err.user_message().contains("try again"));
    }

    #[test]
    fn policy_errors_surface_the_registry_message() {
        let err = LifecycleError::from_registry(
            "city.gov",
            RegistryError::PolicyViolation {
                message: "registrant contact rejected".to_string(),
            },
        );
        assert!(!err.is_retryable());
        assert_eq!(err.user_message(), "registrant contact rejected");
    }

    #[test]
    fn auth_errors_hide_detail_behind_a_reference() {
        let err = LifecycleError::from_registry(
            "city.gov",
            RegistryError::AuthenticationFailed {
                detail: "bad certificate".to_string(),
            },
        );
        let msg = err.user_message();
        assert!(msg.contains("contact support"));
        assert!(!msg.contains("certificate"));
    }
}
