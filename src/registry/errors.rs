use thiserror::Error;

/// Closed failure taxonomy for registry commands. Callers branch on these
/// variants, never on response text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Network, timeout, or rate-limit failure. Safe to retry with backoff.
    #[error("transient registry failure: {detail}")]
    Transient { detail: String },

    /// The object already exists at the registry. Whether this is idempotent
    /// success or a conflict depends on sponsorship, decided by the caller
    /// via a follow-up info.
    #[error("object already exists: {object_id}")]
    ObjectExists { object_id: String },

    /// The registry has no such object.
    #[error("object not found: {object_id}")]
    ObjectNotFound { object_id: String },

    /// Login or session credentials were rejected.
    #[error("registry authentication failed: {detail}")]
    AuthenticationFailed { detail: String },

    /// Permanent business-rule rejection. Never retried automatically.
    #[error("registry policy violation: {message}")]
    PolicyViolation { message: String },

    /// The registry reported itself unable to serve (session limits,
    /// maintenance). Retryable, but with longer backoff than Transient.
    #[error("registry unavailable: {detail}")]
    Unavailable { detail: String },
}

impl RegistryError {
    /// Map a protocol result code onto the taxonomy. Codes follow the
    /// provisioning-protocol convention: 1xxx success, 2xxx failure.
    /// Success codes must be handled before calling this.
    pub fn from_response_code(code: u16, message: &str, object_id: &str) -> Self {
        match code {
            2200 | 2201 | 2501 => RegistryError::AuthenticationFailed {
                detail: message.to_string(),
            },
            2302 => RegistryError::ObjectExists {
                object_id: object_id.to_string(),
            },
            2303 => RegistryError::ObjectNotFound {
                object_id: object_id.to_string(),
            },
            2400 | 2500 => RegistryError::Transient {
                detail: format!("registry command failed ({code}): {message}"),
            },
            2502 => RegistryError::Unavailable {
                detail: format!("session limit exceeded: {message}"),
            },
            _ => RegistryError::PolicyViolation {
                message: format!("{message} ({code})"),
            },
        }
    }

    /// Whether a fresh attempt of the same command may succeed without
    /// operator involvement.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::Transient { .. } | RegistryError::Unavailable { .. }
        )
    }
}
