//! Error types shared across the router.
//!
//! Structural errors (`RegistrationError`) are returned synchronously to the
//! registering module and never reach a client. Request-time errors
//! (`ServiceError`) are recovered by the dispatcher into a status code.

use thiserror::Error;

/// Errors raised by register/unregister calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Alias is malformed or already registered.
    #[error("alias conflict for `{alias}`: {reason}")]
    AliasConflict { alias: String, reason: &'static str },

    /// Unregister attempted by a registrant that does not own the alias.
    #[error("`{alias}` is not owned by module `{owner}`")]
    NotOwner { alias: String, owner: String },

    /// Filter path pattern is malformed.
    #[error("invalid filter pattern `{0}`")]
    InvalidFilterPattern(String),

    /// Handler or filter `init` hook failed.
    #[error("init failed for `{target}`: {message}")]
    InitFailed { target: String, message: String },
}

impl RegistrationError {
    pub(crate) fn conflict(alias: &str, reason: &'static str) -> Self {
        Self::AliasConflict {
            alias: alias.to_string(),
            reason,
        }
    }
}

/// Faults raised by a handler or filter while servicing a request.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Application-level fault with a message.
    #[error("{0}")]
    Fault(String),

    /// I/O failure while reading a resource or the request body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request body could not be collected.
    #[error("body error: {0}")]
    Body(#[from] axum::Error),

    /// Response could not be assembled.
    #[error("HTTP error: {0}")]
    Http(#[from] axum::http::Error),
}

impl ServiceError {
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }
}

/// Result type for handler and filter calls.
pub type ServiceResult<T = ()> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrationError::conflict("/a/", "trailing slash");
        assert_eq!(err.to_string(), "alias conflict for `/a/`: trailing slash");

        let err = RegistrationError::NotOwner {
            alias: "/a".into(),
            owner: "m2".into(),
        };
        assert_eq!(err.to_string(), "`/a` is not owned by module `m2`");

        let err = ServiceError::fault("boom");
        assert_eq!(err.to_string(), "boom");
    }
}
