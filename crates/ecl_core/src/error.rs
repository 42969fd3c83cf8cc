//! Error types for the changelog engine.

use ecl_protocol::ProtocolError;
use std::fmt;
use thiserror::Error;

/// Result type for changelog operations.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

/// LDAP result codes surfaced by the changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// 0
    Success,
    /// 1
    OperationsError,
    /// 2
    ProtocolError,
    /// 21
    InvalidAttributeSyntax,
    /// 32
    NoSuchObject,
    /// 50
    InsufficientAccessRights,
    /// 53
    UnwillingToPerform,
    /// 118
    Canceled,
}

impl ResultCode {
    /// Numeric value on the wire.
    pub fn code(self) -> u16 {
        match self {
            ResultCode::Success => 0,
            ResultCode::OperationsError => 1,
            ResultCode::ProtocolError => 2,
            ResultCode::InvalidAttributeSyntax => 21,
            ResultCode::NoSuchObject => 32,
            ResultCode::InsufficientAccessRights => 50,
            ResultCode::UnwillingToPerform => 53,
            ResultCode::Canceled => 118,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultCode::Success => "success",
            ResultCode::OperationsError => "operationsError",
            ResultCode::ProtocolError => "protocolError",
            ResultCode::InvalidAttributeSyntax => "invalidAttributeSyntax",
            ResultCode::NoSuchObject => "noSuchObject",
            ResultCode::InsufficientAccessRights => "insufficientAccessRights",
            ResultCode::UnwillingToPerform => "unwillingToPerform",
            ResultCode::Canceled => "canceled",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// Errors raised by changelog searches and the changelog write path.
#[derive(Debug, Error)]
pub enum ChangelogError {
    /// The client cookie names a domain the server has no history for, or
    /// an excluded domain.
    #[error("malformed cookie '{cookie}': {reason}")]
    MalformedCookie {
        /// The cookie as received.
        cookie: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The change-number index references a change the replica log cannot
    /// produce in order.
    #[error("changelog consistency violation: {message}")]
    ConsistencyViolation {
        /// Description of the inconsistency.
        message: String,
    },

    /// An assertion value has the wrong syntax for its attribute.
    #[error("invalid syntax for {attribute}: '{value}'")]
    InvalidAttributeSyntax {
        /// Attribute name.
        attribute: String,
        /// The rejected value.
        value: String,
    },

    /// The requester lacks the changelog-read privilege.
    #[error("insufficient access rights: {0}")]
    InsufficientAccess(String),

    /// The requested entry does not exist.
    #[error("no such object: {0}")]
    NoSuchObject(String),

    /// The changelog does not support the operation.
    #[error("unwilling to perform: {0}")]
    UnwillingToPerform(String),

    /// The operation was cancelled or abandoned.
    #[error("operation canceled")]
    Canceled,

    /// A protocol value could not be parsed or encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The underlying store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChangelogError {
    /// Creates a malformed cookie error.
    pub fn malformed_cookie(cookie: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCookie {
            cookie: cookie.into(),
            reason: reason.into(),
        }
    }

    /// Creates a consistency violation error.
    pub fn consistency_violation(message: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            message: message.into(),
        }
    }

    /// Creates an invalid attribute syntax error.
    pub fn invalid_attribute_syntax(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidAttributeSyntax {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// The LDAP result code reported to the client.
    pub fn result_code(&self) -> ResultCode {
        match self {
            ChangelogError::MalformedCookie { .. } => ResultCode::UnwillingToPerform,
            ChangelogError::ConsistencyViolation { .. } => ResultCode::OperationsError,
            ChangelogError::InvalidAttributeSyntax { .. } => ResultCode::InvalidAttributeSyntax,
            ChangelogError::InsufficientAccess(_) => ResultCode::InsufficientAccessRights,
            ChangelogError::NoSuchObject(_) => ResultCode::NoSuchObject,
            ChangelogError::UnwillingToPerform(_) => ResultCode::UnwillingToPerform,
            ChangelogError::Canceled => ResultCode::Canceled,
            ChangelogError::Protocol(_) => ResultCode::ProtocolError,
            ChangelogError::Storage(_) => ResultCode::OperationsError,
        }
    }

    /// Returns true if the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChangelogError::MalformedCookie { .. }
                | ChangelogError::InvalidAttributeSyntax { .. }
                | ChangelogError::InsufficientAccess(_)
                | ChangelogError::NoSuchObject(_)
                | ChangelogError::UnwillingToPerform(_)
                | ChangelogError::Protocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes() {
        assert_eq!(
            ChangelogError::malformed_cookie("x", "unknown domain").result_code(),
            ResultCode::UnwillingToPerform
        );
        assert_eq!(
            ChangelogError::consistency_violation("gone").result_code().code(),
            1
        );
        assert_eq!(
            ChangelogError::InsufficientAccess("no".into()).result_code().code(),
            50
        );
        assert_eq!(ResultCode::Canceled.to_string(), "canceled (118)");
    }

    #[test]
    fn error_classification() {
        assert!(ChangelogError::malformed_cookie("x", "y").is_client_error());
        assert!(ChangelogError::invalid_attribute_syntax("changeNumber", "abc").is_client_error());
        assert!(!ChangelogError::consistency_violation("z").is_client_error());
        assert!(!ChangelogError::storage("disk").is_client_error());
        assert!(!ChangelogError::Canceled.is_client_error());
    }

    #[test]
    fn protocol_errors_convert() {
        let err: ChangelogError = ProtocolError::invalid_csn("zz", "short").into();
        assert!(matches!(err, ChangelogError::Protocol(_)));
        assert!(err.to_string().contains("zz"));
    }
}
