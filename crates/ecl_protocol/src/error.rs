//! Error types for the changelog protocol types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing or encoding protocol values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A CSN string is not 28 hex digits.
    #[error("invalid CSN '{value}': {reason}")]
    InvalidCsn {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A distinguished name could not be parsed.
    #[error("invalid DN '{value}': {reason}")]
    InvalidDn {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A search filter could not be parsed.
    #[error("invalid filter '{value}': {reason}")]
    InvalidFilter {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A cookie string could not be parsed.
    #[error("invalid cookie '{value}': {reason}")]
    InvalidCookie {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// CBOR encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ProtocolError {
    /// Creates an invalid CSN error.
    pub fn invalid_csn(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCsn {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid DN error.
    pub fn invalid_dn(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDn {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid filter error.
    pub fn invalid_filter(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid cookie error.
    pub fn invalid_cookie(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCookie {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
