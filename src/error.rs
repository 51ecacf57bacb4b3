//! Error types for the seams between the supervisor and its collaborators.
//!
//! None of these cross a component boundary as a fault: whoever sees one
//! logs it and applies the local remediation. The only error surfaced to
//! an operator is [`ConfigError`], when a submitted configuration is
//! rejected before anything is persisted.

use thiserror::Error;

/// Errors from the durable key-value store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing medium could not be read
    #[error("storage read failed: {0}")]
    ReadFailed(String),

    /// The backing medium could not be written or committed
    #[error("storage write failed: {0}")]
    WriteFailed(String),

    /// A key holds a value of a different kind than requested
    #[error("key '{key}' holds a {found}, expected a {expected}")]
    KindMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors from the message bus client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("connect timed out after {0}ms")]
    Timeout(u64),

    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("not connected")]
    NotConnected,

    #[error("subscribe to '{0}' failed")]
    SubscribeFailed(String),

    #[error("publish to '{0}' failed")]
    PublishFailed(String),
}

/// Errors from the wireless link
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("not associated")]
    NotAssociated,

    #[error("association timed out after {0}ms")]
    AssociationTimeout(u64),

    #[error("discovery advertisement failed: {0}")]
    AdvertiseFailed(String),
}

/// Reasons a submitted configuration is rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("broker port must be non-zero when the bus is enabled")]
    InvalidPort,

    #[error("{0} topic must not be empty when the bus is enabled")]
    EmptyTopic(&'static str),

    #[error("{which} topic '{topic}' must not contain wildcards")]
    WildcardTopic { which: &'static str, topic: String },

    #[error("{field} exceeds {max} bytes")]
    TooLong { field: &'static str, max: usize },

    #[error("command and state topics must differ, both are '{0}'")]
    SharedTopic(String),
}

/// Errors decoding or handling a control-surface request
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] serde_json::Error),

    #[error("request of {0} bytes exceeds the limit")]
    TooLarge(usize),

    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),
}
