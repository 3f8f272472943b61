//! Error taxonomy for shard provisioning, bootstrap, and log I/O.
//!
//! Raw server error codes never leave the store adapter; everything above
//! the [`LogStore`](crate::store::LogStore) boundary works in terms of
//! these classified variants.

use thiserror::Error;

/// Classified failure conditions for daylog operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The namespace/user/role already exists. Idempotent operations treat
    /// this as success; it only surfaces when the caller did not expect it.
    #[error("already exists: {0}")]
    Conflict(String),

    /// A name collision with an incompatible existing object, e.g. a shard
    /// name occupied by a non-time-series collection.
    #[error("schema conflict on {namespace}: {reason}")]
    SchemaConflict { namespace: String, reason: String },

    /// The server rejected the operation for lack of privileges. Never
    /// retried.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The target shard (or replica set state) does not exist. For writes
    /// and queries this indicates a provisioning gap, distinct from an
    /// empty result.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connectivity loss or another failure worth retrying with a bounded
    /// budget.
    #[error("transient infrastructure failure: {0}")]
    Transient(String),

    /// A bounded retry budget was exhausted.
    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    /// BSON (de)serialization failure on a log record.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any other genuine store failure, propagated unmodified.
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// True for the conditions idempotent provisioning treats as success.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
