//! Error types for the Satchel engine.

use crate::{CollectionName, RecordId};
use thiserror::Error;

/// All possible errors from the Satchel engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown collection: {0}")]
    UnknownCollection(CollectionName),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("record already deleted: {0}")]
    AlreadyDeleted(RecordId),

    #[error("record is missing an id")]
    MissingId,

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("invalid bundle: {0}")]
    InvalidBundle(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
