//! Record types shared by every collection.

use crate::error::{Error, Result};
use crate::{RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single business record (a quote, an invoice, a contact, ...).
///
/// The engine only interprets the identity and bookkeeping fields below;
/// every other field of the wire object lands in `payload` and is carried
/// through merges untouched.
///
/// Invariants: `id` never changes after creation, and `updated_at` is
/// monotonically non-decreasing for a given id within one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique identifier within the record's collection
    pub id: RecordId,
    /// When the record was last mutated (milliseconds since epoch)
    #[serde(default)]
    pub updated_at: Timestamp,
    /// Soft delete flag (tombstone)
    #[serde(default)]
    pub deleted: bool,
    /// When the record was tombstoned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    /// Entity-specific fields, opaque to the engine
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Record {
    /// Create a new active record.
    pub fn new(id: impl Into<RecordId>, updated_at: Timestamp, payload: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            updated_at,
            deleted: false,
            deleted_at: None,
            payload,
        }
    }

    /// Check if the record is active (not tombstoned).
    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    /// Mark the record as deleted (tombstone).
    ///
    /// Keeps `updated_at` monotonic even when the caller's clock lags the
    /// record's own timestamp.
    pub fn mark_deleted(&mut self, now: Timestamp) {
        self.deleted = true;
        self.deleted_at = Some(now);
        self.updated_at = self.updated_at.max(now);
    }

    /// Decode a record from a wire JSON object.
    ///
    /// A row without an `id` is rejected with [`Error::MissingId`] so the
    /// caller can skip it and keep going; any other shape problem is
    /// [`Error::MalformedRecord`].
    pub fn from_value(value: Value) -> Result<Self> {
        match value.get("id") {
            None | Some(Value::Null) => Err(Error::MissingId),
            Some(_) => {
                serde_json::from_value(value).map_err(|e| Error::MalformedRecord(e.to_string()))
            }
        }
    }
}
