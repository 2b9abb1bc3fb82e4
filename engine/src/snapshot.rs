//! Snapshot bundles - the unit of whole-store transfer.
//!
//! A [`Bundle`] aggregates every collection at one instant. It is the value
//! shipped to and from a remote that stores the data as a single opaque
//! file, and the read-side snapshot a sync pass merges against. Uses
//! `BTreeMap`s so serialization order is deterministic.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::{CollectionName, RecordId, Timestamp};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A point-in-time aggregate of all collections.
///
/// Immutable once built by the store; `created_at` is the greatest
/// `updated_at` the producing store had seen, which is what the
/// whole-snapshot direction decision compares.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// When the producing store last changed (milliseconds since epoch)
    pub created_at: Timestamp,
    /// All records organized by collection, then by record id
    pub collections: BTreeMap<CollectionName, BTreeMap<RecordId, Record>>,
}

/// A bundle decoded from remote JSON, with the count of rows that had to
/// be dropped for lacking an id.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBundle {
    pub bundle: Bundle,
    pub skipped: usize,
}

impl Bundle {
    /// Create an empty bundle.
    pub fn new(created_at: Timestamp) -> Self {
        Self {
            created_at,
            collections: BTreeMap::new(),
        }
    }

    /// Make sure a collection exists, even if it stays empty.
    pub fn ensure_collection(&mut self, name: &str) {
        self.collections.entry(name.to_string()).or_default();
    }

    /// Add a record to a collection.
    pub fn add_record(&mut self, collection: &str, record: Record) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// One collection's records, if present.
    pub fn collection(&self, name: &str) -> Option<&BTreeMap<RecordId, Record>> {
        self.collections.get(name)
    }

    /// Get a record by collection and id.
    pub fn get_record(&self, collection: &str, id: &str) -> Option<&Record> {
        self.collections.get(collection)?.get(id)
    }

    /// Count of all records, tombstones included.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(|c| c.len()).sum()
    }

    /// Count of active (non-tombstoned) records.
    pub fn active_record_count(&self) -> usize {
        self.collections
            .values()
            .flat_map(|c| c.values())
            .filter(|r| r.is_active())
            .count()
    }

    /// Check if the bundle carries no records at all.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidBundle(e.to_string()))
    }

    /// Deserialize from JSON, skipping rows that lack an id.
    pub fn from_json(json: &str) -> Result<DecodedBundle> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::InvalidBundle(e.to_string()))?;
        Self::decode(value)
    }

    /// Decode a bundle from a wire JSON value.
    ///
    /// Accepts each collection either as an array of record objects or as
    /// an id-keyed object. A row without an id is dropped and counted in
    /// [`DecodedBundle::skipped`]; a structurally broken bundle (missing
    /// `createdAt`, non-object collections) is an error.
    pub fn decode(value: Value) -> Result<DecodedBundle> {
        let object = match value {
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidBundle(format!(
                    "expected an object, got {other}"
                )))
            }
        };

        let created_at = object
            .get("createdAt")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::InvalidBundle("missing or invalid createdAt".into()))?;

        let mut bundle = Bundle::new(created_at);
        let mut skipped = 0usize;

        let collections = match object.get("collections") {
            None => return Ok(DecodedBundle { bundle, skipped }),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(Error::InvalidBundle(format!(
                    "collections must be an object, got {other}"
                )))
            }
        };

        for (name, rows) in collections {
            bundle.ensure_collection(name);
            let rows: Vec<Value> = match rows {
                Value::Array(rows) => rows.clone(),
                Value::Object(map) => map.values().cloned().collect(),
                other => {
                    return Err(Error::InvalidBundle(format!(
                        "collection {name} must be an array or object, got {other}"
                    )))
                }
            };
            for row in rows {
                match Record::from_value(row) {
                    Ok(record) => bundle.add_record(name, record),
                    Err(Error::MissingId) | Err(Error::MalformedRecord(_)) => skipped += 1,
                    Err(other) => return Err(other),
                }
            }
        }

        Ok(DecodedBundle { bundle, skipped })
    }
}
