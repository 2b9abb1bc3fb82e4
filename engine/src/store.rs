//! Store - the local copy of every business collection.
//!
//! The store is the durable side of the engine: records are addressed by
//! collection and id, deletes write tombstones instead of removing rows,
//! and visible reads filter tombstones out. A sync pass reads the whole
//! store as a [`Bundle`] and writes merge results back through it.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::snapshot::Bundle;
use crate::{CollectionName, RecordId, Timestamp};
use std::collections::{BTreeMap, HashMap};

/// The collections a Satchel store starts with.
pub const DEFAULT_COLLECTIONS: &[&str] = &[
    "quotes",
    "invoices",
    "contacts",
    "suppliers",
    "items",
    "settings",
];

/// Collection holding app-level settings records.
pub const SETTINGS_COLLECTION: &str = "settings";

/// Id of the settings record carrying the last successful sync time.
pub const LAST_SYNC_KEY: &str = "lastSyncTime";

/// A collection of records keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    records: HashMap<RecordId, Record>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Get a record by id, tombstoned or not.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Insert a record, overwriting any existing record with the same id.
    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.id.clone(), record);
    }

    /// Check if a record exists (including tombstones).
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// All active (non-tombstoned) records.
    pub fn active_records(&self) -> impl Iterator<Item = &Record> {
        self.records.values().filter(|r| r.is_active())
    }

    /// All records including tombstones.
    pub fn all_records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Count of active records.
    pub fn len(&self) -> usize {
        self.records.values().filter(|r| r.is_active()).count()
    }

    /// Check if the collection has no active records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of all rows, tombstones included.
    pub fn total_len(&self) -> usize {
        self.records.len()
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}

/// The local record store, one [`Collection`] per entity type.
#[derive(Debug, Clone)]
pub struct Store {
    collections: HashMap<CollectionName, Collection>,
    /// Greatest `updated_at` ever written; stamps outgoing bundles.
    last_modified: Timestamp,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create a store with the default Satchel collections.
    pub fn new() -> Self {
        Self::with_collections(DEFAULT_COLLECTIONS.iter().copied())
    }

    /// Create a store with a custom collection set.
    pub fn with_collections<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CollectionName>,
    {
        let collections = names
            .into_iter()
            .map(|name| (name.into(), Collection::new()))
            .collect();
        Self {
            collections,
            last_modified: 0,
        }
    }

    /// Names of all collections in the store.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Get a collection by name.
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// When the store contents last changed.
    pub fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    /// Get an active record by collection and id.
    pub fn get(&self, collection: &str, id: &str) -> Option<&Record> {
        self.collections
            .get(collection)
            .and_then(|c| c.get(id))
            .filter(|r| r.is_active())
    }

    /// Get a record including tombstones.
    pub fn get_including_deleted(&self, collection: &str, id: &str) -> Option<&Record> {
        self.collections.get(collection).and_then(|c| c.get(id))
    }

    /// All active records of a collection.
    pub fn get_all(&self, collection: &str) -> Result<Vec<&Record>> {
        let collection = self
            .collections
            .get(collection)
            .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;
        Ok(collection.active_records().collect())
    }

    /// Insert or overwrite a record.
    pub fn put(&mut self, collection: &str, record: Record) -> Result<()> {
        let entry = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;
        self.last_modified = self.last_modified.max(record.updated_at);
        entry.insert(record);
        Ok(())
    }

    /// Tombstone a record so the deletion propagates on a later sync pass.
    ///
    /// The row stays in the store; visible reads no longer return it.
    pub fn delete(&mut self, collection: &str, id: &str, now: Timestamp) -> Result<()> {
        let entry = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;
        let record = entry
            .get_mut(id)
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        if record.deleted {
            return Err(Error::AlreadyDeleted(id.to_string()));
        }
        record.mark_deleted(now);
        self.last_modified = self.last_modified.max(record.updated_at);
        Ok(())
    }

    /// Remove every row of a collection, tombstones included.
    pub fn clear(&mut self, collection: &str) -> Result<()> {
        let entry = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;
        entry.clear();
        Ok(())
    }

    /// Read the whole store as an immutable bundle.
    ///
    /// The bundle is stamped with the store's `last_modified`, not the wall
    /// clock, so two stores with identical content produce bundles that
    /// compare equal.
    pub fn to_bundle(&self) -> Bundle {
        let mut bundle = Bundle::new(self.last_modified);
        for (name, collection) in &self.collections {
            bundle.ensure_collection(name);
            for record in collection.all_records() {
                bundle.add_record(name, record.clone());
            }
        }
        bundle
    }

    /// Replace the entire store contents with a remote bundle (pull).
    ///
    /// Every known collection is cleared first; the remote snapshot is
    /// authoritative, including collections it leaves empty.
    pub fn replace_from(&mut self, bundle: &Bundle) {
        for collection in self.collections.values_mut() {
            collection.clear();
        }
        for (name, records) in &bundle.collections {
            let entry = self.collections.entry(name.clone()).or_default();
            for record in records.values() {
                entry.insert(record.clone());
            }
        }
        self.last_modified = bundle.created_at;
    }

    /// Replace one collection with a merge result.
    pub fn apply_merged(&mut self, name: &str, merged: BTreeMap<RecordId, Record>) {
        let entry = self.collections.entry(name.to_string()).or_default();
        entry.clear();
        for record in merged.into_values() {
            self.last_modified = self.last_modified.max(record.updated_at);
            entry.insert(record);
        }
    }

    /// Read the last successful sync time from the settings collection.
    pub fn last_sync_time(&self) -> Option<Timestamp> {
        self.get_including_deleted(SETTINGS_COLLECTION, LAST_SYNC_KEY)
            .and_then(|record| record.payload.get("value"))
            .and_then(|value| value.as_u64())
    }

    /// Persist the last successful sync time as a settings record.
    pub fn set_last_sync_time(&mut self, timestamp: Timestamp) {
        let mut payload = serde_json::Map::new();
        payload.insert("value".to_string(), serde_json::json!(timestamp));
        let record = Record::new(LAST_SYNC_KEY, timestamp, payload);
        self.last_modified = self.last_modified.max(timestamp);
        self.collections
            .entry(SETTINGS_COLLECTION.to_string())
            .or_default()
            .insert(record);
    }
}
