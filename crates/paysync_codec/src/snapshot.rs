//! Snapshots: the full set of one kind's records as exchanged with a peer.

use crate::entity::{Entity, ToRecord};
use crate::error::{CodecError, CodecResult};
use crate::kind::EntityKind;
use crate::value::Record;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Records of one entity kind, keyed by identity.
///
/// On the wire a snapshot is a JSON object mapping each identity key to
/// its record. Entry order is significant: it is the order in which the
/// object was written, and receivers reconcile entries in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    keys: Vec<String>,
    items: Vec<Record>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes typed local items, keyed by their identity.
    pub fn from_items<E: Entity>(items: &[E]) -> Self {
        let mut snapshot = Self::new();
        for item in items {
            snapshot.insert(item.identity(), item.to_record());
        }
        snapshot
    }

    /// Keys already-built records of `kind` by their identity fields.
    pub fn from_records(kind: EntityKind, records: Vec<Record>) -> CodecResult<Self> {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.insert(kind.identity_of(&record)?, record);
        }
        Ok(snapshot)
    }

    /// Inserts a record under `key`, replacing an existing entry in place.
    pub fn insert(&mut self, key: impl Into<String>, record: Record) {
        let key = key.into();
        match self.keys.iter().position(|k| *k == key) {
            Some(i) => self.items[i] = record,
            None => {
                self.keys.push(key);
                self.items.push(record);
            }
        }
    }

    /// Record stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Record> {
        let i = self.keys.iter().position(|k| k == key)?;
        self.items.get(i)
    }

    /// Decodes every record as a typed entity.
    ///
    /// Fails on the first malformed record; nothing is silently dropped.
    pub fn decode<E: Entity>(&self) -> CodecResult<Vec<E>> {
        self.items.iter().map(E::from_record).collect()
    }

    /// Parses the wire form.
    pub fn from_json(bytes: &[u8]) -> CodecResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => CodecError::invalid_structure(e.to_string()),
            _ => CodecError::from(e),
        })
    }

    /// Encodes the wire form.
    pub fn to_json(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CodecError::encoding_failed(e.to_string()))
    }

    /// Identity keys in delivery order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Records in delivery order.
    pub fn records(&self) -> &[Record] {
        &self.items
    }

    /// Key and record pairs in delivery order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Record)> + '_ {
        self.keys.iter().map(String::as_str).zip(self.items.iter())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, Record);
    type IntoIter = std::iter::Zip<std::vec::IntoIter<String>, std::vec::IntoIter<Record>>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter().zip(self.items)
    }
}

impl Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, record) in self.entries() {
            map.serialize_entry(key, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(SnapshotVisitor)
    }
}

/// Reads entries in document order. A repeated key keeps its first
/// position and its last record.
struct SnapshotVisitor;

impl<'de> Visitor<'de> for SnapshotVisitor {
    type Value = Snapshot;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object of records keyed by identity")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Snapshot, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut snapshot = Snapshot::new();
        while let Some((key, record)) = access.next_entry::<String, Record>()? {
            snapshot.insert(key, record);
        }
        Ok(snapshot)
    }
}

/// Body of a push request: `{"action": "sync", "data": <snapshot>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEnvelope {
    /// Requested action; always `sync` for pushes built here.
    pub action: String,
    /// The pushed snapshot.
    pub data: Snapshot,
}

impl PushEnvelope {
    /// The action name used for snapshot pushes.
    pub const SYNC_ACTION: &'static str = "sync";

    /// Wraps a snapshot for pushing.
    pub fn sync(data: Snapshot) -> Self {
        Self {
            action: Self::SYNC_ACTION.to_string(),
            data,
        }
    }

    /// Parses the wire form.
    pub fn from_json(bytes: &[u8]) -> CodecResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encodes the wire form.
    pub fn to_json(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CodecError::encoding_failed(e.to_string()))
    }
}
