//! The single persisted record type: [`Entry`].
//!
//! Mirrors the original `StoreEntry` field-for-field (lowercase snake_case
//! on the wire, `collection` not `is_collection` — kept for compatibility
//! with existing clients).

use serde::{Deserialize, Serialize};

/// A single node in an account's tree: a collection (inner node), a leaf
/// (blob), or a tombstone (formerly either, now erased).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// This entry's own key.
    pub id: String,
    /// Parent entry's key; empty means "direct child of root".
    pub parent: String,
    #[serde(rename = "collection")]
    pub is_collection: bool,
    /// Leaf payload. `None` means tombstoned or collection.
    #[serde(default)]
    pub data: Option<Vec<u8>>,
    /// Last modification time, nanosecond epoch.
    pub timestamp: i64,
    /// Direct children. Append-only; never shrunk on delete.
    #[serde(default)]
    pub entries: Vec<String>,
    /// Declared on the wire for compatibility; unused by any operation.
    #[serde(default)]
    pub subcollections: Vec<String>,
}

impl Entry {
    pub fn new_root(timestamp: i64) -> Self {
        Entry {
            id: crate::hash::ROOT_KEY.to_string(),
            parent: String::new(),
            is_collection: true,
            data: None,
            timestamp,
            entries: Vec::new(),
            subcollections: Vec::new(),
        }
    }

    pub fn new(
        id: impl Into<String>,
        parent: impl Into<String>,
        is_collection: bool,
        data: Option<Vec<u8>>,
        timestamp: i64,
    ) -> Self {
        Entry {
            id: id.into(),
            parent: parent.into(),
            is_collection,
            data,
            timestamp,
            entries: Vec::new(),
            subcollections: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == crate::hash::ROOT_KEY
    }

    pub fn is_tombstone(&self) -> bool {
        self.data.is_none() && !self.is_collection && !self.is_root()
    }

    pub fn is_live_leaf(&self) -> bool {
        self.data.is_some() && !self.is_collection
    }

    pub fn is_live_collection(&self) -> bool {
        self.is_collection
    }

    /// Tombstone this entry in place: erase data, clear the collection
    /// flag, bump the timestamp. Keeps the record visible to `since`-
    /// filtered and full-dump queries.
    pub fn tombstone(&mut self, timestamp: i64) {
        self.data = None;
        self.is_collection = false;
        self.timestamp = timestamp;
    }
}

/// Returns nanoseconds since the Unix epoch, the grain `Entry::timestamp`
/// is stored in.
pub fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_nanos() as i64
}
