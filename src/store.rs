//! The store service: enforces the tree invariants on top of the flat
//! persistence layer (parent-must-be-collection, root auto-create,
//! timestamp propagation, child-list maintenance, deletion cascade,
//! index/tombstone rules) and assembles tree views from flat entries.

use crate::entry::{now_nanos, Entry};
use crate::error::{StoreError, StoreResult};
use crate::hash::{AccountHash, ROOT_KEY};
use crate::persistence::Db;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// A tagged view of a dump: either a blob (leaf/tombstone) or a nested
/// mapping (collection). Serializes as a bare object/bytes union, matching
/// the dynamic JSON shape of a dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Dir(BTreeMap<String, Node>),
    Leaf(Option<Vec<u8>>),
}

pub struct StoreService {
    db: Arc<Db>,
}

impl StoreService {
    pub fn new(db: Arc<Db>) -> Self {
        StoreService { db }
    }

    /// Create or update an entry. See the design's Put operation (§4.2.1).
    pub async fn put(
        &self,
        addr: AccountHash,
        key: &str,
        data: Option<Vec<u8>>,
        parent: &str,
        is_collection: bool,
    ) -> StoreResult<()> {
        tracing::debug!(%addr, key, parent, is_collection, "put");

        // 1. Parent must exist and be a collection.
        if !parent.is_empty() {
            let parent_entry = match self.db.fetch(addr, parent) {
                Ok(e) => e,
                Err(StoreError::BucketMissing) | Err(StoreError::KeyMissing) => {
                    return Err(StoreError::ParentMissing)
                }
                Err(e) => return Err(e),
            };
            if !parent_entry.is_collection {
                return Err(StoreError::ParentNotCollection);
            }
        }

        // 2. Ensure the root exists.
        self.ensure_root(addr).await?;

        // 3. Persist the entry itself.
        let timestamp = now_nanos();
        let entry = Entry::new(key, parent, is_collection, data, timestamp);
        self.db.store(addr, entry.clone()).await?;

        // 4. Parent-children update: append to parent.entries if missing.
        let parent_key = if parent.is_empty() { ROOT_KEY } else { parent };
        self.append_child(addr, parent_key, &entry.id, timestamp)
            .await?;

        // 5. Ancestor timestamp propagation, starting at the parent.
        self.propagate_timestamp(addr, parent_key, timestamp).await?;

        Ok(())
    }

    /// Retrieve a single key or dump a subtree/whole store. See the
    /// design's Get/Dump operation (§4.2.2).
    pub fn get(
        &self,
        addr: AccountHash,
        key: &str,
        only_index: bool,
        since: Option<i64>,
    ) -> StoreResult<Node> {
        tracing::debug!(%addr, key, only_index, ?since, "get");

        if !key.is_empty() {
            let entry = self.db.fetch(addr, key)?;
            if !entry.is_collection {
                // Single-entry view: { K: data }.
                let mut map = BTreeMap::new();
                map.insert(entry.id.clone(), Node::Leaf(entry.data.clone()));
                return Ok(Node::Dir(map));
            }
        }

        self.dump(addr, key, only_index, since)
    }

    fn dump(
        &self,
        addr: AccountHash,
        key: &str,
        only_index: bool,
        since: Option<i64>,
    ) -> StoreResult<Node> {
        let candidates = if key.is_empty() {
            self.db.scan(addr)?
        } else {
            self.collect_subtree(addr, key)?
        };

        let filtered: Vec<Entry> = candidates
            .into_iter()
            .filter(|e| !e.is_root())
            .filter(|e| since.map_or(true, |s| e.timestamp > s))
            .filter(|e| !(only_index && e.is_live_leaf()))
            .collect();

        // Group surviving entries by parent (root-level children use "").
        let mut children_of: BTreeMap<String, Vec<&Entry>> = BTreeMap::new();
        for e in &filtered {
            let parent = if e.parent.is_empty() {
                String::new()
            } else {
                e.parent.clone()
            };
            children_of.entry(parent).or_default().push(e);
        }

        // The actual root entry is filtered out above and its children are
        // grouped under the empty parent key, so the root's own key and
        // "" are interchangeable as a starting point for assembly.
        let root_key = if key.is_empty() || key == ROOT_KEY { "" } else { key };
        Ok(assemble(root_key, &children_of))
    }

    fn collect_subtree(&self, addr: AccountHash, key: &str) -> StoreResult<Vec<Entry>> {
        let root = self.db.fetch(addr, key)?;
        let mut out = vec![root.clone()];
        if !root.is_collection {
            return Ok(out);
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root.id.clone());
        let mut stack: Vec<String> = root.entries.clone();

        while let Some(child_id) = stack.pop() {
            if !visited.insert(child_id.clone()) {
                continue;
            }
            let child = match self.db.fetch(addr, &child_id) {
                Ok(e) => e,
                Err(_) => continue,
            };
            if child.is_collection {
                stack.extend(child.entries.clone());
            }
            out.push(child);
        }

        Ok(out)
    }

    /// Tombstone a key and, if it is a collection, every descendant. See
    /// the design's Delete operation (§4.2.3).
    pub async fn delete(&self, addr: AccountHash, key: &str) -> StoreResult<()> {
        tracing::debug!(%addr, key, "delete");

        if key.is_empty() {
            let entries = self.db.scan(addr)?;
            for e in entries {
                if e.is_root() {
                    continue;
                }
                self.tombstone_one(addr, &e.id).await?;
            }
            return Ok(());
        }

        let entry = self.db.fetch(addr, key)?;
        if entry.is_collection {
            let mut visited: HashSet<String> = HashSet::new();
            visited.insert(entry.id.clone());
            let mut stack: Vec<String> = entry.entries.clone();
            let mut descendants = Vec::new();

            while let Some(child_id) = stack.pop() {
                if !visited.insert(child_id.clone()) {
                    continue;
                }
                let child = match self.db.fetch(addr, &child_id) {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                if child.is_collection {
                    stack.extend(child.entries.clone());
                }
                descendants.push(child.id);
            }

            for id in descendants {
                self.tombstone_one(addr, &id).await?;
            }
        }

        self.tombstone_one(addr, key).await?;
        Ok(())
    }

    async fn tombstone_one(&self, addr: AccountHash, key: &str) -> StoreResult<()> {
        let mut entry = match self.db.fetch(addr, key) {
            Ok(e) => e,
            Err(StoreError::KeyMissing) => return Ok(()),
            Err(e) => return Err(e),
        };
        let parent_key = if entry.parent.is_empty() {
            ROOT_KEY.to_string()
        } else {
            entry.parent.clone()
        };

        let timestamp = now_nanos();
        entry.tombstone(timestamp);
        self.db.store(addr, entry).await?;

        self.propagate_timestamp(addr, &parent_key, timestamp).await?;
        Ok(())
    }

    async fn ensure_root(&self, addr: AccountHash) -> StoreResult<()> {
        match self.db.fetch(addr, ROOT_KEY) {
            Ok(_) => Ok(()),
            Err(StoreError::BucketMissing) | Err(StoreError::KeyMissing) => {
                let root = Entry::new_root(now_nanos());
                self.db.store(addr, root).await
            }
            Err(e) => Err(e),
        }
    }

    async fn append_child(
        &self,
        addr: AccountHash,
        parent_key: &str,
        child_id: &str,
        timestamp: i64,
    ) -> StoreResult<()> {
        let mut parent = self.db.fetch(addr, parent_key)?;
        if !parent.entries.iter().any(|e| e == child_id) {
            parent.entries.push(child_id.to_string());
        }
        parent.timestamp = timestamp;
        self.db.store(addr, parent).await
    }

    /// Walk upward from `start_key` to the root, overwriting each
    /// ancestor's timestamp.
    async fn propagate_timestamp(
        &self,
        addr: AccountHash,
        start_key: &str,
        timestamp: i64,
    ) -> StoreResult<()> {
        let mut current = start_key.to_string();
        loop {
            let mut entry = self.db.fetch(addr, &current)?;
            entry.timestamp = timestamp;
            let is_root = entry.is_root();
            let next = entry.parent.clone();
            self.db.store(addr, entry).await?;

            if is_root {
                break;
            }
            current = if next.is_empty() {
                ROOT_KEY.to_string()
            } else {
                next
            };
        }
        Ok(())
    }
}

/// Recursively build the `Node` for `id` from its recorded children,
/// turning the flat (already-filtered) entry list into a nested tree.
fn assemble(id: &str, children_of: &BTreeMap<String, Vec<&Entry>>) -> Node {
    let mut map = BTreeMap::new();
    if let Some(children) = children_of.get(id) {
        for e in children {
            let node = if e.is_collection {
                assemble(&e.id, children_of)
            } else {
                Node::Leaf(e.data.clone())
            };
            map.insert(e.id.clone(), node);
        }
    }
    Node::Dir(map)
}
