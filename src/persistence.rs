//! Persistence layer — a single-file, append-only, bucketed key-value store.
//!
//! # Storage layout
//!
//! ```text
//! userstore.db          # one file, mode 0600
//! ```
//!
//! Every `store`/`delete` call appends one checksummed JSON line to this
//! file:
//!
//! ```json
//! {"op":"put","account":"<hex>","key":"root","entry":{...},"checksum":"crc32:..."}
//! {"op":"remove","account":"<hex>","key":"<hex>","checksum":"crc32:..."}
//! ```
//!
//! On startup the log is replayed once into an in-memory index
//! (`account → key → Entry`), so that `fetch`/`scan` are pure in-memory
//! reads — the "read transaction" of the design — while `store`/`delete`
//! take the single global write lock, append, fsync, then update the
//! index in place — the "write transaction". This mirrors the content-
//! addressed write-ahead log this project already uses for its causal
//! storage engine, simplified to whole-entry upserts instead of
//! content-addressed values, and to one file instead of segmented WAL
//! directories, per this store's single-file requirement.

use crate::entry::Entry;
use crate::error::{StoreError, StoreResult};
use crate::hash::AccountHash;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogRecord {
    Put {
        account: String,
        key: String,
        entry: Entry,
    },
    Remove {
        account: String,
        key: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Framed {
    #[serde(flatten)]
    record: LogRecord,
    checksum: String,
}

fn checksum_of(record: &LogRecord) -> String {
    let json = serde_json::to_string(record).expect("LogRecord always serializes");
    format!("crc32:{:08x}", crc32fast::hash(json.as_bytes()))
}

type Bucket = DashMap<String, Entry>;

/// The embedded key-value store: one bucket per account, one entry per
/// key, backed by a single append-only log file.
pub struct Db {
    path: PathBuf,
    index: DashMap<AccountHash, Arc<Bucket>>,
    write_lock: Mutex<()>,
}

impl Db {
    /// Open (creating if absent) the database at `path`, replaying its log
    /// into memory.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let index: DashMap<AccountHash, Arc<Bucket>> = DashMap::new();

        if path.exists() {
            replay(&path, &index).await?;
        } else {
            fs::File::create(&path)
                .await
                .map_err(|e| StoreError::StorageFault(format!("error while creating database file: {e}")))?;
            set_owner_only_permissions(&path).await;
        }

        Ok(Db {
            path,
            index,
            write_lock: Mutex::new(()),
        })
    }

    fn bucket(&self, addr: AccountHash) -> Option<Arc<Bucket>> {
        self.index.get(&addr).map(|b| b.clone())
    }

    /// Fetch a single entry. Distinguishes "no bucket for this account" from
    /// "key not found within an existing bucket".
    pub fn fetch(&self, addr: AccountHash, key: &str) -> StoreResult<Entry> {
        let bucket = self.bucket(addr).ok_or(StoreError::BucketMissing)?;
        bucket
            .get(key)
            .map(|e| e.clone())
            .ok_or(StoreError::KeyMissing)
    }

    /// Unordered enumeration of all records in an account's bucket.
    pub fn scan(&self, addr: AccountHash) -> StoreResult<Vec<Entry>> {
        let bucket = self.bucket(addr).ok_or(StoreError::BucketMissing)?;
        Ok(bucket.iter().map(|e| e.value().clone()).collect())
    }

    /// Upsert `entry` by `entry.id` inside bucket `addr`, creating the
    /// bucket if missing. Appends to the log, fsyncs, then updates the
    /// in-memory index.
    pub async fn store(&self, addr: AccountHash, entry: Entry) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let record = LogRecord::Put {
            account: addr.to_string(),
            key: entry.id.clone(),
            entry: entry.clone(),
        };
        self.append(record).await?;

        let bucket = self
            .index
            .entry(addr)
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone();
        bucket.insert(entry.id.clone(), entry);
        Ok(())
    }

    /// Remove the raw record for `key` from bucket `addr`. Used only for
    /// full-bucket maintenance operations; routine deletions are tombstones
    /// written via [`Db::store`].
    pub async fn delete(&self, addr: AccountHash, key: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let record = LogRecord::Remove {
            account: addr.to_string(),
            key: key.to_string(),
        };
        self.append(record).await?;

        if let Some(bucket) = self.bucket(addr) {
            bucket.remove(key);
        }
        Ok(())
    }

    async fn append(&self, record: LogRecord) -> StoreResult<()> {
        let checksum = checksum_of(&record);
        let framed = Framed { record, checksum };
        let line = serde_json::to_string(&framed)
            .map_err(|e| StoreError::StorageFault(format!("error while encoding log record: {e}")))?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::StorageFault(format!("error while opening database file: {e}")))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::StorageFault(format!("error while appending to database file: {e}")))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| StoreError::StorageFault(format!("error while appending to database file: {e}")))?;
        file.sync_data()
            .await
            .map_err(|e| StoreError::StorageFault(format!("error while syncing database file: {e}")))?;

        Ok(())
    }

    /// Rewrite the log to only the entries currently in the in-memory
    /// index, dropping superseded upsert records. Not exposed over HTTP;
    /// entry-level tombstones are preserved, since clients must still be
    /// able to observe them.
    pub async fn compact(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let tmp_path = self.path.with_extension("compacting");
        let mut tmp = fs::File::create(&tmp_path)
            .await
            .map_err(|e| StoreError::StorageFault(format!("error while compacting database: {e}")))?;

        for bucket_entry in self.index.iter() {
            let account = bucket_entry.key().to_string();
            for e in bucket_entry.value().iter() {
                let record = LogRecord::Put {
                    account: account.clone(),
                    key: e.key().clone(),
                    entry: e.value().clone(),
                };
                let checksum = checksum_of(&record);
                let framed = Framed { record, checksum };
                let line = serde_json::to_string(&framed).expect("Framed always serializes");
                tmp.write_all(line.as_bytes())
                    .await
                    .map_err(|e| StoreError::StorageFault(format!("error while compacting database: {e}")))?;
                tmp.write_all(b"\n")
                    .await
                    .map_err(|e| StoreError::StorageFault(format!("error while compacting database: {e}")))?;
            }
        }
        tmp.sync_all()
            .await
            .map_err(|e| StoreError::StorageFault(format!("error while compacting database: {e}")))?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::StorageFault(format!("error while compacting database: {e}")))?;
        set_owner_only_permissions(&self.path).await;

        Ok(())
    }
}

async fn replay(path: &Path, index: &DashMap<AccountHash, Arc<Bucket>>) -> StoreResult<()> {
    let file = fs::File::open(path)
        .await
        .map_err(|e| StoreError::StorageFault(format!("error while opening database file: {e}")))?;
    let mut lines = BufReader::new(file).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| StoreError::StorageFault(format!("error while reading database file: {e}")))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let framed: Framed = match serde_json::from_str(&line) {
            Ok(f) => f,
            Err(_) => {
                tracing::warn!("skipping corrupt log record during replay");
                continue;
            }
        };
        if checksum_of(&framed.record) != framed.checksum {
            tracing::warn!("skipping log record with bad checksum during replay");
            continue;
        }

        match framed.record {
            LogRecord::Put {
                account,
                key,
                entry,
            } => {
                let addr: AccountHash = match account.parse() {
                    Ok(a) => a,
                    Err(_) => continue,
                };
                let bucket = index
                    .entry(addr)
                    .or_insert_with(|| Arc::new(DashMap::new()))
                    .clone();
                bucket.insert(key, entry);
            }
            LogRecord::Remove { account, key } => {
                let addr: AccountHash = match account.parse() {
                    Ok(a) => a,
                    Err(_) => continue,
                };
                if let Some(bucket) = index.get(&addr) {
                    bucket.remove(&key);
                }
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn set_owner_only_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = fs::metadata(path).await {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = fs::set_permissions(path, perms).await;
    }
}

#[cfg(not(unix))]
async fn set_owner_only_permissions(_path: &Path) {}
