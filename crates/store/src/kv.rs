//! Mapping-level facade over the embedded engine.
//!
//! Each named collection is its own RocksDB database in its own
//! subdirectory, so engine-level writes never cross collections. Writes are
//! durable (sync WAL on commit).

use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Upper-bound sentinel for prefix scans. Legal key bytes are alphanumerics,
/// `:` and `.`, all strictly below this.
pub const PREFIX_SENTINEL: u8 = b'~';

/// Collection names. These are contracts shared with the query layer, not
/// internals.
pub mod col {
    pub const PIN_INFO: &str = "pin_info";
    pub const FILE_BY_PIN: &str = "file_by_pin";
    pub const FILE_LATEST_BY_FIRST_PIN: &str = "file_latest_by_first_pin";
    pub const FILE_BY_ADDRESS: &str = "file_by_address";
    pub const FILE_BY_METAID: &str = "file_by_metaid";
    pub const FILE_HASH: &str = "file_hash";
    pub const FILE_INFO_HISTORY: &str = "file_info_history";
    pub const CHUNK_BY_PIN: &str = "chunk_by_pin";
    pub const CHUNK_BY_PARENT: &str = "chunk_by_parent";
    pub const USER_NAME_LATEST: &str = "user_name_latest";
    pub const USER_AVATAR_LATEST: &str = "user_avatar_latest";
    pub const USER_CHATKEY_LATEST: &str = "user_chatkey_latest";
    pub const USER_NAME_HISTORY: &str = "user_name_history";
    pub const USER_AVATAR_HISTORY: &str = "user_avatar_history";
    pub const USER_CHATKEY_HISTORY: &str = "user_chatkey_history";
    pub const METAID_ADDRESS: &str = "metaid_address";
    pub const METAID_TIMESTAMP: &str = "metaid_timestamp";
    pub const SYNC_STATUS: &str = "sync_status";
    pub const COUNTERS: &str = "counters";
    pub const SCHEMA_VERSION: &str = "schema_version";

    pub const ALL: [&str; 20] = [
        PIN_INFO,
        FILE_BY_PIN,
        FILE_LATEST_BY_FIRST_PIN,
        FILE_BY_ADDRESS,
        FILE_BY_METAID,
        FILE_HASH,
        FILE_INFO_HISTORY,
        CHUNK_BY_PIN,
        CHUNK_BY_PARENT,
        USER_NAME_LATEST,
        USER_AVATAR_LATEST,
        USER_CHATKEY_LATEST,
        USER_NAME_HISTORY,
        USER_AVATAR_HISTORY,
        USER_CHATKEY_HISTORY,
        METAID_ADDRESS,
        METAID_TIMESTAMP,
        SYNC_STATUS,
        COUNTERS,
        SCHEMA_VERSION,
    ];
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("engine error: {0}")]
    Engine(#[from] rocksdb::Error),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
}

/// Process-wide handle to the embedded store. Opened once at start with a
/// root data directory.
pub struct KvStore {
    collections: HashMap<&'static str, Collection>,
}

impl KvStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let mut collections = HashMap::with_capacity(col::ALL.len());
        for name in col::ALL {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            let db = DB::open(&opts, root.join(name))?;
            collections.insert(
                name,
                Collection {
                    name,
                    db: Arc::new(db),
                },
            );
        }
        Ok(Self { collections })
    }

    pub fn collection(&self, name: &str) -> Result<Collection, StoreError> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }
}

/// One named mapping from byte key to byte value with ordered iteration.
/// Cheap to clone; clones share the underlying database.
#[derive(Clone)]
pub struct Collection {
    name: &'static str,
    db: Arc<DB>,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn sync_writes() -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        opts
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?)
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<(), StoreError> {
        Ok(self.db.put_opt(key, value, &Self::sync_writes())?)
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<(), StoreError> {
        Ok(self.db.delete_opt(key, &Self::sync_writes())?)
    }

    /// Ordered scan over the half-open range `[prefix, prefix + "~")`.
    pub fn scan_prefix(&self, prefix: impl AsRef<[u8]>) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let prefix = prefix.as_ref();
        let mut upper = prefix.to_vec();
        upper.push(PREFIX_SENTINEL);

        let mut out = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if key.as_ref() >= upper.as_slice() {
                break;
            }
            out.push((key.into_vec(), value.into_vec()));
        }
        Ok(out)
    }
}
