//! Typed collection accessors.
//!
//! All latest-wins, history-deduplication and dual-key rules live here so
//! the materializer stays a pure orchestration layer and the rules are
//! testable against a real engine.

use crate::kv::{col, Collection, KvStore, StoreError};
use metafs_types::record::{ChunkRecord, FileRecord, PinInfo, RecordStatus, SyncStatus, UserInfoRecord};
use metafs_types::ChainKind;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Lookup sub-prefix inside `metaid_timestamp`: `m:<metaid>` → timestamp.
const METAID_TS_LOOKUP: &str = "m:";
/// Ordered sub-prefix inside `metaid_timestamp`: `t:<013-digit ms>:<metaid>`.
const METAID_TS_ORDERED: &str = "t:";

/// The three sibling user-info record families.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UserInfoFamily {
    Name,
    Avatar,
    ChatKey,
}

impl UserInfoFamily {
    pub const ALL: [UserInfoFamily; 3] = [
        UserInfoFamily::Name,
        UserInfoFamily::Avatar,
        UserInfoFamily::ChatKey,
    ];
}

/// Entries that can live in a history list: identified by PIN, ordered by
/// timestamp.
pub trait HistoryEntry {
    fn entry_pin_id(&self) -> &str;
    fn entry_timestamp(&self) -> u64;
}

impl HistoryEntry for FileRecord {
    fn entry_pin_id(&self) -> &str {
        &self.pin_id
    }
    fn entry_timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl HistoryEntry for UserInfoRecord {
    fn entry_pin_id(&self) -> &str {
        &self.pin_id
    }
    fn entry_timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Typed view over every collection the core writes.
#[derive(Clone)]
pub struct IndexStore {
    pin_info: Collection,
    file_by_pin: Collection,
    file_latest_by_first_pin: Collection,
    file_by_address: Collection,
    file_by_metaid: Collection,
    file_hash: Collection,
    file_info_history: Collection,
    chunk_by_pin: Collection,
    chunk_by_parent: Collection,
    user_name_latest: Collection,
    user_avatar_latest: Collection,
    user_chatkey_latest: Collection,
    user_name_history: Collection,
    user_avatar_history: Collection,
    user_chatkey_history: Collection,
    metaid_address: Collection,
    metaid_timestamp: Collection,
    sync_status: Collection,
    counters: Collection,
    schema_version: Collection,
}

fn get_json<T: DeserializeOwned>(col: &Collection, key: &str) -> Result<Option<T>, StoreError> {
    match col.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn put_json<T: Serialize>(col: &Collection, key: &str, value: &T) -> Result<(), StoreError> {
    col.put(key, serde_json::to_vec(value)?)
}

impl IndexStore {
    pub fn open(kv: &KvStore) -> Result<Self, StoreError> {
        Ok(Self {
            pin_info: kv.collection(col::PIN_INFO)?,
            file_by_pin: kv.collection(col::FILE_BY_PIN)?,
            file_latest_by_first_pin: kv.collection(col::FILE_LATEST_BY_FIRST_PIN)?,
            file_by_address: kv.collection(col::FILE_BY_ADDRESS)?,
            file_by_metaid: kv.collection(col::FILE_BY_METAID)?,
            file_hash: kv.collection(col::FILE_HASH)?,
            file_info_history: kv.collection(col::FILE_INFO_HISTORY)?,
            chunk_by_pin: kv.collection(col::CHUNK_BY_PIN)?,
            chunk_by_parent: kv.collection(col::CHUNK_BY_PARENT)?,
            user_name_latest: kv.collection(col::USER_NAME_LATEST)?,
            user_avatar_latest: kv.collection(col::USER_AVATAR_LATEST)?,
            user_chatkey_latest: kv.collection(col::USER_CHATKEY_LATEST)?,
            user_name_history: kv.collection(col::USER_NAME_HISTORY)?,
            user_avatar_history: kv.collection(col::USER_AVATAR_HISTORY)?,
            user_chatkey_history: kv.collection(col::USER_CHATKEY_HISTORY)?,
            metaid_address: kv.collection(col::METAID_ADDRESS)?,
            metaid_timestamp: kv.collection(col::METAID_TIMESTAMP)?,
            sync_status: kv.collection(col::SYNC_STATUS)?,
            counters: kv.collection(col::COUNTERS)?,
            schema_version: kv.collection(col::SCHEMA_VERSION)?,
        })
    }

    // --- pin info ---

    pub fn get_pin_info(&self, pin_id: &str) -> Result<Option<PinInfo>, StoreError> {
        get_json(&self.pin_info, pin_id)
    }

    /// Writes a pin row under the idempotence rule: a later write only wins
    /// when its timestamp is strictly newer, or equal with a different
    /// operation (same-block re-observation). Returns whether it was
    /// written.
    pub fn save_pin_info(&self, pin: &PinInfo) -> Result<bool, StoreError> {
        if let Some(existing) = self.get_pin_info(&pin.pin_id)? {
            let newer = pin.timestamp > existing.timestamp;
            let reobserved =
                pin.timestamp == existing.timestamp && pin.operation != existing.operation;
            if !newer && !reobserved {
                return Ok(false);
            }
        } else {
            self.incr_counter("pin_count", 1)?;
        }
        put_json(&self.pin_info, &pin.pin_id, pin)?;
        Ok(true)
    }

    // --- files ---

    pub fn get_file_by_pin(&self, pin_id: &str) -> Result<Option<FileRecord>, StoreError> {
        get_json(&self.file_by_pin, pin_id)
    }

    pub fn get_latest_file(&self, first_pin_id: &str) -> Result<Option<FileRecord>, StoreError> {
        get_json(&self.file_latest_by_first_pin, first_pin_id)
    }

    pub fn file_history(&self, first_pin_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        Ok(get_json(&self.file_info_history, first_pin_id)?.unwrap_or_default())
    }

    pub fn files_by_address(&self, address: &str) -> Result<Vec<FileRecord>, StoreError> {
        self.file_by_address
            .scan_prefix(format!("{address}:"))?
            .iter()
            .map(|(_, v)| serde_json::from_slice(v).map_err(StoreError::from))
            .collect()
    }

    pub fn files_by_metaid(&self, metaid: &str) -> Result<Vec<FileRecord>, StoreError> {
        self.file_by_metaid
            .scan_prefix(format!("{metaid}:"))?
            .iter()
            .map(|(_, v)| serde_json::from_slice(v).map_err(StoreError::from))
            .collect()
    }

    /// Persists a file row across its projections and applies the
    /// latest-wins rule to the per-object latest pointer.
    pub fn save_file(&self, file: &FileRecord) -> Result<(), StoreError> {
        if self.get_file_by_pin(&file.pin_id)?.is_none() {
            self.incr_counter("file_count", 1)?;
        }
        put_json(&self.file_by_pin, &file.pin_id, file)?;
        put_json(
            &self.file_by_address,
            &format!("{}:{}", file.owner_address, file.first_pin_id),
            file,
        )?;
        put_json(
            &self.file_by_metaid,
            &format!("{}:{}", file.owner_metaid, file.first_pin_id),
            file,
        )?;
        put_json(
            &self.file_hash,
            &format!("{}:{}", file.md5, file.pin_id),
            file,
        )?;

        let current: Option<FileRecord> = self.get_latest_file(&file.first_pin_id)?;
        let wins = current
            .as_ref()
            .map(|latest| file.timestamp > latest.timestamp)
            .unwrap_or(true);
        if wins {
            put_json(&self.file_latest_by_first_pin, &file.first_pin_id, file)?;
        }

        self.upsert_history(&self.file_info_history, &file.first_pin_id, file)
    }

    // --- chunks ---

    pub fn get_chunk(&self, pin_id: &str) -> Result<Option<ChunkRecord>, StoreError> {
        get_json(&self.chunk_by_pin, pin_id)
    }

    /// Writes a chunk row, preserving a previously back-filled parent and
    /// ordinal if the incoming row does not carry them.
    pub fn save_chunk(&self, chunk: &ChunkRecord) -> Result<ChunkRecord, StoreError> {
        let mut merged = chunk.clone();
        if let Some(existing) = self.get_chunk(&chunk.pin_id)? {
            if merged.parent_pin_id.is_empty() && !existing.parent_pin_id.is_empty() {
                merged.parent_pin_id = existing.parent_pin_id;
                merged.chunk_index = existing.chunk_index;
            }
        }
        put_json(&self.chunk_by_pin, &merged.pin_id, &merged)?;
        if !merged.parent_pin_id.is_empty() {
            put_json(
                &self.chunk_by_parent,
                &Self::chunk_parent_key(&merged.parent_pin_id, merged.chunk_index),
                &merged,
            )?;
        }
        Ok(merged)
    }

    /// Back-fills a chunk's parent linkage from an index record. Creates a
    /// pending placeholder when the chunk itself has not been observed yet,
    /// so a late chunk arrival can find its parent.
    pub fn backfill_chunk_parent(
        &self,
        pin_id: &str,
        parent_pin_id: &str,
        chunk_index: u64,
        chain: ChainKind,
    ) -> Result<ChunkRecord, StoreError> {
        let mut chunk = self.get_chunk(pin_id)?.unwrap_or(ChunkRecord {
            pin_id: pin_id.to_string(),
            parent_pin_id: String::new(),
            chunk_index: 0,
            size: 0,
            md5: String::new(),
            compressed: false,
            storage_path: String::new(),
            chain,
            height: 0,
            status: RecordStatus::Pending,
        });
        chunk.parent_pin_id = parent_pin_id.to_string();
        chunk.chunk_index = chunk_index;
        put_json(&self.chunk_by_pin, pin_id, &chunk)?;
        put_json(
            &self.chunk_by_parent,
            &Self::chunk_parent_key(parent_pin_id, chunk_index),
            &chunk,
        )?;
        Ok(chunk)
    }

    pub fn chunks_for_parent(&self, parent_pin_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        self.chunk_by_parent
            .scan_prefix(format!("{parent_pin_id}:"))?
            .iter()
            .map(|(_, v)| serde_json::from_slice(v).map_err(StoreError::from))
            .collect()
    }

    fn chunk_parent_key(parent: &str, index: u64) -> String {
        // Zero-padded so lexicographic collection order matches chunk order.
        format!("{parent}:{index:05}")
    }

    // --- user info ---

    pub fn get_user_latest(
        &self,
        family: UserInfoFamily,
        metaid: &str,
    ) -> Result<Option<UserInfoRecord>, StoreError> {
        get_json(self.family_latest(family), metaid)
    }

    pub fn user_history(
        &self,
        family: UserInfoFamily,
        metaid: &str,
    ) -> Result<Vec<UserInfoRecord>, StoreError> {
        Ok(get_json(self.family_history(family), metaid)?.unwrap_or_default())
    }

    /// Latest row only moves forward in time; history always receives the
    /// record (deduplicated by PIN).
    pub fn save_user_info(
        &self,
        family: UserInfoFamily,
        record: &UserInfoRecord,
    ) -> Result<(), StoreError> {
        let latest_col = self.family_latest(family);
        let wins = get_json::<UserInfoRecord>(latest_col, &record.metaid)?
            .map(|latest| record.timestamp > latest.timestamp)
            .unwrap_or(true);
        if wins {
            put_json(latest_col, &record.metaid, record)?;
        }
        self.upsert_history(self.family_history(family), &record.metaid, record)
    }

    fn family_latest(&self, family: UserInfoFamily) -> &Collection {
        match family {
            UserInfoFamily::Name => &self.user_name_latest,
            UserInfoFamily::Avatar => &self.user_avatar_latest,
            UserInfoFamily::ChatKey => &self.user_chatkey_latest,
        }
    }

    fn family_history(&self, family: UserInfoFamily) -> &Collection {
        match family {
            UserInfoFamily::Name => &self.user_name_history,
            UserInfoFamily::Avatar => &self.user_avatar_history,
            UserInfoFamily::ChatKey => &self.user_chatkey_history,
        }
    }

    // --- metaid mappings ---

    /// Bidirectional mapping: both keys point at the other side.
    pub fn save_metaid_address(&self, metaid: &str, address: &str) -> Result<(), StoreError> {
        self.metaid_address.put(metaid, address)?;
        self.metaid_address.put(address, metaid)
    }

    pub fn get_address_by_metaid(&self, metaid: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .metaid_address
            .get(metaid)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    pub fn get_metaid_by_address(&self, address: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .metaid_address
            .get(address)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Records the earliest observed protocol activity per MetaID. A newer
    /// (higher) timestamp is ignored; a lower one replaces the ordered key.
    pub fn save_metaid_timestamp(&self, metaid: &str, timestamp: u64) -> Result<(), StoreError> {
        let lookup_key = format!("{METAID_TS_LOOKUP}{metaid}");
        if let Some(existing) = self.metaid_timestamp.get(&lookup_key)? {
            let existing_ts: u64 = String::from_utf8_lossy(&existing).parse().unwrap_or(u64::MAX);
            if existing_ts <= timestamp {
                return Ok(());
            }
            self.metaid_timestamp
                .delete(Self::metaid_ts_ordered_key(existing_ts, metaid))?;
        }
        self.metaid_timestamp
            .put(&lookup_key, timestamp.to_string())?;
        self.metaid_timestamp
            .put(Self::metaid_ts_ordered_key(timestamp, metaid), metaid)
    }

    fn metaid_ts_ordered_key(timestamp: u64, metaid: &str) -> String {
        format!("{METAID_TS_ORDERED}{timestamp:013}:{metaid}")
    }

    /// MetaIDs in order of first observed activity, earliest first.
    pub fn list_users_chronological(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        Ok(self
            .metaid_timestamp
            .scan_prefix(METAID_TS_ORDERED)?
            .into_iter()
            .take(limit)
            .map(|(_, v)| String::from_utf8_lossy(&v).into_owned())
            .collect())
    }

    // --- sync status ---

    pub fn get_sync_status(&self, chain: ChainKind) -> Result<Option<SyncStatus>, StoreError> {
        get_json(&self.sync_status, chain.name())
    }

    /// Monotone advance used by the steady-state pipeline.
    pub fn advance_sync_height(
        &self,
        chain: ChainKind,
        height: u64,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let current = self.get_sync_status(chain)?;
        if current.as_ref().map(|s| s.current_sync_height >= height).unwrap_or(false) {
            return Ok(());
        }
        put_json(
            &self.sync_status,
            chain.name(),
            &SyncStatus {
                chain,
                current_sync_height: height,
                updated_at: now_ms,
            },
        )
    }

    /// Unconditional cursor write; only an explicit rescan/operator action
    /// may move a cursor backwards.
    pub fn set_sync_height(
        &self,
        chain: ChainKind,
        height: u64,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        put_json(
            &self.sync_status,
            chain.name(),
            &SyncStatus {
                chain,
                current_sync_height: height,
                updated_at: now_ms,
            },
        )
    }

    // --- counters / schema ---

    pub fn incr_counter(&self, name: &str, delta: u64) -> Result<u64, StoreError> {
        let current: u64 = get_json(&self.counters, name)?.unwrap_or(0);
        let next = current.saturating_add(delta);
        put_json(&self.counters, name, &next)?;
        Ok(next)
    }

    pub fn get_counter(&self, name: &str) -> Result<u64, StoreError> {
        Ok(get_json(&self.counters, name)?.unwrap_or(0))
    }

    pub fn schema_version(&self) -> Result<u32, StoreError> {
        Ok(get_json(&self.schema_version, "version")?.unwrap_or(0))
    }

    pub fn put_schema_version(&self, version: u32) -> Result<(), StoreError> {
        put_json(&self.schema_version, "version", &version)
    }

    /// Raw scan used by migrations.
    pub(crate) fn all_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        self.file_by_pin
            .scan_prefix("")?
            .iter()
            .map(|(_, v)| serde_json::from_slice(v).map_err(StoreError::from))
            .collect()
    }

    pub(crate) fn reindex_file_projections(&self, file: &FileRecord) -> Result<(), StoreError> {
        put_json(
            &self.file_by_address,
            &format!("{}:{}", file.owner_address, file.first_pin_id),
            file,
        )?;
        put_json(
            &self.file_by_metaid,
            &format!("{}:{}", file.owner_metaid, file.first_pin_id),
            file,
        )
    }

    /// Read-modify-write history insertion: replace any entry with the same
    /// PIN, append otherwise, re-sort newest first, write back. Idempotent
    /// on retries.
    fn upsert_history<T>(&self, col: &Collection, key: &str, entry: &T) -> Result<(), StoreError>
    where
        T: HistoryEntry + Serialize + DeserializeOwned + Clone,
    {
        let mut list: Vec<T> = get_json(col, key)?.unwrap_or_default();
        if let Some(existing) = list
            .iter_mut()
            .find(|e| e.entry_pin_id() == entry.entry_pin_id())
        {
            *existing = entry.clone();
        } else {
            list.push(entry.clone());
        }
        list.sort_by(|a, b| b.entry_timestamp().cmp(&a.entry_timestamp()));
        put_json(col, key, &list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metafs_types::Operation;

    fn open() -> (tempfile::TempDir, IndexStore) {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path()).unwrap();
        let index = IndexStore::open(&kv).unwrap();
        (dir, index)
    }

    fn pin(pin_id: &str, timestamp: u64, operation: Operation) -> PinInfo {
        PinInfo {
            pin_id: pin_id.into(),
            first_pin_id: pin_id.into(),
            first_path: "/file".into(),
            path: "/file".into(),
            operation,
            content_type: "image/png".into(),
            chain: ChainKind::Btc,
            height: 1,
            timestamp,
        }
    }

    fn file(pin_id: &str, first: &str, timestamp: u64) -> FileRecord {
        FileRecord {
            first_pin_id: first.into(),
            first_path: "/file".into(),
            pin_id: pin_id.into(),
            txid: pin_id.trim_end_matches("i0").into(),
            vout: 0,
            path: "/file".into(),
            operation: Operation::Create,
            content_type: "image/png".into(),
            file_type: "image".into(),
            extension: ".png".into(),
            name: String::new(),
            size: 5,
            md5: "m".into(),
            sha256: "s".into(),
            storage_type: "local".into(),
            storage_path: format!("indexer/btc/{pin_id}.png"),
            compressed: false,
            chain: ChainKind::Btc,
            height: 1,
            timestamp,
            creator_metaid: "cm".into(),
            creator_address: "ca".into(),
            owner_metaid: "om".into(),
            owner_address: "oa".into(),
            status: RecordStatus::Complete,
        }
    }

    fn user(metaid: &str, pin_id: &str, timestamp: u64) -> UserInfoRecord {
        UserInfoRecord {
            metaid: metaid.into(),
            address: "addr".into(),
            pin_id: pin_id.into(),
            value: "alice".into(),
            content_type: "text/plain".into(),
            chain: ChainKind::Mvc,
            height: 1,
            timestamp,
        }
    }

    #[test]
    fn pin_info_latest_wins_with_reobservation_exception() {
        let (_d, store) = open();
        assert!(store.save_pin_info(&pin("p1", 1000, Operation::Create)).unwrap());
        // Older write loses.
        assert!(!store.save_pin_info(&pin("p1", 500, Operation::Modify)).unwrap());
        // Equal timestamp, same operation loses.
        assert!(!store.save_pin_info(&pin("p1", 1000, Operation::Create)).unwrap());
        // Equal timestamp, different operation wins (same-block re-observation).
        assert!(store.save_pin_info(&pin("p1", 1000, Operation::Modify)).unwrap());
        // Strictly newer wins.
        assert!(store.save_pin_info(&pin("p1", 2000, Operation::Modify)).unwrap());
        assert_eq!(store.get_pin_info("p1").unwrap().unwrap().timestamp, 2000);
    }

    #[test]
    fn file_latest_pointer_never_moves_backwards() {
        let (_d, store) = open();
        store.save_file(&file("t1i0", "t0i0", 2000)).unwrap();
        store.save_file(&file("t0i0", "t0i0", 1000)).unwrap();
        let latest = store.get_latest_file("t0i0").unwrap().unwrap();
        assert_eq!(latest.pin_id, "t1i0");
        // History carries both, newest first.
        let history = store.file_history("t0i0").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].pin_id, "t1i0");
        assert_eq!(history[1].pin_id, "t0i0");
    }

    #[test]
    fn history_deduplicates_by_pin() {
        let (_d, store) = open();
        store.save_file(&file("t0i0", "t0i0", 1000)).unwrap();
        store.save_file(&file("t0i0", "t0i0", 1000)).unwrap();
        assert_eq!(store.file_history("t0i0").unwrap().len(), 1);
    }

    #[test]
    fn user_latest_matches_history_maximum() {
        let (_d, store) = open();
        for (pin_id, ts) in [("p1", 1000), ("p3", 3000), ("p2", 2000)] {
            store
                .save_user_info(UserInfoFamily::Name, &user("m1", pin_id, ts))
                .unwrap();
        }
        let latest = store.get_user_latest(UserInfoFamily::Name, "m1").unwrap().unwrap();
        let history = store.user_history(UserInfoFamily::Name, "m1").unwrap();
        assert_eq!(latest.timestamp, 3000);
        assert_eq!(
            latest.timestamp,
            history.iter().map(|h| h.timestamp).max().unwrap()
        );
        // Newest first.
        assert_eq!(history[0].pin_id, "p3");
    }

    #[test]
    fn metaid_address_is_bidirectional() {
        let (_d, store) = open();
        store.save_metaid_address("meta1", "addr1").unwrap();
        assert_eq!(store.get_address_by_metaid("meta1").unwrap().unwrap(), "addr1");
        assert_eq!(store.get_metaid_by_address("addr1").unwrap().unwrap(), "meta1");
    }

    #[test]
    fn metaid_timestamp_keeps_earliest_only() {
        let (_d, store) = open();
        store.save_metaid_timestamp("m1", 5000).unwrap();
        store.save_metaid_timestamp("m1", 9000).unwrap(); // later, ignored
        store.save_metaid_timestamp("m2", 7000).unwrap();
        store.save_metaid_timestamp("m1", 1000).unwrap(); // earlier, replaces
        assert_eq!(
            store.list_users_chronological(10).unwrap(),
            vec!["m1".to_string(), "m2".to_string()]
        );
    }

    #[test]
    fn chunk_backfill_then_late_chunk_keeps_parent() {
        let (_d, store) = open();
        // Index record seen first: creates a pending placeholder.
        let placeholder = store
            .backfill_chunk_parent("c1", "idx0", 0, ChainKind::Btc)
            .unwrap();
        assert_eq!(placeholder.status, RecordStatus::Pending);

        // Chunk payload arrives later without parent info.
        let stored = store
            .save_chunk(&ChunkRecord {
                pin_id: "c1".into(),
                parent_pin_id: String::new(),
                chunk_index: 0,
                size: 100,
                md5: "h".into(),
                compressed: false,
                storage_path: "indexer/chunk/btc/t/c1".into(),
                chain: ChainKind::Btc,
                height: 3,
                status: RecordStatus::Complete,
            })
            .unwrap();
        assert_eq!(stored.parent_pin_id, "idx0");
        let by_parent = store.chunks_for_parent("idx0").unwrap();
        assert_eq!(by_parent.len(), 1);
        assert_eq!(by_parent[0].size, 100);
    }

    #[test]
    fn sync_height_is_monotone_without_explicit_rewind() {
        let (_d, store) = open();
        store.advance_sync_height(ChainKind::Doge, 10, 1).unwrap();
        store.advance_sync_height(ChainKind::Doge, 8, 2).unwrap();
        assert_eq!(
            store.get_sync_status(ChainKind::Doge).unwrap().unwrap().current_sync_height,
            10
        );
        store.set_sync_height(ChainKind::Doge, 8, 3).unwrap();
        assert_eq!(
            store.get_sync_status(ChainKind::Doge).unwrap().unwrap().current_sync_height,
            8
        );
    }

    #[test]
    fn counters_accumulate() {
        let (_d, store) = open();
        store.save_file(&file("t0i0", "t0i0", 1000)).unwrap();
        store.save_file(&file("t0i0", "t0i0", 1000)).unwrap(); // same pin, not recounted
        store.save_file(&file("t1i0", "t0i0", 2000)).unwrap();
        assert_eq!(store.get_counter("file_count").unwrap(), 2);
    }
}
