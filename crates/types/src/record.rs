//! Records persisted by the index store.
//!
//! Everything is stored as JSON; field names are part of the on-disk contract
//! and must stay stable across releases (migrations handle additions).

use crate::chain::ChainKind;
use crate::protocol::Operation;
use crate::serde_helpers::u64_lossy;
use serde::{Deserialize, Serialize};

/// Reference row for every observed PIN, consulted when later records modify
/// or revoke it via `@<pinID>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinInfo {
    pub pin_id: String,
    pub first_pin_id: String,
    pub first_path: String,
    pub path: String,
    pub operation: Operation,
    pub content_type: String,
    pub chain: ChainKind,
    pub height: u64,
    pub timestamp: u64,
}

/// Status of a materialized row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Fully materialized, payload persisted.
    Complete,
    /// Placeholder written ahead of its payload (index-listed chunk that has
    /// not been observed yet).
    Pending,
    /// Logically deleted by a revoke record.
    Revoked,
}

/// A single-chunk file or an assembled multi-chunk file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub first_pin_id: String,
    pub first_path: String,
    pub pin_id: String,
    pub txid: String,
    pub vout: u32,
    pub path: String,
    pub operation: Operation,
    pub content_type: String,
    /// High-level kind: image / video / audio / text / document / archive /
    /// data / other.
    pub file_type: String,
    pub extension: String,
    pub name: String,
    pub size: u64,
    pub md5: String,
    pub sha256: String,
    pub storage_type: String,
    pub storage_path: String,
    pub compressed: bool,
    pub chain: ChainKind,
    pub height: u64,
    pub timestamp: u64,
    pub creator_metaid: String,
    pub creator_address: String,
    pub owner_metaid: String,
    pub owner_address: String,
    pub status: RecordStatus,
}

/// One raw chunk of a multi-chunk file. Orphaned (`parent_pin_id` empty)
/// until its index record is materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub pin_id: String,
    #[serde(default)]
    pub parent_pin_id: String,
    #[serde(default)]
    pub chunk_index: u64,
    pub size: u64,
    pub md5: String,
    pub compressed: bool,
    pub storage_path: String,
    pub chain: ChainKind,
    pub height: u64,
    pub status: RecordStatus,
}

/// A user-info row: one of the name / avatar / chat-public-key families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfoRecord {
    pub metaid: String,
    pub address: String,
    pub pin_id: String,
    /// Display value: the name itself, the chat public key, or the storage
    /// path of the avatar blob.
    pub value: String,
    pub content_type: String,
    pub chain: ChainKind,
    pub height: u64,
    pub timestamp: u64,
}

/// Per-chain scan cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub chain: ChainKind,
    pub current_sync_height: u64,
    pub updated_at: u64,
}

/// JSON descriptor embedded in a `/file/index` payload. Numeric fields are
/// lossy because some producers emit them as floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "dataType", default)]
    pub data_type: String,
    pub sha256: String,
    #[serde(rename = "fileSize", with = "u64_lossy")]
    pub file_size: u64,
    #[serde(rename = "chunkNumber", with = "u64_lossy")]
    pub chunk_number: u64,
    #[serde(rename = "chunkSize", with = "u64_lossy", default)]
    pub chunk_size: u64,
    #[serde(rename = "chunkList", default)]
    pub chunk_list: Vec<ChunkRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub sha256: String,
    #[serde(rename = "pinId")]
    pub pin_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_tolerates_float_counts() {
        let raw = r#"{
            "name": "video.mp4",
            "dataType": "video/mp4",
            "sha256": "aa",
            "fileSize": 150.0,
            "chunkNumber": 2.0,
            "chunkSize": 100,
            "chunkList": [
                {"sha256": "h1", "pinId": "p1"},
                {"sha256": "h2", "pinId": "p2"}
            ]
        }"#;
        let desc: IndexDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(desc.file_size, 150);
        assert_eq!(desc.chunk_number, 2);
        assert_eq!(desc.chunk_list[1].pin_id, "p2");
    }

    #[test]
    fn descriptor_requires_sha_and_size() {
        assert!(serde_json::from_str::<IndexDescriptor>(r#"{"name":"x"}"#).is_err());
    }

    #[test]
    fn records_round_trip_json() {
        let pin = PinInfo {
            pin_id: "ti0".into(),
            first_pin_id: "ti0".into(),
            first_path: "/file".into(),
            path: "/file".into(),
            operation: Operation::Create,
            content_type: "image/png".into(),
            chain: ChainKind::Btc,
            height: 7,
            timestamp: 1000,
        };
        let bytes = serde_json::to_vec(&pin).unwrap();
        assert_eq!(serde_json::from_slice::<PinInfo>(&bytes).unwrap(), pin);
    }
}
