//! Raw chunk materialization.
//!
//! A chunk is orphaned until its index record back-fills the parent linkage.
//! When a chunk lands whose parent is already known (index seen first), the
//! parent's assembly is re-attempted so arrival order does not matter.

use super::{transform_payload, MaterializeError, Materializer};
use crate::blob::chunk_blob_path;
use crate::parser::MetaIdRecord;
use metafs_common::hash::md5_hex;
use metafs_types::record::{ChunkRecord, RecordStatus};

impl Materializer {
    pub(super) async fn handle_chunk(&self, record: &MetaIdRecord) -> Result<(), MaterializeError> {
        let (payload, compressed) = transform_payload(record);

        let storage_path = chunk_blob_path(record.chain, &record.txid, &record.pin_id);
        self.blob.put(&storage_path, &payload).await?;

        let stored = self.store.save_chunk(&ChunkRecord {
            pin_id: record.pin_id.clone(),
            parent_pin_id: String::new(),
            chunk_index: 0,
            size: payload.len() as u64,
            md5: md5_hex(&payload),
            compressed,
            storage_path,
            chain: record.chain,
            height: record.height,
            status: RecordStatus::Complete,
        })?;

        if !stored.parent_pin_id.is_empty() {
            self.try_assemble(&stored.parent_pin_id).await?;
        }
        Ok(())
    }
}
