//! Index records and multi-chunk file assembly.
//!
//! The index payload is a JSON descriptor naming the chunk PINs and their
//! hashes. Its context is parked in the blob store so that a late chunk
//! arrival can finish the assembly without re-observing the index record.

use super::{transform_payload, MaterializeError, Materializer};
use crate::blob::{file_blob_path, index_context_path};
use crate::parser::MetaIdRecord;
use metafs_common::hash::{md5_hex, sha256_hex};
use metafs_common::sniff;
use metafs_types::protocol::metaid_for_address;
use metafs_types::record::{FileRecord, IndexDescriptor, RecordStatus};
use metafs_types::{ChainKind, Operation};
use serde::{Deserialize, Serialize};

/// Everything needed to write the assembled file row once the last chunk
/// arrives, captured at index-record time.
#[derive(Debug, Serialize, Deserialize)]
struct IndexContext {
    pin_id: String,
    txid: String,
    vout: u32,
    first_pin_id: String,
    first_path: String,
    path: String,
    operation: Operation,
    chain: ChainKind,
    height: u64,
    timestamp_ms: u64,
    creator_address: String,
    owner_address: String,
    descriptor: IndexDescriptor,
}

impl Materializer {
    pub(super) async fn handle_index(
        &self,
        record: &MetaIdRecord,
        first_pin_id: &str,
        first_path: &str,
    ) -> Result<(), MaterializeError> {
        let (payload, _) = transform_payload(record);
        let descriptor: IndexDescriptor = match serde_json::from_slice(&payload) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                tracing::warn!(pin = %record.pin_id, %err, "malformed index descriptor; skipping");
                return Ok(());
            }
        };

        for (ordinal, chunk_ref) in descriptor.chunk_list.iter().enumerate() {
            self.store.backfill_chunk_parent(
                &chunk_ref.pin_id,
                &record.pin_id,
                ordinal as u64,
                record.chain,
            )?;
        }

        let context = IndexContext {
            pin_id: record.pin_id.clone(),
            txid: record.txid.clone(),
            vout: record.vout,
            first_pin_id: first_pin_id.to_string(),
            first_path: first_path.to_string(),
            path: record.path.clone(),
            operation: record.operation,
            chain: record.chain,
            height: record.height,
            timestamp_ms: record.timestamp_ms,
            creator_address: record.creator_address.clone(),
            owner_address: record.owner_address.clone(),
            descriptor,
        };
        let context_bytes =
            serde_json::to_vec(&context).map_err(metafs_store::StoreError::from)?;
        self.blob
            .put(&index_context_path(record.chain, &record.pin_id), &context_bytes)
            .await?;

        self.try_assemble(&record.pin_id).await
    }

    /// Assembles the full file for an index PIN if, and only if, every
    /// listed chunk has been materialized. Safe to call repeatedly.
    pub(super) async fn try_assemble(&self, index_pin_id: &str) -> Result<(), MaterializeError> {
        // No pin row means the index record itself has not been seen.
        let Some(index_pin) = self.store.get_pin_info(index_pin_id)? else {
            return Ok(());
        };
        let context_path = index_context_path(index_pin.chain, index_pin_id);
        let context: IndexContext = match self.blob.get(&context_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(context) => context,
                Err(err) => {
                    tracing::warn!(pin = %index_pin_id, %err, "unreadable index context");
                    return Ok(());
                }
            },
            Err(_) => return Ok(()),
        };

        let mut chunks = Vec::with_capacity(context.descriptor.chunk_list.len());
        for chunk_ref in &context.descriptor.chunk_list {
            match self.store.get_chunk(&chunk_ref.pin_id)? {
                Some(chunk)
                    if chunk.status == RecordStatus::Complete
                        && !chunk.storage_path.is_empty() =>
                {
                    chunks.push(chunk)
                }
                _ => return Ok(()), // a chunk is still missing
            }
        }

        let mut merged = Vec::with_capacity(context.descriptor.file_size as usize);
        for chunk in &chunks {
            merged.extend(self.blob.get(&chunk.storage_path).await?);
        }

        let sha256 = sha256_hex(&merged);
        if sha256 != context.descriptor.sha256 {
            tracing::warn!(
                pin = %context.pin_id,
                expected = %context.descriptor.sha256,
                actual = %sha256,
                "assembled file hash mismatch; writing anyway"
            );
        }

        let detected = sniff::detect_content_type(&merged);
        let content_type = sniff::choose_content_type(detected, &context.descriptor.data_type);
        let extension = sniff::extension_from_path(&context.descriptor.name)
            .or_else(|| sniff::extension_for_content_type(&content_type).map(str::to_string))
            .unwrap_or_default();
        let storage_path = file_blob_path(context.chain, &context.pin_id, &extension);
        self.blob.put(&storage_path, &merged).await?;

        self.store.save_file(&FileRecord {
            first_pin_id: context.first_pin_id.clone(),
            first_path: context.first_path.clone(),
            pin_id: context.pin_id.clone(),
            txid: context.txid.clone(),
            vout: context.vout,
            path: context.path.clone(),
            operation: context.operation,
            content_type: content_type.clone(),
            file_type: sniff::FileKind::from_content_type(&content_type).to_string(),
            extension,
            name: context.descriptor.name.clone(),
            size: merged.len() as u64,
            md5: md5_hex(&merged),
            sha256,
            storage_type: self.blob.kind().to_string(),
            storage_path,
            compressed: false,
            chain: context.chain,
            height: context.height,
            timestamp: context.timestamp_ms,
            creator_metaid: metaid_for_address(&context.creator_address),
            creator_address: context.creator_address.clone(),
            owner_metaid: metaid_for_address(&context.owner_address),
            owner_address: context.owner_address.clone(),
            status: RecordStatus::Complete,
        })?;
        tracing::info!(
            pin = %context.pin_id,
            chunks = chunks.len(),
            size = merged.len(),
            "assembled multi-chunk file"
        );
        Ok(())
    }
}
