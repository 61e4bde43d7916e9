//! Single-chunk file materialization.

use super::{transform_payload, MaterializeError, Materializer};
use crate::blob::file_blob_path;
use crate::parser::MetaIdRecord;
use metafs_common::hash::{md5_hex, sha256_hex};
use metafs_common::sniff;
use metafs_types::protocol::{metaid_for_address, Operation};
use metafs_types::record::{FileRecord, RecordStatus};

impl Materializer {
    pub(super) async fn handle_file(
        &self,
        record: &MetaIdRecord,
        first_pin_id: &str,
        first_path: &str,
    ) -> Result<(), MaterializeError> {
        let (payload, compressed) = transform_payload(record);

        let detected = sniff::detect_content_type(&payload);
        let content_type = sniff::choose_content_type(detected, &record.content_type);
        let extension = sniff::extension_from_path(&record.path)
            .or_else(|| sniff::extension_from_path(first_path))
            .or_else(|| {
                sniff::extension_for_content_type(&content_type).map(str::to_string)
            })
            .unwrap_or_default();
        let file_type = sniff::FileKind::from_content_type(&content_type);

        let storage_path = file_blob_path(record.chain, &record.pin_id, &extension);
        self.blob.put(&storage_path, &payload).await?;

        let name = record
            .path
            .rsplit('/')
            .next()
            .filter(|segment| segment.contains('.'))
            .unwrap_or_default()
            .to_string();

        self.store.save_file(&FileRecord {
            first_pin_id: first_pin_id.to_string(),
            first_path: first_path.to_string(),
            pin_id: record.pin_id.clone(),
            txid: record.txid.clone(),
            vout: record.vout,
            path: record.path.clone(),
            operation: record.operation,
            content_type,
            file_type: file_type.to_string(),
            extension,
            name,
            size: payload.len() as u64,
            md5: md5_hex(&payload),
            sha256: sha256_hex(&payload),
            storage_type: self.blob.kind().to_string(),
            storage_path,
            compressed,
            chain: record.chain,
            height: record.height,
            timestamp: record.timestamp_ms,
            creator_metaid: metaid_for_address(&record.creator_address),
            creator_address: record.creator_address.clone(),
            owner_metaid: metaid_for_address(&record.owner_address),
            owner_address: record.owner_address.clone(),
            status: if record.operation == Operation::Revoke {
                RecordStatus::Revoked
            } else {
                RecordStatus::Complete
            },
        })?;
        Ok(())
    }
}
