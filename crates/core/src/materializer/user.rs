//! User-profile materialization: name, avatar and chat-public-key families.

use super::{transform_payload, MaterializeError, Materializer};
use crate::blob::avatar_blob_path;
use crate::parser::MetaIdRecord;
use metafs_common::sniff;
use metafs_store::UserInfoFamily;
use metafs_types::protocol::metaid_for_address;
use metafs_types::record::UserInfoRecord;

impl Materializer {
    pub(super) async fn handle_user(
        &self,
        family: UserInfoFamily,
        record: &MetaIdRecord,
    ) -> Result<(), MaterializeError> {
        let address = if record.creator_address.is_empty() {
            &record.owner_address
        } else {
            &record.creator_address
        };
        if address.is_empty() {
            tracing::warn!(pin = %record.pin_id, "user record without a resolvable address");
            return Ok(());
        }
        let metaid = metaid_for_address(address);

        let (payload, _) = transform_payload(record);
        let (value, content_type) = match family {
            // Avatars are binary: persist the blob and store its path.
            UserInfoFamily::Avatar => {
                let detected = sniff::detect_content_type(&payload);
                let content_type = sniff::choose_content_type(detected, &record.content_type);
                let extension = sniff::extension_for_content_type(&content_type)
                    .unwrap_or_default()
                    .to_string();
                let storage_path =
                    avatar_blob_path(record.chain, &record.txid, &record.pin_id, &extension);
                self.blob.put(&storage_path, &payload).await?;
                (storage_path, content_type)
            }
            // Names and chat keys are short text values.
            UserInfoFamily::Name | UserInfoFamily::ChatKey => (
                String::from_utf8_lossy(&payload).into_owned(),
                record.content_type.clone(),
            ),
        };

        self.store.save_user_info(
            family,
            &UserInfoRecord {
                metaid: metaid.clone(),
                address: address.clone(),
                pin_id: record.pin_id.clone(),
                value,
                content_type,
                chain: record.chain,
                height: record.height,
                timestamp: record.timestamp_ms,
            },
        )?;
        self.store.save_metaid_address(&metaid, address)?;
        self.store
            .save_metaid_timestamp(&metaid, record.timestamp_ms)?;
        Ok(())
    }
}
