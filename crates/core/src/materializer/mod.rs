//! Turns parsed protocol records into versioned rows and blobs.
//!
//! Per record: resolve the first-PIN identity, gate on the recognized path
//! set, write the pin reference row, then classify into the chunk / index /
//! file / user paths. All latest-wins and dedup rules live in the store, so
//! replaying a block is idempotent here by construction.

mod assemble;
mod chunk;
mod file;
mod user;

use crate::blob::{BlobError, BlobStore};
use crate::event::{BlockEvent, BlockHandler, BlockPayload};
use crate::parser::{self, MetaIdRecord};
use crate::rpc::ChainRpc;
use crate::scanner::MempoolTxHandler;
use async_trait::async_trait;
use metafs_common::clock::now_ms;
use metafs_common::compress::{inflate_if_gzip, is_gzip};
use metafs_store::{IndexStore, StoreError, UserInfoFamily};
use metafs_types::protocol::{self, Operation};
use metafs_types::record::PinInfo;
use metafs_types::tx::RawTransaction;
use metafs_types::ChainKind;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("blob: {0}")]
    Blob(#[from] BlobError),
}

/// Handling path for a record, decided by first-path and content type.
#[derive(Debug, PartialEq)]
enum RecordClass {
    Chunk,
    Index,
    File,
    User(UserInfoFamily),
}

fn classify(first_path: &str, content_type: &str) -> Option<RecordClass> {
    let path = first_path.to_ascii_lowercase();
    let ct = content_type.to_ascii_lowercase();
    if (path == protocol::PATH_FILE_CHUNK || path == protocol::PATH_FILE_CHUNK_ALT)
        && ct.starts_with("metafile/chunk")
    {
        return Some(RecordClass::Chunk);
    }
    if path == protocol::PATH_FILE_INDEX && ct.starts_with("metafile/index") {
        return Some(RecordClass::Index);
    }
    match path.as_str() {
        protocol::PATH_INFO_NAME => Some(RecordClass::User(UserInfoFamily::Name)),
        protocol::PATH_INFO_AVATAR => Some(RecordClass::User(UserInfoFamily::Avatar)),
        protocol::PATH_INFO_CHATKEY | protocol::PATH_INFO_CHATKEY_ALT => {
            Some(RecordClass::User(UserInfoFamily::ChatKey))
        }
        _ if path == protocol::PATH_FILE || path.starts_with("/file/") => Some(RecordClass::File),
        _ => None,
    }
}

/// Applies the transparent payload transforms: gzip detection with fallback
/// to the original bytes on inflate failure.
fn transform_payload(record: &MetaIdRecord) -> (Vec<u8>, bool) {
    match inflate_if_gzip(&record.payload) {
        Some(inflated) => (inflated, true),
        None => {
            if is_gzip(&record.payload) {
                tracing::warn!(
                    pin = %record.pin_id,
                    "gzip payload failed to inflate; keeping original bytes"
                );
            }
            (record.payload.clone(), false)
        }
    }
}

pub struct Materializer {
    store: IndexStore,
    blob: Arc<dyn BlobStore>,
    rpcs: HashMap<ChainKind, Arc<dyn ChainRpc>>,
}

impl Materializer {
    pub fn new(store: IndexStore, blob: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            blob,
            rpcs: HashMap::new(),
        }
    }

    /// Wires the per-chain RPC clients used for creator-lineage lookups.
    pub fn with_rpcs(mut self, rpcs: HashMap<ChainKind, Arc<dyn ChainRpc>>) -> Self {
        self.rpcs = rpcs;
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Inherits the first-PIN identity from a `@<pinID>` reference, or
    /// defaults to self. Unresolvable references warn and self-default; the
    /// resulting `@...` first-path then fails the protocol gate.
    fn resolve_first(&self, record: &MetaIdRecord) -> Result<(String, String), StoreError> {
        if let Some(referenced) = protocol::parse_pin_reference(&record.path) {
            if let Some(info) = self.store.get_pin_info(referenced)? {
                return Ok((info.first_pin_id, info.first_path));
            }
            tracing::warn!(
                pin = %record.pin_id,
                referenced = %referenced,
                "referenced pin not found; treating record as its own origin"
            );
        }
        Ok((record.pin_id.clone(), record.path.clone()))
    }

    /// Materializes one record end to end.
    pub async fn apply_record(&self, record: &MetaIdRecord) -> Result<(), MaterializeError> {
        let (first_pin_id, first_path) = self.resolve_first(record)?;
        if !protocol::is_recognized_path(&first_path) {
            tracing::debug!(pin = %record.pin_id, path = %first_path, "unrecognized protocol path");
            return Ok(());
        }

        self.store.save_pin_info(&PinInfo {
            pin_id: record.pin_id.clone(),
            first_pin_id: first_pin_id.clone(),
            first_path: first_path.clone(),
            path: record.path.clone(),
            operation: record.operation,
            content_type: record.content_type.clone(),
            chain: record.chain,
            height: record.height,
            timestamp: record.timestamp_ms,
        })?;

        match classify(&first_path, &record.content_type) {
            Some(RecordClass::Chunk) => self.handle_chunk(record).await,
            Some(RecordClass::Index) => {
                self.handle_index(record, &first_pin_id, &first_path).await
            }
            Some(RecordClass::File) => self.handle_file(record, &first_pin_id, &first_path).await,
            Some(RecordClass::User(family)) => self.handle_user(family, record).await,
            None => Ok(()),
        }
    }

    /// Parses and materializes every record of one transaction. A blob
    /// failure aborts only the offending record; store failures propagate.
    async fn process_transaction(
        &self,
        chain: ChainKind,
        tx: &RawTransaction,
        height: u64,
        timestamp_ms: u64,
    ) -> Result<(), MaterializeError> {
        let mut records = parser::parse_transaction(chain, tx, height, timestamp_ms);
        for record in &mut records {
            if record.operation != Operation::Create {
                if let Some(rpc) = self.rpcs.get(&record.chain) {
                    parser::resolve_creator(record, rpc.as_ref()).await;
                }
            }
            match self.apply_record(record).await {
                Ok(()) => {}
                Err(MaterializeError::Blob(err)) => {
                    tracing::error!(
                        pin = %record.pin_id,
                        %err,
                        "blob write failed; record aborted (recoverable via rescan)"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlockHandler for Materializer {
    async fn handle_event(&self, mut event: BlockEvent) -> anyhow::Result<()> {
        let (chain, height, timestamp_ms) = (event.chain, event.height, event.timestamp_ms);
        // Taking the payload makes the block body reclaimable as soon as we
        // are done with it, while the admission slots stay held.
        let txs = match event.take_payload() {
            Some(BlockPayload::Full(block)) => block.tx,
            Some(BlockPayload::Lazy { txids, fetcher }) => {
                let mut txs = Vec::with_capacity(txids.len());
                for txid in &txids {
                    match fetcher.get_raw_transaction(txid).await {
                        Ok(tx) => txs.push(tx),
                        Err(err) => tracing::warn!(
                            chain = %chain,
                            txid = %txid,
                            %err,
                            "lazy transaction fetch failed; skipping"
                        ),
                    }
                }
                txs
            }
            None => Vec::new(),
        };
        for tx in &txs {
            self.process_transaction(chain, tx, height, timestamp_ms)
                .await?;
        }
        self.store.advance_sync_height(chain, height, now_ms())?;
        tracing::debug!(chain = %chain, height, txs = txs.len(), "block materialized");
        Ok(())
    }
}

#[async_trait]
impl MempoolTxHandler for Materializer {
    async fn handle_mempool_tx(
        &self,
        chain: ChainKind,
        tx: RawTransaction,
        height: u64,
        timestamp_ms: u64,
    ) {
        if let Err(err) = self
            .process_transaction(chain, &tx, height, timestamp_ms)
            .await
        {
            tracing::error!(chain = %chain, txid = %tx.txid, %err, "mempool transaction failed");
        }
    }
}

#[cfg(test)]
mod tests;
