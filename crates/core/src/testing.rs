//! Shared helpers for the crate's tests: an in-memory chain back-end, an
//! in-memory blob store, script builders and counting handlers.

use crate::blob::{BlobError, BlobStore};
use crate::event::{BlockEvent, BlockHandler};
use crate::materializer::Materializer;
use crate::rpc::{ChainRpc, RpcError};
use crate::scanner::MempoolTxHandler;
use async_trait::async_trait;
use metafs_store::{IndexStore, KvStore};
use metafs_types::tx::{BlockMeta, RawBlock, RawTransaction, ScriptPubKey, TxOut};
use metafs_types::ChainKind;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Builds a script from raw pushes, choosing the narrowest push opcode.
pub fn push_script(pushes: &[Vec<u8>]) -> Vec<u8> {
    let mut script = vec![0x00, 0x6a]; // OP_FALSE OP_RETURN
    for push in pushes {
        match push.len() {
            0..=75 => script.push(push.len() as u8),
            76..=255 => {
                script.push(0x4c);
                script.push(push.len() as u8);
            }
            _ => {
                script.push(0x4d);
                script.extend_from_slice(&(push.len() as u16).to_le_bytes());
            }
        }
        script.extend_from_slice(push);
    }
    script
}

/// A one-output transaction carrying a MetaID envelope.
pub fn protocol_tx(
    txid: &str,
    address: &str,
    operation: &str,
    path: &str,
    content_type: &str,
    payload: &[u8],
) -> RawTransaction {
    let mut pushes = vec![
        b"metaid".to_vec(),
        operation.as_bytes().to_vec(),
        path.as_bytes().to_vec(),
        b"0".to_vec(),
        b"1.0.0".to_vec(),
        content_type.as_bytes().to_vec(),
    ];
    for piece in payload.chunks(520) {
        pushes.push(piece.to_vec());
    }
    if payload.is_empty() {
        pushes.push(Vec::new());
    }
    RawTransaction {
        txid: txid.to_string(),
        vin: vec![],
        vout: vec![TxOut {
            value: 0.0,
            n: 0,
            script_pub_key: ScriptPubKey {
                hex: hex::encode(push_script(&pushes)),
                address: Some(address.to_string()),
                addresses: vec![],
            },
        }],
    }
}

/// Block with header time in seconds, as the RPC returns it.
pub fn raw_block(height: u64, time_secs: u64, tx: Vec<RawTransaction>) -> RawBlock {
    RawBlock {
        hash: format!("hash-{height}"),
        height,
        time: time_secs,
        tx,
    }
}

/// In-memory chain back-end.
pub struct MockChain {
    chain: ChainKind,
    blocks: Mutex<BTreeMap<u64, RawBlock>>,
    txs: Mutex<HashMap<String, RawTransaction>>,
    mempool: Mutex<Vec<String>>,
    block_load_failures: AtomicUsize,
    block_load_corruptions: AtomicUsize,
}

impl MockChain {
    pub fn new(chain: ChainKind) -> Self {
        Self {
            chain,
            blocks: Mutex::new(BTreeMap::new()),
            txs: Mutex::new(HashMap::new()),
            mempool: Mutex::new(Vec::new()),
            block_load_failures: AtomicUsize::new(0),
            block_load_corruptions: AtomicUsize::new(0),
        }
    }

    pub fn chain_kind(&self) -> ChainKind {
        self.chain
    }

    pub fn add_block(&self, block: RawBlock) {
        let mut txs = self.txs.lock().unwrap();
        for tx in &block.tx {
            txs.insert(tx.txid.clone(), tx.clone());
        }
        self.blocks.lock().unwrap().insert(block.height, block);
    }

    /// Registers a transaction in the mempool (and the tx map).
    pub fn add_mempool_tx(&self, tx: RawTransaction) {
        self.mempool.lock().unwrap().push(tx.txid.clone());
        self.txs.lock().unwrap().insert(tx.txid.clone(), tx);
    }

    /// Makes the next `n` block loads fail with a transient error.
    pub fn fail_next_block_loads(&self, n: usize) {
        self.block_load_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` block loads fail with a non-transient decode
    /// error, as if the node returned garbage.
    pub fn corrupt_next_block_loads(&self, n: usize) {
        self.block_load_corruptions.store(n, Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<(), RpcError> {
        let remaining = self.block_load_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.block_load_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RpcError::Node {
                code: -28,
                message: "loading block index".into(),
            });
        }
        let corrupted = self.block_load_corruptions.load(Ordering::SeqCst);
        if corrupted > 0 {
            self.block_load_corruptions.store(corrupted - 1, Ordering::SeqCst);
            let decode_err = serde_json::from_str::<u64>("not a block").unwrap_err();
            return Err(RpcError::Decode(decode_err));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    fn chain(&self) -> ChainKind {
        self.chain
    }

    async fn get_block_count(&self) -> Result<u64, RpcError> {
        self.blocks
            .lock()
            .unwrap()
            .keys()
            .next_back()
            .copied()
            .ok_or(RpcError::EmptyResult("getblockcount"))
    }

    async fn get_block(&self, height: u64) -> Result<RawBlock, RpcError> {
        self.maybe_fail()?;
        self.blocks
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .ok_or(RpcError::Node {
                code: -8,
                message: format!("block height {height} out of range"),
            })
    }

    async fn get_block_meta(&self, height: u64) -> Result<BlockMeta, RpcError> {
        self.maybe_fail()?;
        let blocks = self.blocks.lock().unwrap();
        let block = blocks.get(&height).ok_or(RpcError::Node {
            code: -8,
            message: format!("block height {height} out of range"),
        })?;
        Ok(BlockMeta {
            hash: block.hash.clone(),
            height: block.height,
            time: block.time,
            tx: block.tx.iter().map(|tx| tx.txid.clone()).collect(),
        })
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, RpcError> {
        self.txs
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or(RpcError::Node {
                code: -5,
                message: format!("no such transaction {txid}"),
            })
    }

    async fn get_raw_mempool(&self) -> Result<Vec<String>, RpcError> {
        Ok(self.mempool.lock().unwrap().clone())
    }
}

/// In-memory blob store with optional fault injection.
#[derive(Default)]
pub struct MemoryBlobStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn fail_next_puts(&self, n: usize) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let remaining = self.fail_puts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_puts.store(remaining - 1, Ordering::SeqCst);
            return Err(BlobError::Io(std::io::Error::other("injected blob failure")));
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::Io(std::io::Error::other(format!("no blob at {path}"))))
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

/// Records every dispatched event's (timestamp, height).
#[derive(Default)]
pub struct CountingHandler {
    seen: Mutex<Vec<(u64, u64)>>,
}

impl CountingHandler {
    pub fn dispatched(&self) -> Vec<u64> {
        self.seen.lock().unwrap().iter().map(|(ts, _)| *ts).collect()
    }

    pub fn dispatched_heights(&self) -> Vec<u64> {
        self.seen.lock().unwrap().iter().map(|(_, h)| *h).collect()
    }
}

#[async_trait]
impl BlockHandler for CountingHandler {
    async fn handle_event(&self, event: BlockEvent) -> anyhow::Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push((event.timestamp_ms, event.height));
        Ok(())
    }
}

/// Records mempool callbacks as (txid, height, timestamp).
#[derive(Default)]
pub struct RecordingMempool {
    seen: Mutex<Vec<(String, u64, u64)>>,
}

impl RecordingMempool {
    pub fn seen(&self) -> Vec<(String, u64, u64)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl MempoolTxHandler for RecordingMempool {
    async fn handle_mempool_tx(
        &self,
        chain: ChainKind,
        tx: RawTransaction,
        height: u64,
        timestamp_ms: u64,
    ) {
        let _ = chain;
        self.seen
            .lock()
            .unwrap()
            .push((tx.txid, height, timestamp_ms));
    }
}

/// A materializer over a temp store and an in-memory blob store.
pub fn test_materializer() -> (tempfile::TempDir, Arc<MemoryBlobStore>, Materializer) {
    let dir = tempfile::tempdir().unwrap();
    let kv = KvStore::open(dir.path()).unwrap();
    let store = IndexStore::open(&kv).unwrap();
    let blob = Arc::new(MemoryBlobStore::default());
    let materializer = Materializer::new(store, blob.clone());
    (dir, blob, materializer)
}
