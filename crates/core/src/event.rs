//! Block events: the unit of work flowing from scanners through the
//! coordinator into the materializer.

use crate::coordinator::CompletionGuard;
use crate::rpc::ChainRpc;
use async_trait::async_trait;
use metafs_types::tx::RawBlock;
use metafs_types::ChainKind;
use std::fmt;
use std::sync::Arc;

/// Block body carried by an event. Large blocks are emitted lazily so the
/// queue never holds their full payload.
pub enum BlockPayload {
    Full(RawBlock),
    Lazy {
        txids: Vec<String>,
        fetcher: Arc<dyn ChainRpc>,
    },
}

impl BlockPayload {
    pub fn tx_count(&self) -> usize {
        match self {
            BlockPayload::Full(block) => block.tx.len(),
            BlockPayload::Lazy { txids, .. } => txids.len(),
        }
    }
}

impl fmt::Debug for BlockPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPayload::Full(block) => f
                .debug_struct("Full")
                .field("hash", &block.hash)
                .field("txs", &block.tx.len())
                .finish(),
            BlockPayload::Lazy { txids, .. } => f
                .debug_struct("Lazy")
                .field("txs", &txids.len())
                .finish_non_exhaustive(),
        }
    }
}

/// One scanned block. Created by a scanner, owned by the coordinator until
/// materialized. The payload is taken by the materializer so the memory is
/// reclaimable the moment handling starts, and the attached completion guard
/// releases the admission slots when the event is dropped, on every path.
#[derive(Debug)]
pub struct BlockEvent {
    pub chain: ChainKind,
    pub height: u64,
    /// Header timestamp normalized to milliseconds.
    pub timestamp_ms: u64,
    pub tx_count: usize,
    payload: Option<BlockPayload>,
    _completion: Option<CompletionGuard>,
}

impl BlockEvent {
    pub fn new(chain: ChainKind, height: u64, timestamp_ms: u64, payload: BlockPayload) -> Self {
        Self {
            chain,
            height,
            timestamp_ms,
            tx_count: payload.tx_count(),
            payload: Some(payload),
            _completion: None,
        }
    }

    pub fn attach_completion(&mut self, guard: CompletionGuard) {
        self._completion = Some(guard);
    }

    /// Hands the payload to the caller, leaving the event empty.
    pub fn take_payload(&mut self) -> Option<BlockPayload> {
        self.payload.take()
    }
}

/// Consumer of dispatched block events; implemented by the materializer.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn handle_event(&self, event: BlockEvent) -> anyhow::Result<()>;
}
