//! Per-chain block scanner.
//!
//! One scanner per chain, single worker each, so blocks are always emitted
//! in ascending height order. The scanner asks admission for every block
//! before loading it; transient failures retry the same height after the
//! poll interval, while a permanently malformed response skips that height
//! with an error (recoverable via rescan) so the chain keeps moving. Once
//! it first reaches the tip it sweeps the mempool and, when configured,
//! subscribes to the push channel.

use crate::coordinator::{AdmissionHandle, ChainTracker};
use crate::event::{BlockEvent, BlockHandler, BlockPayload};
use crate::rpc::{ChainRpc, RpcError};
use async_trait::async_trait;
use metafs_common::clock::now_ms;
use metafs_types::protocol::normalize_timestamp_ms;
use metafs_types::tx::RawTransaction;
use metafs_types::ChainKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Real-time transaction feed. The concrete socket library is an external
/// collaborator; anything able to yield raw transactions can be plugged in.
#[async_trait]
pub trait PushSource: Send + Sync {
    async fn subscribe(&self) -> mpsc::Receiver<RawTransaction>;
}

/// Receiver of unconfirmed transactions (mempool sweep and push channel),
/// invoked with a synthetic height of 0 and a wall-clock millisecond
/// timestamp.
#[async_trait]
pub trait MempoolTxHandler: Send + Sync {
    async fn handle_mempool_tx(
        &self,
        chain: ChainKind,
        tx: RawTransaction,
        height: u64,
        timestamp_ms: u64,
    );
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub chain: ChainKind,
    pub start_height: u64,
    pub poll_interval: Duration,
    /// Blocks with at least this many transactions are emitted lazily.
    pub lazy_tx_threshold: usize,
}

/// Wiring a scanner needs from the coordinator.
#[derive(Clone)]
pub struct ScanContext {
    pub admission: AdmissionHandle,
    pub events: mpsc::Sender<BlockEvent>,
    pub tracker: Arc<ChainTracker>,
    pub mempool: Option<Arc<dyn MempoolTxHandler>>,
}

#[derive(Clone)]
pub struct ChainScanner {
    cfg: Arc<ScannerConfig>,
    rpc: Arc<dyn ChainRpc>,
    push: Option<Arc<dyn PushSource>>,
}

impl ChainScanner {
    pub fn new(
        cfg: ScannerConfig,
        rpc: Arc<dyn ChainRpc>,
        push: Option<Arc<dyn PushSource>>,
    ) -> Self {
        Self {
            cfg: Arc::new(cfg),
            rpc,
            push,
        }
    }

    pub fn chain(&self) -> ChainKind {
        self.cfg.chain
    }

    /// Cheap tip query used by the sync-status reporter.
    pub async fn block_count(&self) -> Result<u64, RpcError> {
        self.rpc.get_block_count().await
    }

    /// Fetches one block and builds its event. Large blocks get a lazy
    /// payload: the txid list plus a fetcher, so the queue never holds the
    /// full body.
    pub async fn load_block(&self, height: u64) -> Result<BlockEvent, RpcError> {
        let meta = self.rpc.get_block_meta(height).await?;
        let timestamp_ms = normalize_timestamp_ms(meta.time);
        if meta.tx.len() >= self.cfg.lazy_tx_threshold {
            return Ok(BlockEvent::new(
                self.cfg.chain,
                height,
                timestamp_ms,
                BlockPayload::Lazy {
                    txids: meta.tx,
                    fetcher: self.rpc.clone(),
                },
            ));
        }
        let block = self.rpc.get_block(height).await?;
        Ok(BlockEvent::new(
            self.cfg.chain,
            height,
            timestamp_ms,
            BlockPayload::Full(block),
        ))
    }

    /// The block-scan primitive shared with the rescan controller: load one
    /// height and hand it straight to a handler, bypassing the queue.
    pub async fn scan_block(&self, height: u64, handler: &dyn BlockHandler) -> anyhow::Result<()> {
        let event = self.load_block(height).await?;
        handler.handle_event(event).await
    }

    /// Scan loop. Runs until shutdown; emitted events transfer ownership of
    /// the payload (and the held admission) to the coordinator.
    pub async fn run(self, ctx: ScanContext, mut shutdown: watch::Receiver<bool>) {
        let chain = self.cfg.chain;
        let mut cursor = self.cfg.start_height;
        let mut push_wired = false;
        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(chain = %chain, start = cursor, "scanner started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
            }

            let tip = match self.rpc.get_block_count().await {
                Ok(tip) => tip,
                Err(err) => {
                    tracing::warn!(chain = %chain, %err, "tip query failed; retrying");
                    continue;
                }
            };
            ctx.tracker.set_latest_height(chain, tip);

            while cursor <= tip {
                if *shutdown.borrow() {
                    return;
                }
                let Some(guard) = ctx.admission.admit(chain, &shutdown).await else {
                    return;
                };
                match self.load_block(cursor).await {
                    Ok(mut event) => {
                        event.attach_completion(guard);
                        ctx.tracker.record_emit(chain, cursor, event.timestamp_ms);
                        if ctx.events.send(event).await.is_err() {
                            tracing::warn!(chain = %chain, "event channel closed; scanner exiting");
                            return;
                        }
                        cursor += 1;
                    }
                    Err(err) if err.is_transient() => {
                        drop(guard);
                        tracing::warn!(
                            chain = %chain,
                            height = cursor,
                            %err,
                            "block load failed; will retry this height"
                        );
                        break;
                    }
                    Err(err) => {
                        drop(guard);
                        tracing::error!(
                            chain = %chain,
                            height = cursor,
                            %err,
                            "malformed block response; skipping height (recover via rescan)"
                        );
                        cursor += 1;
                    }
                }
            }

            if cursor > tip && ctx.tracker.mark_caught_up(chain) {
                // One-shot on the catch-up transition: sweep the mempool,
                // then open the push channel.
                if let Some(handler) = ctx.mempool.clone() {
                    self.sweep_mempool(handler.as_ref()).await;
                    if !push_wired {
                        if let Some(push) = self.push.clone() {
                            self.spawn_push_listener(push, handler, shutdown.clone())
                                .await;
                            push_wired = true;
                        }
                    }
                }
            }
        }
        tracing::info!(chain = %chain, height = cursor, "scanner stopped");
    }

    async fn sweep_mempool(&self, handler: &dyn MempoolTxHandler) {
        let chain = self.cfg.chain;
        let txids = match self.rpc.get_raw_mempool().await {
            Ok(txids) => txids,
            Err(err) => {
                tracing::warn!(chain = %chain, %err, "mempool sweep failed");
                return;
            }
        };
        tracing::info!(chain = %chain, txs = txids.len(), "sweeping mempool");
        for txid in txids {
            match self.rpc.get_raw_transaction(&txid).await {
                Ok(tx) => handler.handle_mempool_tx(chain, tx, 0, now_ms()).await,
                Err(err) => {
                    tracing::debug!(chain = %chain, txid = %txid, %err, "mempool tx skipped")
                }
            }
        }
    }

    async fn spawn_push_listener(
        &self,
        push: Arc<dyn PushSource>,
        handler: Arc<dyn MempoolTxHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let chain = self.cfg.chain;
        let mut rx = push.subscribe().await;
        tracing::info!(chain = %chain, "subscribed to push channel");
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    received = rx.recv() => {
                        match received {
                            Some(tx) => handler.handle_mempool_tx(chain, tx, 0, now_ms()).await,
                            None => {
                                tracing::warn!(chain = %chain, "push channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }
}
