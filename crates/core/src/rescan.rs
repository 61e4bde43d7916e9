//! Admin-triggered rescan of a height range.
//!
//! A single task slot: starting a rescan while one runs is rejected. The
//! worker drives the same block-scan primitive as normal operation with the
//! materializer as its handler, so a rescan is idempotent thanks to the
//! PIN-keyed writes. Per-block failures accumulate (first error wins) but
//! never abort the range; cancellation is cooperative between blocks.

use crate::event::BlockHandler;
use crate::scanner::ChainScanner;
use metafs_types::ChainKind;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RescanState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescanStatus {
    pub state: RescanState,
    pub chain: Option<ChainKind>,
    pub start_height: u64,
    pub end_height: u64,
    pub processed_blocks: u64,
    pub current_height: u64,
    pub error_message: Option<String>,
}

impl Default for RescanStatus {
    fn default() -> Self {
        Self {
            state: RescanState::Idle,
            chain: None,
            start_height: 0,
            end_height: 0,
            processed_blocks: 0,
            current_height: 0,
            error_message: None,
        }
    }
}

struct Inner {
    status: RescanStatus,
    cancel: Option<watch::Sender<bool>>,
}

/// Single-slot rescan task with snapshot progress reads.
#[derive(Clone)]
pub struct RescanController {
    inner: Arc<Mutex<Inner>>,
}

impl Default for RescanController {
    fn default() -> Self {
        Self::new()
    }
}

impl RescanController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                status: RescanStatus::default(),
                cancel: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("RescanController lock is poisoned")
    }

    /// Snapshot copy of the current status.
    pub fn status(&self) -> RescanStatus {
        self.lock().status.clone()
    }

    /// Requests cooperative cancellation; the worker checks between blocks.
    pub fn cancel(&self) {
        if let Some(cancel) = &self.lock().cancel {
            let _ = cancel.send(true);
        }
    }

    /// Launches a rescan of `[start_height, end_height]` on the given
    /// scanner. Rejects if a task is already running.
    pub fn start(
        &self,
        scanner: ChainScanner,
        handler: Arc<dyn BlockHandler>,
        start_height: u64,
        end_height: u64,
    ) -> anyhow::Result<()> {
        if start_height > end_height {
            anyhow::bail!("invalid range: {start_height} > {end_height}");
        }
        let chain = scanner.chain();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut inner = self.lock();
            if inner.status.state == RescanState::Running {
                anyhow::bail!("a rescan task is already running");
            }
            inner.status = RescanStatus {
                state: RescanState::Running,
                chain: Some(chain),
                start_height,
                end_height,
                processed_blocks: 0,
                current_height: start_height,
                error_message: None,
            };
            inner.cancel = Some(cancel_tx);
        }
        tracing::info!(chain = %chain, start_height, end_height, "rescan started");

        let controller = self.clone();
        tokio::spawn(async move {
            controller
                .worker(scanner, handler, start_height, end_height, cancel_rx)
                .await;
        });
        Ok(())
    }

    async fn worker(
        self,
        scanner: ChainScanner,
        handler: Arc<dyn BlockHandler>,
        start_height: u64,
        end_height: u64,
        cancel: watch::Receiver<bool>,
    ) {
        let chain = scanner.chain();
        let mut cancelled = false;
        for height in start_height..=end_height {
            if *cancel.borrow() {
                cancelled = true;
                break;
            }
            if let Err(err) = scanner.scan_block(height, handler.as_ref()).await {
                tracing::warn!(chain = %chain, height, %err, "rescan block failed; continuing");
                let mut inner = self.lock();
                if inner.status.error_message.is_none() {
                    inner.status.error_message = Some(format!("height {height}: {err}"));
                }
            }
            let mut inner = self.lock();
            inner.status.processed_blocks += 1;
            inner.status.current_height = height;
        }

        let mut inner = self.lock();
        inner.status.state = if cancelled {
            RescanState::Cancelled
        } else if inner.status.processed_blocks == 0 && inner.status.error_message.is_some() {
            RescanState::Failed
        } else {
            RescanState::Completed
        };
        inner.cancel = None;
        tracing::info!(
            chain = %chain,
            state = ?inner.status.state,
            processed = inner.status.processed_blocks,
            "rescan finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ScannerConfig;
    use crate::testing::{raw_block, CountingHandler, MockChain};
    use backon::{ConstantBuilder, Retryable};
    use std::time::Duration;

    fn scanner_for(chain: Arc<MockChain>) -> ChainScanner {
        ChainScanner::new(
            ScannerConfig {
                chain: chain.chain_kind(),
                start_height: 0,
                poll_interval: Duration::from_millis(20),
                lazy_tx_threshold: 1_000,
            },
            chain,
            None,
        )
    }

    async fn wait_terminal(controller: &RescanController) -> RescanStatus {
        (|| async {
            let status = controller.status();
            if status.state == RescanState::Running {
                anyhow::bail!("still running")
            }
            Ok(status)
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(Duration::from_millis(20))
                .with_max_times(200),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn rescans_full_range_inclusive() {
        let chain = Arc::new(MockChain::new(metafs_types::ChainKind::Btc));
        for height in 50..=60u64 {
            chain.add_block(raw_block(height, 1_000 + height, vec![]));
        }
        let handler = Arc::new(CountingHandler::default());
        let controller = RescanController::new();
        controller
            .start(scanner_for(chain), handler.clone(), 50, 60)
            .unwrap();

        let status = wait_terminal(&controller).await;
        assert_eq!(status.state, RescanState::Completed);
        assert_eq!(status.processed_blocks, 11);
        assert_eq!(status.current_height, 60);
        assert!(status.error_message.is_none());
        assert_eq!(handler.dispatched_heights(), (50..=60).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn per_block_failures_accumulate_but_do_not_abort() {
        let chain = Arc::new(MockChain::new(metafs_types::ChainKind::Mvc));
        // Heights 1 and 3 exist; 2 is missing and will fail.
        chain.add_block(raw_block(1, 1_001, vec![]));
        chain.add_block(raw_block(3, 1_003, vec![]));
        let handler = Arc::new(CountingHandler::default());
        let controller = RescanController::new();
        controller
            .start(scanner_for(chain), handler.clone(), 1, 3)
            .unwrap();

        let status = wait_terminal(&controller).await;
        assert_eq!(status.state, RescanState::Completed);
        assert_eq!(status.processed_blocks, 3);
        let message = status.error_message.unwrap();
        assert!(message.starts_with("height 2:"), "got: {message}");
        assert_eq!(handler.dispatched_heights(), vec![1, 3]);
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let chain = Arc::new(MockChain::new(metafs_types::ChainKind::Doge));
        for height in 1..=50u64 {
            chain.add_block(raw_block(height, 1_000 + height, vec![]));
        }
        let handler = Arc::new(CountingHandler::default());
        let controller = RescanController::new();
        controller
            .start(scanner_for(chain.clone()), handler.clone(), 1, 50)
            .unwrap();
        let second = controller.start(scanner_for(chain), handler, 1, 2);
        assert!(second.is_err());
        wait_terminal(&controller).await;
    }

    #[tokio::test]
    async fn cancellation_is_cooperative() {
        struct SlowHandler;

        #[async_trait::async_trait]
        impl BlockHandler for SlowHandler {
            async fn handle_event(&self, _event: crate::event::BlockEvent) -> anyhow::Result<()> {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            }
        }

        let chain = Arc::new(MockChain::new(metafs_types::ChainKind::Btc));
        for height in 1..=1_000u64 {
            chain.add_block(raw_block(height, 1_000 + height, vec![]));
        }
        let controller = RescanController::new();
        controller
            .start(scanner_for(chain), Arc::new(SlowHandler), 1, 1_000)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        controller.cancel();

        let status = wait_terminal(&controller).await;
        assert_eq!(status.state, RescanState::Cancelled);
        assert!(status.processed_blocks < 1_000);
    }

    #[tokio::test]
    async fn rejects_inverted_range() {
        let chain = Arc::new(MockChain::new(metafs_types::ChainKind::Btc));
        let handler = Arc::new(CountingHandler::default());
        let controller = RescanController::new();
        assert!(controller.start(scanner_for(chain), handler, 10, 5).is_err());
        assert_eq!(controller.status().state, RescanState::Idle);
    }
}
