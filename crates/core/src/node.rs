//! Node assembly: config → store → blob → materializer → coordinator →
//! scanners, with graceful shutdown. This is the single entry point the CLI
//! consumes.

use crate::blob::{BlobStore, LocalBlobStore};
use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::materializer::Materializer;
use crate::rescan::{RescanController, RescanStatus};
use crate::rpc::{ChainRpc, ChainRpcClient, RpcEndpoint};
use crate::scanner::{ChainScanner, MempoolTxHandler, PushSource, ScanContext, ScannerConfig};
use anyhow::Context;
use metafs_config::{constants, AppConfig, StorageBackend};
use metafs_store::{migrate, IndexStore, KvStore};
use metafs_types::ChainKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct IndexerNode {
    store: IndexStore,
    coordinator: Coordinator,
    materializer: Arc<Materializer>,
    scanners: HashMap<ChainKind, ChainScanner>,
    rescan: RescanController,
    scanner_tasks: Vec<JoinHandle<()>>,
}

/// Concrete back-ends a node runs against. Split from configuration so
/// embedders (and tests) can substitute implementations behind the traits.
pub struct NodeBackends {
    pub rpcs: HashMap<ChainKind, Arc<dyn ChainRpc>>,
    pub blob: Arc<dyn BlobStore>,
    pub push_sources: HashMap<ChainKind, Arc<dyn PushSource>>,
}

impl NodeBackends {
    /// Default back-ends derived from configuration: JSON-RPC clients per
    /// chain and the local blob store. Push sources are injected by the
    /// embedder (the socket library is an external collaborator).
    pub fn from_config(
        config: &AppConfig,
        push_sources: HashMap<ChainKind, Arc<dyn PushSource>>,
    ) -> anyhow::Result<Self> {
        if config.storage.backend != StorageBackend::Local {
            tracing::warn!(
                backend = ?config.storage.backend,
                "object-storage backends are served externally; using the local blob store"
            );
        }
        let mut rpcs: HashMap<ChainKind, Arc<dyn ChainRpc>> = HashMap::new();
        for entry in &config.chains {
            let client = ChainRpcClient::new(
                entry.name,
                RpcEndpoint {
                    url: entry.rpc_url.clone(),
                    user: entry.rpc_user.clone(),
                    pass: entry.rpc_pass.clone(),
                },
            )
            .with_context(|| format!("building rpc client for {}", entry.name))?;
            rpcs.insert(entry.name, Arc::new(client));
        }
        Ok(Self {
            rpcs,
            blob: Arc::new(LocalBlobStore::new(config.storage.root.clone())),
            push_sources,
        })
    }
}

impl IndexerNode {
    /// Builds a node from configuration with the default back-ends. Chains
    /// configured with `zmq_enabled` but missing from `push_sources` fall
    /// back to poll-only scanning with a log line.
    pub fn build(
        config: &AppConfig,
        push_sources: HashMap<ChainKind, Arc<dyn PushSource>>,
    ) -> anyhow::Result<Self> {
        let backends = NodeBackends::from_config(config, push_sources)?;
        Self::build_with_backends(config, backends)
    }

    pub fn build_with_backends(
        config: &AppConfig,
        backends: NodeBackends,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let kv = KvStore::open(&config.database.data_dir)
            .with_context(|| format!("opening kv store at {:?}", config.database.data_dir))?;
        let store = IndexStore::open(&kv)?;
        migrate::run(&store)?;

        let NodeBackends {
            rpcs,
            blob,
            push_sources,
        } = backends;
        for entry in &config.chains {
            anyhow::ensure!(
                rpcs.contains_key(&entry.name),
                "no rpc back-end wired for chain {}",
                entry.name
            );
        }

        let materializer = Arc::new(
            Materializer::new(store.clone(), blob.clone()).with_rpcs(rpcs.clone()),
        );

        let coordinator_cfg = CoordinatorConfig {
            max_queue_size: config.indexer.max_queue_size,
            per_chain_quota: config.indexer.effective_quota(),
            time_ordering_enabled: config.indexer.time_ordering_enabled,
            escape_window: config.indexer.escape_window,
            channel_capacity: constants::EVENT_CHANNEL_CAPACITY,
            stats_interval: constants::STATS_INTERVAL,
        };
        let coordinator = Coordinator::new(coordinator_cfg, materializer.clone());

        let mut scanners = HashMap::new();
        for entry in &config.chains {
            coordinator.tracker().register(entry.name);
            let start_height = Self::resolve_start_height(&store, config, entry.name)?;
            let push = match (entry.zmq_enabled, push_sources.get(&entry.name)) {
                (true, Some(source)) => Some(source.clone()),
                (true, None) => {
                    tracing::warn!(
                        chain = %entry.name,
                        "zmq enabled but no push source wired; polling only"
                    );
                    None
                }
                (false, _) => None,
            };
            let scanner = ChainScanner::new(
                ScannerConfig {
                    chain: entry.name,
                    start_height,
                    poll_interval: Duration::from_secs(config.indexer.scan_interval),
                    lazy_tx_threshold: constants::DEFAULT_LAZY_TX_THRESHOLD,
                },
                rpcs[&entry.name].clone(),
                push,
            );
            scanners.insert(entry.name, scanner);
        }

        Ok(Self {
            store,
            coordinator,
            materializer,
            scanners,
            rescan: RescanController::new(),
            scanner_tasks: Vec::new(),
        })
    }

    /// Stored cursor (resume just past it) → per-chain config → profile
    /// default.
    fn resolve_start_height(
        store: &IndexStore,
        config: &AppConfig,
        chain: ChainKind,
    ) -> anyhow::Result<u64> {
        let entry = config
            .chains
            .iter()
            .find(|entry| entry.name == chain)
            .context("chain entry disappeared")?;
        if let Some(status) = store.get_sync_status(chain)? {
            return Ok(status.current_sync_height + 1);
        }
        Ok(entry
            .start_height
            .unwrap_or_else(|| config.indexer.init_height(chain)))
    }

    /// Starts the coordinator workers and one scan loop per chain.
    pub fn start(&mut self) {
        self.coordinator.start();
        let mempool: Arc<dyn MempoolTxHandler> = self.materializer.clone();
        for scanner in self.scanners.values() {
            let ctx = ScanContext {
                admission: self.coordinator.admission(),
                events: self.coordinator.event_sender(),
                tracker: self.coordinator.tracker(),
                mempool: Some(mempool.clone()),
            };
            let shutdown = self.coordinator.shutdown_signal();
            self.scanner_tasks
                .push(tokio::spawn(scanner.clone().run(ctx, shutdown)));
        }
        tracing::info!(chains = self.scanners.len(), "indexer node started");
    }

    /// Cancels every worker and joins them before returning.
    pub async fn stop(&mut self) {
        self.rescan.cancel();
        self.coordinator.stop().await;
        for task in self.scanner_tasks.drain(..) {
            let _ = task.await;
        }
        tracing::info!("indexer node stopped");
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn rescan_status(&self) -> RescanStatus {
        self.rescan.status()
    }

    pub fn cancel_rescan(&self) {
        self.rescan.cancel()
    }

    /// Launches the single-slot admin rescan on one chain's scanner.
    pub fn start_rescan(
        &self,
        chain: ChainKind,
        start_height: u64,
        end_height: u64,
    ) -> anyhow::Result<()> {
        let scanner = self
            .scanners
            .get(&chain)
            .with_context(|| format!("chain {chain} is not configured"))?;
        self.rescan.start(
            scanner.clone(),
            self.materializer.clone(),
            start_height,
            end_height,
        )
    }

    /// Tip heights per chain, for the sync-status report.
    pub async fn block_counts(&self) -> HashMap<ChainKind, Option<u64>> {
        let mut counts = HashMap::new();
        for (chain, scanner) in &self.scanners {
            counts.insert(*chain, scanner.block_count().await.ok());
        }
        counts
    }
}
