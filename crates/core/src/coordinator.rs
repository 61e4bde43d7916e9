//! Cross-chain ordering and backpressure.
//!
//! The coordinator owns one priority queue and a global admission budget.
//! Scanners must take a per-chain slot and a global semaphore permit before
//! loading a block; both are released by the event's completion guard after
//! the materializer returns, on every path including panics. A processor
//! task drains the queue in global timestamp order (when enabled), with a
//! bounded out-of-order escape when the queue is close to full.

use crate::event::{BlockEvent, BlockHandler};
use crate::queue::EventQueue;
use metafs_config::constants;
use metafs_types::ChainKind;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub max_queue_size: usize,
    pub per_chain_quota: usize,
    pub time_ordering_enabled: bool,
    /// Queue headroom at which the deadlock escape fires, and the number of
    /// events it may dispatch out of order per round.
    pub escape_window: usize,
    pub channel_capacity: usize,
    pub stats_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let max_queue_size = constants::DEFAULT_MAX_QUEUE_SIZE;
        Self {
            max_queue_size,
            per_chain_quota: ((max_queue_size as f64) * constants::PER_CHAIN_QUOTA_RATIO).round()
                as usize,
            time_ordering_enabled: true,
            escape_window: constants::DEFAULT_ESCAPE_WINDOW,
            channel_capacity: constants::EVENT_CHANNEL_CAPACITY,
            stats_interval: constants::STATS_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainState {
    pub current_height: u64,
    pub latest_height: u64,
    pub caught_up: bool,
    pub processed: u64,
    pub last_dispatched_ms: u64,
}

/// Shared per-chain bookkeeping.
///
/// Three separate mutexes by design of the callers: progress is touched on
/// every emit, slots on every admission, state only for height/caught-up
/// tracking. When more than one must be held, the order is progress → slots
/// → state.
pub struct ChainTracker {
    progress: Mutex<HashMap<ChainKind, u64>>,
    slots: Mutex<HashMap<ChainKind, usize>>,
    state: Mutex<HashMap<ChainKind, ChainState>>,
}

impl ChainTracker {
    pub fn new() -> Self {
        Self {
            progress: Mutex::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            state: Mutex::new(HashMap::new()),
        }
    }

    fn progress_lock(&self) -> MutexGuard<'_, HashMap<ChainKind, u64>> {
        self.progress.lock().expect("progress lock is poisoned")
    }

    fn slots_lock(&self) -> MutexGuard<'_, HashMap<ChainKind, usize>> {
        self.slots.lock().expect("slots lock is poisoned")
    }

    fn state_lock(&self) -> MutexGuard<'_, HashMap<ChainKind, ChainState>> {
        self.state.lock().expect("state lock is poisoned")
    }

    /// Registers a chain before its scanner starts so ordering decisions see
    /// it even while it has produced nothing.
    pub fn register(&self, chain: ChainKind) {
        self.progress_lock().entry(chain).or_insert(0);
        self.slots_lock().entry(chain).or_insert(0);
        self.state_lock().entry(chain).or_default();
    }

    pub fn known_chains(&self) -> Vec<ChainKind> {
        let mut chains: Vec<ChainKind> = self.state_lock().keys().copied().collect();
        chains.sort();
        chains
    }

    /// Called at every event emission with that event's timestamp.
    pub fn record_emit(&self, chain: ChainKind, height: u64, timestamp_ms: u64) {
        self.progress_lock().insert(chain, timestamp_ms);
        self.state_lock().entry(chain).or_default().current_height = height;
    }

    pub fn progress(&self, chain: ChainKind) -> u64 {
        self.progress_lock().get(&chain).copied().unwrap_or(0)
    }

    pub fn set_latest_height(&self, chain: ChainKind, tip: u64) {
        let mut state = self.state_lock();
        let entry = state.entry(chain).or_default();
        entry.latest_height = tip;
        if entry.caught_up && entry.current_height < tip {
            entry.caught_up = false;
            tracing::info!(chain = %chain, tip, "chain fell behind its tip");
        }
    }

    /// Flips the chain to caught-up. Returns true only on the transition so
    /// the caller can run one-shot work (mempool sweep, push subscription)
    /// and the log fires once, not on every tick.
    pub fn mark_caught_up(&self, chain: ChainKind) -> bool {
        let mut state = self.state_lock();
        let entry = state.entry(chain).or_default();
        if entry.caught_up {
            return false;
        }
        entry.caught_up = true;
        tracing::info!(chain = %chain, height = entry.current_height, "chain caught up to tip");
        true
    }

    pub fn is_caught_up(&self, chain: ChainKind) -> bool {
        self.state_lock()
            .get(&chain)
            .map(|s| s.caught_up)
            .unwrap_or(false)
    }

    pub fn try_take_slot(&self, chain: ChainKind, quota: usize) -> bool {
        let mut slots = self.slots_lock();
        let count = slots.entry(chain).or_insert(0);
        if *count >= quota {
            return false;
        }
        *count += 1;
        true
    }

    pub fn release_slot(&self, chain: ChainKind) {
        let mut slots = self.slots_lock();
        if let Some(count) = slots.get_mut(&chain) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn slot_count(&self, chain: ChainKind) -> usize {
        self.slots_lock().get(&chain).copied().unwrap_or(0)
    }

    pub fn note_dispatch(&self, chain: ChainKind, timestamp_ms: u64) {
        let mut state = self.state_lock();
        let entry = state.entry(chain).or_default();
        entry.processed += 1;
        entry.last_dispatched_ms = timestamp_ms;
    }

    pub fn chain_states(&self) -> Vec<(ChainKind, ChainState)> {
        let mut states: Vec<(ChainKind, ChainState)> = self
            .state_lock()
            .iter()
            .map(|(chain, state)| (*chain, state.clone()))
            .collect();
        states.sort_by_key(|(chain, _)| *chain);
        states
    }

    /// Chain with the lowest progress timestamp among `candidates`.
    pub fn slowest_chain(&self, candidates: &[ChainKind]) -> Option<ChainKind> {
        let progress = self.progress_lock();
        candidates
            .iter()
            .copied()
            .min_by_key(|chain| progress.get(chain).copied().unwrap_or(0))
    }
}

impl Default for ChainTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the per-chain slot and the global permit exactly once, whenever
/// the owning event is dropped.
pub struct CompletionGuard {
    chain: ChainKind,
    tracker: Arc<ChainTracker>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.tracker.release_slot(self.chain);
    }
}

impl fmt::Debug for CompletionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGuard")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Admission gate handed to scanners: a block may be loaded only while a
/// per-chain slot and a global permit are held.
#[derive(Clone)]
pub struct AdmissionHandle {
    semaphore: Arc<Semaphore>,
    tracker: Arc<ChainTracker>,
    quota: usize,
}

impl AdmissionHandle {
    /// Blocks (politely) until admission is granted, retrying on a short
    /// sleep. Never drops the request; returns `None` only on shutdown.
    pub async fn admit(
        &self,
        chain: ChainKind,
        shutdown: &watch::Receiver<bool>,
    ) -> Option<CompletionGuard> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            if self.tracker.try_take_slot(chain, self.quota) {
                match self.semaphore.clone().try_acquire_owned() {
                    Ok(permit) => {
                        return Some(CompletionGuard {
                            chain,
                            tracker: self.tracker.clone(),
                            _permit: permit,
                        });
                    }
                    Err(_) => self.tracker.release_slot(chain),
                }
            }
            tokio::time::sleep(constants::ADMISSION_RETRY_DELAY).await;
        }
    }
}

/// Queue-draining logic shared by the processor task and its ticker.
#[derive(Clone)]
struct Dispatcher {
    cfg: CoordinatorConfig,
    queue: Arc<EventQueue>,
    tracker: Arc<ChainTracker>,
    handler: Arc<dyn BlockHandler>,
}

impl Dispatcher {
    /// True when, for every other chain that has not caught up to its tip,
    /// the recorded progress timestamp has reached the candidate's.
    fn ready_to_dispatch(&self, timestamp_ms: u64, chain: ChainKind) -> bool {
        self.tracker.known_chains().into_iter().all(|other| {
            other == chain
                || self.tracker.is_caught_up(other)
                || self.tracker.progress(other) >= timestamp_ms
        })
    }

    async fn dispatch(&self, event: BlockEvent) {
        let (chain, height, timestamp_ms) = (event.chain, event.height, event.timestamp_ms);
        if let Err(err) = self.handler.handle_event(event).await {
            tracing::error!(chain = %chain, height, %err, "block materialization failed");
        }
        self.tracker.note_dispatch(chain, timestamp_ms);
    }

    /// Out-of-order dispatch of up to `escape_window` events from the chain
    /// with the lowest progress among those actually queued. The only path
    /// allowed to violate global timestamp ordering.
    async fn escape(&self) {
        let queued = self.queue.chains_present();
        let Some(target) = self.tracker.slowest_chain(&queued) else {
            return;
        };
        tracing::warn!(
            chain = %target,
            queue = self.queue.len(),
            "queue near capacity; dispatching out of order to break ordering deadlock"
        );
        for _ in 0..self.cfg.escape_window {
            match self.queue.pop_for_chain(target) {
                Some(event) => self.dispatch(event).await,
                None => break,
            }
        }
    }

    async fn drain(&self) {
        loop {
            let Some((timestamp_ms, chain)) = self.queue.peek() else {
                break;
            };
            if self.cfg.time_ordering_enabled && !self.ready_to_dispatch(timestamp_ms, chain) {
                if self.queue.len() + self.cfg.escape_window >= self.cfg.max_queue_size {
                    self.escape().await;
                    continue;
                }
                // Wait for progress elsewhere; the ticker retries us.
                break;
            }
            match self.queue.pop() {
                Some(event) => self.dispatch(event).await,
                None => break,
            }
        }
    }

    async fn run(self, mut events: mpsc::Receiver<BlockEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(200));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = events.recv() => {
                    match received {
                        Some(event) => {
                            self.queue.push(event);
                            self.drain().await;
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.drain().await;
                }
            }
        }
        tracing::debug!("coordinator processor stopped");
    }
}

/// Owns the scanners' admission budget, the queue and the processor/stats
/// workers.
pub struct Coordinator {
    cfg: CoordinatorConfig,
    queue: Arc<EventQueue>,
    tracker: Arc<ChainTracker>,
    semaphore: Arc<Semaphore>,
    handler: Arc<dyn BlockHandler>,
    events_tx: mpsc::Sender<BlockEvent>,
    events_rx: Option<mpsc::Receiver<BlockEvent>>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl Coordinator {
    pub fn new(cfg: CoordinatorConfig, handler: Arc<dyn BlockHandler>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(cfg.channel_capacity);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            semaphore: Arc::new(Semaphore::new(cfg.max_queue_size)),
            queue: Arc::new(EventQueue::new()),
            tracker: Arc::new(ChainTracker::new()),
            cfg,
            handler,
            events_tx,
            events_rx: Some(events_rx),
            shutdown_tx,
            workers: Vec::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.cfg
    }

    pub fn tracker(&self) -> Arc<ChainTracker> {
        self.tracker.clone()
    }

    pub fn queue(&self) -> Arc<EventQueue> {
        self.queue.clone()
    }

    pub fn admission(&self) -> AdmissionHandle {
        AdmissionHandle {
            semaphore: self.semaphore.clone(),
            tracker: self.tracker.clone(),
            quota: self.cfg.per_chain_quota,
        }
    }

    pub fn event_sender(&self) -> mpsc::Sender<BlockEvent> {
        self.events_tx.clone()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawns the processor and stats workers. Call once.
    pub fn start(&mut self) {
        let events_rx = self
            .events_rx
            .take()
            .expect("coordinator started more than once");
        let dispatcher = Dispatcher {
            cfg: self.cfg.clone(),
            queue: self.queue.clone(),
            tracker: self.tracker.clone(),
            handler: self.handler.clone(),
        };
        self.workers
            .push(tokio::spawn(dispatcher.run(events_rx, self.shutdown_signal())));

        let stats = StatsWorker {
            queue: self.queue.clone(),
            tracker: self.tracker.clone(),
            semaphore: self.semaphore.clone(),
            interval: self.cfg.stats_interval,
        };
        self.workers
            .push(tokio::spawn(stats.run(self.shutdown_signal())));
    }

    /// Signals every worker (scanners subscribe to the same channel), then
    /// joins the coordinator's own tasks.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
    }
}

struct StatsWorker {
    queue: Arc<EventQueue>,
    tracker: Arc<ChainTracker>,
    semaphore: Arc<Semaphore>,
    interval: Duration,
}

impl StatsWorker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.report(),
            }
        }
    }

    fn report(&self) {
        tracing::info!(
            queue = self.queue.len(),
            permits_free = self.semaphore.available_permits(),
            "coordinator status"
        );
        for (chain, state) in self.tracker.chain_states() {
            let latest = chrono::DateTime::from_timestamp_millis(state.last_dispatched_ms as i64)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            tracing::info!(
                chain = %chain,
                current = state.current_height,
                tip = state.latest_height,
                slots = self.tracker.slot_count(chain),
                processed = state.processed,
                caught_up = state.caught_up,
                latest = %latest,
                "chain status"
            );
        }
    }
}
