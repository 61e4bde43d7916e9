use std::time::Duration;

/// Upper bound on outstanding block payloads held in memory across chains.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 50;

/// Share of the queue any single chain may occupy.
pub const PER_CHAIN_QUOTA_RATIO: f64 = 0.7;

/// Queue headroom at which the deadlock escape kicks in, and the maximum
/// number of events it dispatches out of order in one round.
pub const DEFAULT_ESCAPE_WINDOW: usize = 5;

/// Scanner tip-poll interval.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(6);

/// Sleep between admission retries when the queue or quota is full.
pub const ADMISSION_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Capacity of the scanner → processor event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Cadence of the coordinator statistics log line.
pub const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Transaction count above which a block is emitted with a lazy payload.
pub const DEFAULT_LAZY_TX_THRESHOLD: usize = 5_000;

/// Initial scan heights when neither the chain entry nor a stored sync
/// status provides one. These sit just before the first MetaID activity on
/// each chain.
pub const DEFAULT_BTC_INIT_HEIGHT: u64 = 775_000;
pub const DEFAULT_MVC_INIT_HEIGHT: u64 = 60_000;
pub const DEFAULT_DOGE_INIT_HEIGHT: u64 = 4_900_000;
