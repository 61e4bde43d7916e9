//! Embedded key-value layer.
//!
//! [`kv`] is the engine-facing facade: named collections over one RocksDB
//! instance each, with prefix iteration. [`index`] is the typed layer the
//! materializer talks to: records in, records out, with the latest-wins and
//! history rules enforced in one place. [`migrate`] owns the schema version
//! and start-up back-fills.

pub mod index;
pub mod kv;
pub mod migrate;

pub use index::{IndexStore, UserInfoFamily};
pub use kv::{Collection, KvStore, StoreError};
