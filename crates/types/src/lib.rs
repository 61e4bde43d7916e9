//! Domain types shared across the metafs indexer.
//!
//! Everything here is chain-agnostic plumbing: chain identifiers, the MetaID
//! protocol vocabulary (operations, paths, PIN identifiers), the raw wire
//! shapes returned by the chain back-ends, and the records persisted by the
//! index store.

pub mod chain;
pub mod protocol;
pub mod record;
pub mod serde_helpers;
pub mod tx;

pub use chain::ChainKind;
pub use protocol::Operation;
