//! Schema versioning and start-up back-fills.
//!
//! Each migration iterates existing collections and back-fills derived keys;
//! all of them are idempotent, and writing the new schema version is the
//! commit point per step.

use crate::index::IndexStore;
use crate::kv::StoreError;

/// Compiled-in latest schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Brings a store opened at any earlier version up to [`SCHEMA_VERSION`].
pub fn run(store: &IndexStore) -> Result<(), StoreError> {
    let mut current = store.schema_version()?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }
    tracing::info!(from = current, to = SCHEMA_VERSION, "running schema migrations");
    while current < SCHEMA_VERSION {
        let next = current + 1;
        match next {
            // v1: initial collection layout, nothing to back-fill.
            1 => {}
            // v2: file rows indexed before the address/metaid projections
            // existed get re-indexed.
            2 => migrate_file_projections(store)?,
            other => unreachable!("no migration registered for schema version {other}"),
        }
        store.put_schema_version(next)?;
        tracing::info!(version = next, "schema migration committed");
        current = next;
    }
    Ok(())
}

fn migrate_file_projections(store: &IndexStore) -> Result<(), StoreError> {
    let mut reindexed = 0usize;
    for file in store.all_files()? {
        store.reindex_file_projections(&file)?;
        reindexed += 1;
    }
    if reindexed > 0 {
        tracing::info!(reindexed, "back-filled file projections");
    }
    Ok(())
}
