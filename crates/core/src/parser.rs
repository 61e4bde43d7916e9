//! MetaID protocol extraction.
//!
//! A protocol record is a data-carrying script whose pushes, in order, are:
//! the literal `metaid`, an operation, a path, an encryption flag, a version,
//! a content type, and payload pushes (each ≤ 520 bytes) concatenated in
//! order. For operations other than `create`, the true creator is the
//! address controlling the previous output consumed by the designated input
//! of the same transaction.

use crate::rpc::ChainRpc;
use metafs_types::protocol::{self, Operation};
use metafs_types::tx::RawTransaction;
use metafs_types::ChainKind;

/// One parsed protocol record, self-sufficient for materialization.
#[derive(Debug, Clone)]
pub struct MetaIdRecord {
    pub pin_id: String,
    pub txid: String,
    pub vout: u32,
    pub operation: Operation,
    pub path: String,
    pub parent_path: String,
    pub encrypted: bool,
    pub version: String,
    pub content_type: String,
    pub payload: Vec<u8>,
    pub chain: ChainKind,
    /// Best-known creator; refined by [`resolve_creator`] for non-creates.
    pub creator_address: String,
    pub owner_address: String,
    /// Previous output consumed by the designated input, used for the
    /// creator-lineage lookup.
    pub lineage: Option<(String, u32)>,
    pub height: u64,
    pub timestamp_ms: u64,
}

/// Walks a script and collects its data pushes, skipping every non-push
/// opcode. Handles direct pushes and `OP_PUSHDATA1/2/4`.
pub fn extract_pushes(script: &[u8]) -> Vec<Vec<u8>> {
    let mut pushes = Vec::new();
    let mut i = 0usize;
    while i < script.len() {
        let opcode = script[i];
        i += 1;
        let len = match opcode {
            // Direct push of 1..=75 bytes.
            1..=75 => opcode as usize,
            // OP_PUSHDATA1
            0x4c => {
                let Some(&len) = script.get(i) else { break };
                i += 1;
                len as usize
            }
            // OP_PUSHDATA2
            0x4d => {
                let Some(bytes) = script.get(i..i + 2) else { break };
                i += 2;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
            // OP_PUSHDATA4
            0x4e => {
                let Some(bytes) = script.get(i..i + 4) else { break };
                i += 4;
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
            // Anything else (OP_0, OP_RETURN, signature ops, ...) carries no
            // data we care about.
            _ => continue,
        };
        let Some(data) = script.get(i..i + len) else {
            // Truncated push: the script is malformed, stop here.
            break;
        };
        i += len;
        pushes.push(data.to_vec());
    }
    pushes
}

/// Parses a single output. Returns `None` when the output carries no
/// well-formed protocol envelope.
fn parse_output(
    chain: ChainKind,
    tx: &RawTransaction,
    vout: u32,
    height: u64,
    timestamp_ms: u64,
) -> Option<MetaIdRecord> {
    let out = tx.vout.iter().find(|o| o.n == vout)?;
    let script = hex::decode(&out.script_pub_key.hex).ok()?;
    let pushes = extract_pushes(&script);
    let marker = pushes
        .iter()
        .position(|push| push.as_slice() == protocol::PROTOCOL_MARKER)?;
    let fields = &pushes[marker + 1..];

    let operation: Operation = std::str::from_utf8(fields.first()?).ok()?.parse().ok()?;
    let path = String::from_utf8(fields.get(1)?.clone()).ok()?;
    let encrypted = fields.get(2).map(|f| f.as_slice() == b"1").unwrap_or(false);
    let version = fields
        .get(3)
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .unwrap_or_default();
    let content_type = fields
        .get(4)
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .unwrap_or_default();
    let payload: Vec<u8> = fields.get(5..).unwrap_or(&[]).concat();

    let parent_path = path
        .rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_default();
    let address = out.address().unwrap_or_default().to_string();

    Some(MetaIdRecord {
        pin_id: protocol::pin_id(&tx.txid, vout),
        txid: tx.txid.clone(),
        vout,
        operation,
        path,
        parent_path,
        encrypted,
        version,
        content_type,
        payload,
        chain,
        creator_address: address.clone(),
        owner_address: address,
        lineage: tx
            .lineage_input()
            .map(|(txid, prev_vout)| (txid.to_string(), prev_vout)),
        height,
        timestamp_ms: protocol::normalize_timestamp_ms(timestamp_ms),
    })
}

/// Scans every output of a transaction for protocol records. Malformed
/// outputs are skipped; the transaction continues.
pub fn parse_transaction(
    chain: ChainKind,
    tx: &RawTransaction,
    height: u64,
    timestamp_ms: u64,
) -> Vec<MetaIdRecord> {
    tx.vout
        .iter()
        .filter_map(|out| parse_output(chain, tx, out.n, height, timestamp_ms))
        .collect()
}

/// Resolves the true creator for a non-`create` record by looking up the
/// address that controlled the previous output consumed by the designated
/// input. Falls back to the output-derived address on any failure.
pub async fn resolve_creator(record: &mut MetaIdRecord, rpc: &dyn ChainRpc) {
    if record.operation == Operation::Create {
        return;
    }
    let Some((prev_txid, prev_vout)) = record.lineage.clone() else {
        return;
    };
    match rpc.get_raw_transaction(&prev_txid).await {
        Ok(prev) => {
            let address = prev
                .vout
                .iter()
                .find(|o| o.n == prev_vout)
                .and_then(|o| o.address());
            match address {
                Some(address) => record.creator_address = address.to_string(),
                None => tracing::debug!(
                    pin = %record.pin_id,
                    prev_txid = %prev_txid,
                    "previous output has no address; keeping script-derived creator"
                ),
            }
        }
        Err(err) => tracing::debug!(
            pin = %record.pin_id,
            prev_txid = %prev_txid,
            %err,
            "creator lineage lookup failed; keeping script-derived creator"
        ),
    }
}
