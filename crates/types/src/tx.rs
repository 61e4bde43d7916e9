//! Wire shapes returned by the chain back-ends.
//!
//! All three supported chains speak the bitcoind-family JSON-RPC dialect, so
//! a single set of structs covers verbose `getblock` / `getrawtransaction`
//! responses. Fields the indexer never looks at are simply not declared.

use serde::{Deserialize, Serialize};

/// Verbose block (`getblock` verbosity 2): header fields plus fully decoded
/// transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    pub hash: String,
    pub height: u64,
    /// Header timestamp in seconds since epoch.
    pub time: u64,
    #[serde(default)]
    pub tx: Vec<RawTransaction>,
}

/// Block summary (`getblock` verbosity 1): header fields plus txid list only.
/// Used for lazy loading of very large blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMeta {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    #[serde(default)]
    pub tx: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<TxIn>,
    #[serde(default)]
    pub vout: Vec<TxOut>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxIn {
    /// Absent for coinbase inputs.
    pub txid: Option<String>,
    pub vout: Option<u32>,
    pub coinbase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOut {
    #[serde(default)]
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub hex: String,
    /// Modern nodes return a single `address`; older ones a list.
    pub address: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl TxOut {
    /// Best-known address controlling this output, regardless of which field
    /// the node populated.
    pub fn address(&self) -> Option<&str> {
        self.script_pub_key
            .address
            .as_deref()
            .or_else(|| self.script_pub_key.addresses.first().map(String::as_str))
    }
}

impl RawTransaction {
    /// The designated input used for creator-lineage lookups: the first
    /// non-coinbase input.
    pub fn lineage_input(&self) -> Option<(&str, u32)> {
        self.vin.iter().find_map(|vin| {
            let txid = vin.txid.as_deref()?;
            Some((txid, vin.vout.unwrap_or(0)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_prefers_singular_field() {
        let out: TxOut = serde_json::from_str(
            r#"{"value":0.1,"n":0,"scriptPubKey":{"hex":"6a","address":"addr1","addresses":["addr2"]}}"#,
        )
        .unwrap();
        assert_eq!(out.address(), Some("addr1"));
    }

    #[test]
    fn address_falls_back_to_list() {
        let out: TxOut = serde_json::from_str(
            r#"{"value":0,"n":1,"scriptPubKey":{"hex":"6a","addresses":["addr2"]}}"#,
        )
        .unwrap();
        assert_eq!(out.address(), Some("addr2"));
    }

    #[test]
    fn lineage_skips_coinbase() {
        let tx: RawTransaction = serde_json::from_str(
            r#"{"txid":"t0","vin":[{"coinbase":"04ffff"},{"txid":"prev","vout":3}],"vout":[]}"#,
        )
        .unwrap();
        assert_eq!(tx.lineage_input(), Some(("prev", 3)));
    }

    #[test]
    fn verbose_block_decodes_with_missing_optionals() {
        let block: RawBlock = serde_json::from_str(
            r#"{"hash":"h","height":12,"time":1700000000,"tx":[{"txid":"t0"}]}"#,
        )
        .unwrap();
        assert_eq!(block.height, 12);
        assert_eq!(block.tx.len(), 1);
        assert!(block.tx[0].vin.is_empty());
    }
}
