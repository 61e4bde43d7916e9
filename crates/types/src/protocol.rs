//! MetaID protocol vocabulary: operations, recognized paths, PIN identifiers
//! and actor identities.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Maximum size of a single data push inside a protocol output. Payloads
/// larger than this arrive as multiple pushes that are concatenated in order.
pub const MAX_DATA_PUSH: usize = 520;

/// Literal marker push that opens a protocol envelope.
pub const PROTOCOL_MARKER: &[u8] = b"metaid";

pub const PATH_FILE: &str = "/file";
pub const PATH_FILE_CHUNK: &str = "/file/_chunk";
pub const PATH_FILE_CHUNK_ALT: &str = "/file/chunk";
pub const PATH_FILE_INDEX: &str = "/file/index";
pub const PATH_INFO_NAME: &str = "/info/name";
pub const PATH_INFO_AVATAR: &str = "/info/avatar";
pub const PATH_INFO_CHATKEY: &str = "/info/chatpubkey";
/// Legacy spelling of the chat key path seen in the wild.
pub const PATH_INFO_CHATKEY_ALT: &str = "/info/chatpublickey";

/// Every path the protocol gate lets through. A path is recognized if it
/// equals one of these (case-insensitively) or starts with `<entry>/`.
pub const RECOGNIZED_PATHS: [&str; 8] = [
    PATH_FILE,
    PATH_FILE_CHUNK,
    PATH_FILE_CHUNK_ALT,
    PATH_FILE_INDEX,
    PATH_INFO_NAME,
    PATH_INFO_AVATAR,
    PATH_INFO_CHATKEY,
    PATH_INFO_CHATKEY_ALT,
];

/// Returns true if the protocol gate should let a record with this resolved
/// first-path through.
pub fn is_recognized_path(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    RECOGNIZED_PATHS
        .iter()
        .any(|entry| lowered == *entry || lowered.starts_with(&format!("{entry}/")))
}

/// Mutation kind carried by a protocol record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Modify,
    Revoke,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Modify => "modify",
            Operation::Revoke => "revoke",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownOperation(pub String);

impl fmt::Display for UnknownOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown protocol operation: {}", self.0)
    }
}

impl std::error::Error for UnknownOperation {}

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Operation::Create),
            "modify" => Ok(Operation::Modify),
            "revoke" => Ok(Operation::Revoke),
            other => Err(UnknownOperation(other.to_string())),
        }
    }
}

/// Canonical identity of a protocol record: `<txid>i<vout>`.
pub fn pin_id(txid: &str, vout: u32) -> String {
    format!("{txid}i{vout}")
}

/// Splits a PIN id back into `(txid, vout)`. The separator is the last `i`
/// in the string since txids are hex and never contain one, but host-prefixed
/// references may.
pub fn parse_pin_id(pin: &str) -> Option<(&str, u32)> {
    let idx = pin.rfind('i')?;
    let vout = pin[idx + 1..].parse().ok()?;
    Some((&pin[..idx], vout))
}

/// Extracts the referenced PIN id from a `@<pinID>` or `<host>:@<pinID>`
/// path, if the path is such a reference.
pub fn parse_pin_reference(path: &str) -> Option<&str> {
    let at = path.find('@')?;
    // Either the path starts with `@`, or everything before it is a host
    // prefix terminated by `:`.
    if at == 0 || path[..at].ends_with(':') {
        let referenced = &path[at + 1..];
        (!referenced.is_empty()).then_some(referenced)
    } else {
        None
    }
}

/// Actor identity: hex SHA-256 of the chain address.
pub fn metaid_for_address(address: &str) -> String {
    hex::encode(Sha256::digest(address.as_bytes()))
}

/// The core stores milliseconds exclusively; chain headers hand out 10-digit
/// second timestamps.
pub fn normalize_timestamp_ms(timestamp: u64) -> u64 {
    if timestamp > 0 && timestamp < 10_000_000_000 {
        timestamp * 1000
    } else {
        timestamp
    }
}
