use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chain back-ends the indexer can ingest from.
///
/// The set is closed on purpose: collection keys and blob paths embed the
/// lowercase chain name, so adding a chain is a schema-visible change.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Btc,
    Mvc,
    Doge,
}

impl ChainKind {
    pub const ALL: [ChainKind; 3] = [ChainKind::Btc, ChainKind::Mvc, ChainKind::Doge];

    /// Lowercase name as used in collection keys and blob paths.
    pub fn name(&self) -> &'static str {
        match self {
            ChainKind::Btc => "btc",
            ChainKind::Mvc => "mvc",
            ChainKind::Doge => "doge",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownChain(pub String);

impl fmt::Display for UnknownChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown chain name: {}", self.0)
    }
}

impl std::error::Error for UnknownChain {}

impl FromStr for ChainKind {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "btc" => Ok(ChainKind::Btc),
            "mvc" => Ok(ChainKind::Mvc),
            "doge" => Ok(ChainKind::Doge),
            other => Err(UnknownChain(other.to_string())),
        }
    }
}
