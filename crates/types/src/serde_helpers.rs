use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};

/// u64 that tolerates floating-point and string encodings.
///
/// Chunk-index descriptors are produced by assorted wallet implementations,
/// some of which emit counts and sizes as JSON floats (`150.0`) or strings
/// (`"150"`). Floats are rounded to the nearest integer.
pub mod u64_lossy {
    use super::*;

    pub fn serialize<S>(val: &u64, s: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        s.serialize_u64(*val)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Num {
            Int(u64),
            Float(f64),
            Str(String),
        }
        match Num::deserialize(d)? {
            Num::Int(n) => Ok(n),
            Num::Float(f) if f.is_finite() && f >= 0.0 => Ok(f.round() as u64),
            Num::Float(f) => Err(D::Error::custom(format!("not a valid count: {f}"))),
            Num::Str(s) => s
                .parse::<u64>()
                .or_else(|_| s.parse::<f64>().map(|f| f.round() as u64))
                .map_err(|_| D::Error::custom(format!("not a valid count: {s:?}"))),
        }
    }
}
