//! Serde helpers for yoctoNEAR amounts, which the node encodes as decimal strings.

use serde::{de, Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s.parse().map_err(de::Error::custom),
        Raw::Num(n) => Ok(n as u128),
    }
}
