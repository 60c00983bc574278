//! Raw block payloads as handed over by the chain-data provider.
//!
//! Binary fields are kept as untyped JSON so the codec can accept any of the
//! supported shapes; integers may arrive as JSON numbers or decimal strings
//! (protobuf JSON renders 64-bit values as strings).

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    #[serde(default, alias = "proto_version", deserialize_with = "loose_u64")]
    pub proto_version: u64,
    #[serde(default, deserialize_with = "loose_u64")]
    pub height: u64,
    #[serde(default)]
    pub hash: Value,
    #[serde(default, alias = "prev_hash")]
    pub prev_hash: Value,
    #[serde(default, deserialize_with = "loose_u64")]
    pub time: u64,
    #[serde(default)]
    pub vtx: Vec<RawCompactTx>,
    #[serde(default, alias = "chain_metadata")]
    pub chain_metadata: Option<RawChainMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCompactTx {
    #[serde(default, deserialize_with = "loose_u64")]
    pub index: u64,
    /// Canonical transaction id field.
    #[serde(default)]
    pub txid: Value,
    /// Name used by the compact block protobuf; read when `txid` is absent.
    #[serde(default)]
    pub hash: Value,
    #[serde(default, deserialize_with = "loose_opt_u64")]
    pub fee: Option<u64>,
    #[serde(default)]
    pub spends: Vec<RawSpend>,
    #[serde(default)]
    pub outputs: Vec<RawOutput>,
    #[serde(default)]
    pub actions: Vec<RawAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSpend {
    #[serde(default)]
    pub nf: Value,
    #[serde(default)]
    pub nullifier: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOutput {
    #[serde(default)]
    pub cmu: Value,
    #[serde(default, alias = "epk", alias = "ephemeral_key")]
    pub ephemeral_key: Value,
    #[serde(default)]
    pub ciphertext: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAction {
    #[serde(default)]
    pub nf: Value,
    #[serde(default)]
    pub nullifier: Value,
    #[serde(default)]
    pub cmx: Value,
    #[serde(default, alias = "ephemeral_key")]
    pub ephemeral_key: Value,
    #[serde(default)]
    pub ciphertext: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChainMetadata {
    #[serde(
        default,
        alias = "sapling_commitment_tree_size",
        deserialize_with = "loose_u64"
    )]
    pub sapling_commitment_tree_size: u64,
    #[serde(
        default,
        alias = "orchard_commitment_tree_size",
        deserialize_with = "loose_opt_u64"
    )]
    pub orchard_commitment_tree_size: Option<u64>,
}

fn loose_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_opt_u64(deserializer)?.unwrap_or(0))
}

fn loose_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected unsigned integer, got {number}"))),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected unsigned integer, got `{text}`"))),
        other => Err(de::Error::custom(format!(
            "expected unsigned integer, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_default() {
        let block: RawBlock = serde_json::from_value(json!({})).unwrap();
        assert_eq!(block.height, 0);
        assert_eq!(block.time, 0);
        assert!(block.hash.is_null());
        assert!(block.vtx.is_empty());
        assert!(block.chain_metadata.is_none());
    }

    #[test]
    fn integers_accept_strings() {
        let block: RawBlock = serde_json::from_value(json!({
            "height": "2500000",
            "protoVersion": 1,
            "time": null,
            "vtx": [{ "index": "3", "fee": "1000" }]
        }))
        .unwrap();
        assert_eq!(block.height, 2_500_000);
        assert_eq!(block.proto_version, 1);
        assert_eq!(block.time, 0);
        assert_eq!(block.vtx[0].index, 3);
        assert_eq!(block.vtx[0].fee, Some(1000));
    }

    #[test]
    fn negative_integers_are_rejected() {
        assert!(serde_json::from_value::<RawBlock>(json!({ "height": -1 })).is_err());
    }
}
