//! Raw provider payloads to canonical compact blocks.
//!
//! Element order inside `vtx`, spends, outputs and actions is kept exactly:
//! the scan engine matches transaction indices against array positions.

use metrics::counter;
use serde_json::Value;
use shielded_watch_domain::{
    to_hex, ChainMetadata, CompactAction, CompactBlock, CompactOutput, CompactSpend, CompactTx,
    UnsupportedEncoding,
};
use thiserror::Error;
use tracing::warn;

use crate::source::{RawAction, RawBlock, RawCompactTx, RawOutput, RawSpend};

/// Why a single raw block was left out of a scan range.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("block {height}: `{field}` has an {source}")]
    Encoding {
        height: u64,
        field: String,
        #[source]
        source: UnsupportedEncoding,
    },
    #[error("block {height}: `{field}` value {value} does not fit in 32 bits")]
    OutOfRange {
        height: u64,
        field: &'static str,
        value: u64,
    },
    #[error("block {height} does not follow block {previous}; heights must strictly increase")]
    NonMonotonicHeight { height: u64, previous: u64 },
}

impl NormalizeError {
    pub fn height(&self) -> u64 {
        match self {
            NormalizeError::Encoding { height, .. }
            | NormalizeError::OutOfRange { height, .. }
            | NormalizeError::NonMonotonicHeight { height, .. } => *height,
        }
    }
}

/// Canonical blocks ready for scanning plus the blocks that were rejected.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBlocks {
    pub blocks: Vec<CompactBlock>,
    pub rejected: Vec<NormalizeError>,
}

/// Normalizes a provider batch. A failing block is rejected on its own; the
/// rest of the batch still goes through. Blocks whose height does not exceed
/// the last accepted height are rejected too.
pub fn normalize_blocks(raw: impl IntoIterator<Item = RawBlock>) -> NormalizedBlocks {
    let mut out = NormalizedBlocks::default();

    for block in raw {
        let result = normalize_block(&block).and_then(|canonical| {
            match out.blocks.last() {
                Some(previous) if canonical.height <= previous.height => {
                    Err(NormalizeError::NonMonotonicHeight {
                        height: canonical.height,
                        previous: previous.height,
                    })
                }
                _ => Ok(canonical),
            }
        });

        match result {
            Ok(canonical) => {
                counter!("monitor_blocks_normalized_total", "result" => "ok").increment(1);
                out.blocks.push(canonical);
            }
            Err(err) => {
                counter!("monitor_blocks_normalized_total", "result" => "rejected").increment(1);
                warn!(height = err.height(), error = %err, "rejecting block");
                out.rejected.push(err);
            }
        }
    }

    out
}

/// Maps one raw block to its canonical form. Absent integers become 0,
/// absent chain metadata stays absent.
pub fn normalize_block(raw: &RawBlock) -> Result<CompactBlock, NormalizeError> {
    let height = raw.height;

    let vtx = raw
        .vtx
        .iter()
        .enumerate()
        .map(|(position, tx)| normalize_tx(height, position, tx))
        .collect::<Result<Vec<_>, _>>()?;

    let chain_metadata = raw
        .chain_metadata
        .as_ref()
        .map(|meta| {
            Ok::<_, NormalizeError>(ChainMetadata {
                sapling_commitment_tree_size: narrow(
                    height,
                    "chainMetadata.saplingCommitmentTreeSize",
                    meta.sapling_commitment_tree_size,
                )?,
                orchard_commitment_tree_size: meta
                    .orchard_commitment_tree_size
                    .map(|size| narrow(height, "chainMetadata.orchardCommitmentTreeSize", size))
                    .transpose()?,
            })
        })
        .transpose()?;

    Ok(CompactBlock {
        proto_version: narrow(height, "protoVersion", raw.proto_version)?,
        height,
        hash: hex_field(height, &raw.hash, || "hash".to_string())?,
        prev_hash: hex_field(height, &raw.prev_hash, || "prevHash".to_string())?,
        time: narrow(height, "time", raw.time)?,
        vtx,
        chain_metadata,
    })
}

fn normalize_tx(
    height: u64,
    position: usize,
    tx: &RawCompactTx,
) -> Result<CompactTx, NormalizeError> {
    let txid_value = prefer_canonical(&tx.txid, &tx.hash);

    let spends = tx
        .spends
        .iter()
        .enumerate()
        .map(|(i, spend)| normalize_spend(height, position, i, spend))
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = tx
        .outputs
        .iter()
        .enumerate()
        .map(|(i, output)| normalize_output(height, position, i, output))
        .collect::<Result<Vec<_>, _>>()?;
    let actions = tx
        .actions
        .iter()
        .enumerate()
        .map(|(i, action)| normalize_action(height, position, i, action))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompactTx {
        index: tx.index,
        txid: hex_field(height, txid_value, || format!("vtx[{position}].txid"))?,
        fee: tx
            .fee
            .map(|fee| narrow(height, "vtx.fee", fee))
            .transpose()?,
        spends,
        outputs,
        actions,
    })
}

fn normalize_spend(
    height: u64,
    tx: usize,
    i: usize,
    spend: &RawSpend,
) -> Result<CompactSpend, NormalizeError> {
    let nf = prefer_canonical(&spend.nf, &spend.nullifier);
    Ok(CompactSpend {
        nf: hex_field(height, nf, || format!("vtx[{tx}].spends[{i}].nf"))?,
    })
}

fn normalize_output(
    height: u64,
    tx: usize,
    i: usize,
    output: &RawOutput,
) -> Result<CompactOutput, NormalizeError> {
    let path = |name: &str| format!("vtx[{tx}].outputs[{i}].{name}");
    Ok(CompactOutput {
        cmu: hex_field(height, &output.cmu, || path("cmu"))?,
        ephemeral_key: hex_field(height, &output.ephemeral_key, || path("ephemeralKey"))?,
        ciphertext: hex_field(height, &output.ciphertext, || path("ciphertext"))?,
    })
}

fn normalize_action(
    height: u64,
    tx: usize,
    i: usize,
    action: &RawAction,
) -> Result<CompactAction, NormalizeError> {
    let path = |name: &str| format!("vtx[{tx}].actions[{i}].{name}");
    let nf = prefer_canonical(&action.nf, &action.nullifier);
    Ok(CompactAction {
        nf: hex_field(height, nf, || path("nf"))?,
        cmx: hex_field(height, &action.cmx, || path("cmx"))?,
        ephemeral_key: hex_field(height, &action.ephemeral_key, || path("ephemeralKey"))?,
        ciphertext: hex_field(height, &action.ciphertext, || path("ciphertext"))?,
    })
}

fn prefer_canonical<'a>(canonical: &'a Value, variant: &'a Value) -> &'a Value {
    if canonical.is_null() {
        variant
    } else {
        canonical
    }
}

fn hex_field(
    height: u64,
    value: &Value,
    field: impl FnOnce() -> String,
) -> Result<String, NormalizeError> {
    to_hex(value).map_err(|source| NormalizeError::Encoding {
        height,
        field: field(),
        source,
    })
}

fn narrow(height: u64, field: &'static str, value: u64) -> Result<u32, NormalizeError> {
    u32::try_from(value).map_err(|_| NormalizeError::OutOfRange {
        height,
        field,
        value,
    })
}
