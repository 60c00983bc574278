//! Canonical compact block model. Every binary field is lowercase hex; the
//! values are built per scan call and dropped once records are produced.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactBlock {
    pub proto_version: u32,
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    /// Block timestamp (Unix seconds).
    pub time: u32,
    pub vtx: Vec<CompactTx>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_metadata: Option<ChainMetadata>,
}

impl CompactBlock {
    pub fn sapling_output_count(&self) -> usize {
        self.vtx.iter().map(|tx| tx.outputs.len()).sum()
    }

    pub fn orchard_action_count(&self) -> usize {
        self.vtx.iter().map(|tx| tx.actions.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactTx {
    /// Position of the transaction inside its block.
    pub index: u64,
    pub txid: String,
    #[serde(default)]
    pub fee: Option<u32>,
    pub spends: Vec<CompactSpend>,
    pub outputs: Vec<CompactOutput>,
    pub actions: Vec<CompactAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactSpend {
    pub nf: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactOutput {
    pub cmu: String,
    pub ephemeral_key: String,
    pub ciphertext: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactAction {
    pub nf: String,
    pub cmx: String,
    pub ephemeral_key: String,
    pub ciphertext: String,
}

/// Commitment tree sizes at the end of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetadata {
    pub sapling_commitment_tree_size: u32,
    #[serde(default)]
    pub orchard_commitment_tree_size: Option<u32>,
}
