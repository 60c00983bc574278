use async_trait::async_trait;

use crate::worker::MonitorError;

mod types;

pub use types::{RawAction, RawBlock, RawChainMetadata, RawCompactTx, RawOutput, RawSpend};

/// Chain-data provider. Transport, retries and timeouts live behind this
/// trait.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Raw blocks for the inclusive range `start_height..=end_height`.
    async fn fetch_blocks(
        &self,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<RawBlock>, MonitorError>;

    async fn chain_tip(&self) -> Result<u64, MonitorError>;
}

/// Serves a fixed set of raw blocks, e.g. a captured range replayed offline.
#[derive(Debug, Clone, Default)]
pub struct StaticBlockSource {
    blocks: Vec<RawBlock>,
}

impl StaticBlockSource {
    pub fn new(blocks: Vec<RawBlock>) -> Self {
        Self { blocks }
    }

    /// Parses a JSON array of raw blocks.
    pub fn from_json(json: &str) -> Result<Self, MonitorError> {
        let blocks = serde_json::from_str(json)
            .map_err(|err| MonitorError::Source(format!("invalid block fixture: {err}")))?;
        Ok(Self::new(blocks))
    }
}

#[async_trait]
impl BlockSource for StaticBlockSource {
    async fn fetch_blocks(
        &self,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<RawBlock>, MonitorError> {
        Ok(self
            .blocks
            .iter()
            .filter(|block| (start_height..=end_height).contains(&block.height))
            .cloned()
            .collect())
    }

    async fn chain_tip(&self) -> Result<u64, MonitorError> {
        self.blocks
            .iter()
            .map(|block| block.height)
            .max()
            .ok_or_else(|| MonitorError::Source("no blocks available".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_filters_by_inclusive_range() {
        let source = StaticBlockSource::from_json(
            r#"[{"height": 10}, {"height": 11}, {"height": 12}, {"height": 13}]"#,
        )
        .expect("fixture parses");

        let blocks = source.fetch_blocks(11, 12).await.unwrap();
        let heights: Vec<_> = blocks.iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![11, 12]);
        assert_eq!(source.chain_tip().await.unwrap(), 13);
    }

    #[tokio::test]
    async fn empty_source_has_no_tip() {
        let source = StaticBlockSource::default();
        assert!(matches!(
            source.chain_tip().await,
            Err(MonitorError::Source(_))
        ));
    }
}
