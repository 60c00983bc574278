//! Scan orchestration for shielded-pool balance monitoring.
//!
//! Raw provider blocks are normalized into canonical compact blocks, handed
//! to an external [`ScanEngine`] one key at a time, and the resulting records
//! replace each key's ledger partition before the alert rules run over them.
//! Everything a session mutates lives in its [`ScanSession`], so several
//! sessions can run side by side in one process.

pub mod engine;
pub mod normalize;
pub mod pipeline;
pub mod source;
pub mod worker;

pub use engine::{ScanEngine, ScanFailure};
pub use normalize::{normalize_block, normalize_blocks, NormalizeError, NormalizedBlocks};
pub use pipeline::{scan_key, KeyScanOutcome};
pub use source::{BlockSource, RawBlock, StaticBlockSource};
pub use worker::{
    open_session, run_monitor, AggregateScanFailure, LogProgress, MonitorError,
    ProgressObserver, ScanProgress, ScanReport, ScanSession,
};
