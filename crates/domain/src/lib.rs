//! Domain-level building blocks shared by the scan monitor and the storage
//! adapters: the canonical block and record model, the binary-field codec,
//! the per-session ledger and alert state, audit aggregation, configuration
//! loading and telemetry wiring.

pub mod codec;
pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use codec::{to_hex, UnsupportedEncoding};
pub use model::*;
pub use storage::*;
