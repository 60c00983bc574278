//! Session-scoped state (ledger, alerts), audit aggregation and telemetry
//! wiring.

pub mod alerts;
pub mod audit;
pub mod ledger;
pub mod telemetry;

pub use alerts::*;
pub use audit::*;
pub use ledger::*;
pub use telemetry::*;
