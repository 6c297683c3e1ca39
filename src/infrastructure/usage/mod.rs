//! Usage tracking infrastructure implementations

mod ledger;

pub use ledger::{LedgerConfig, UsageLedger};
