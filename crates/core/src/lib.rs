//! `hatchery-core`: ledger domain building blocks.
//!
//! This crate contains **pure domain** primitives (no process, disk or network IO).

pub mod error;
pub mod id;
pub mod ledger;
pub mod manifest;
pub mod transaction;

pub use error::{CoreError, CoreResult};
pub use id::TransactionId;
pub use ledger::{InMemoryLedger, Ledger};
pub use manifest::{ExecutionOrder, Schedule, UnitManifest};
pub use transaction::Transaction;
