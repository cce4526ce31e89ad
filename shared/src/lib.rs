//! Shared types and domain core for the field materials ledger
//!
//! This crate contains the movement ledger, the technician stock projection,
//! material controls and the reconciliation planners. It does no I/O and is
//! shared between the backend, the technician UI (via WASM) and the tests.

pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;
pub mod reconciliation;
pub mod stock;
pub mod types;
pub mod validation;

pub use engine::*;
pub use error::*;
pub use ledger::*;
pub use models::*;
pub use reconciliation::*;
pub use stock::*;
pub use types::*;
pub use validation::*;
