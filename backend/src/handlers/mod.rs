//! HTTP request handlers

pub mod alerts;
pub mod controls;
pub mod health;
pub mod ledger;
pub mod stock;

pub use alerts::*;
pub use controls::*;
pub use health::*;
pub use ledger::*;
pub use stock::*;
