//! Business logic services for the field materials service

pub mod alerts;
pub mod controls;
pub mod ledger;
pub mod stock;
pub mod store;

pub use alerts::AlertService;
pub use controls::ControlService;
pub use ledger::LedgerService;
pub use stock::StockService;
