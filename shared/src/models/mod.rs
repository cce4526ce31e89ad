//! Domain models for material distribution and reconciliation

mod alert;
mod control;
mod material;
mod movement;
mod stock;

pub use alert::*;
pub use control::*;
pub use material::*;
pub use movement::*;
pub use stock::*;
