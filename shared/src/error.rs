//! Domain errors raised by the ledger and reconciliation core
//!
//! Every error is a rejected operation: nothing in this crate panics on bad
//! input, and a failing multi-line operation leaves no partial effects.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ControlState;

/// Errors produced by the material ledger and reconciliation engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// An assignment (or pool draw) would leave a negative available balance
    #[error("Insufficient stock for material {material_id}: requested {requested}, available {available}")]
    InsufficientStock {
        material_id: Uuid,
        requested: Decimal,
        available: Decimal,
    },

    /// used + returned + lost does not match the assigned quantity, or a
    /// required loss reason is missing
    #[error("Quantity mismatch for material {material_id}: {message}")]
    QuantityMismatch { material_id: Uuid, message: String },

    /// Operation is not valid for the control's current lifecycle state
    #[error("Cannot {operation} a control in state {from}")]
    StateTransition {
        from: ControlState,
        operation: &'static str,
    },

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: Uuid },

    /// Non-positive or malformed quantity at the ledger layer
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// An optimistic version check lost a race; the caller must re-read and retry
    #[error("Concurrent update detected on {resource}; reload and retry")]
    ConcurrencyConflict { resource: String },

    /// Folding an entry would drive a stored balance negative
    #[error("Negative stock for technician {technician_id}, material {material_id}")]
    NegativeStock {
        technician_id: Uuid,
        material_id: Uuid,
    },
}

impl DomainError {
    /// Stable machine-readable code, used by the HTTP layer and the wasm bindings
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            DomainError::QuantityMismatch { .. } => "QUANTITY_MISMATCH",
            DomainError::StateTransition { .. } => "INVALID_STATE_TRANSITION",
            DomainError::NotFound { .. } => "NOT_FOUND",
            DomainError::InvalidQuantity(_) => "INVALID_QUANTITY",
            DomainError::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            DomainError::NegativeStock { .. } => "NEGATIVE_STOCK",
        }
    }

    /// Whether the caller may simply re-read state and resubmit
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::ConcurrencyConflict { .. } | DomainError::NegativeStock { .. }
        )
    }

    pub(crate) fn mismatch(material_id: Uuid, message: impl Into<String>) -> Self {
        DomainError::QuantityMismatch {
            material_id,
            message: message.into(),
        }
    }
}

/// Result alias for the domain core
pub type DomainResult<T> = Result<T, DomainError>;
