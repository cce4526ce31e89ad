//! Quantity validation rules for the material ledger
//!
//! Each rule returns a static message; callers attach the material id and
//! turn it into the matching `DomainError`.

use rust_decimal::{Decimal, RoundingStrategy};

// ============================================================================
// Ledger quantities
// ============================================================================

/// Decimal places a stored quantity or amount keeps
pub const QUANTITY_SCALE: u32 = 4;

/// Exclusive upper bound on any stored quantity or balance (10^10)
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

/// Exclusive upper bound on a priced amount (10^20)
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_661_992_960, 1_808_227_885, 5, false, 0);

/// Quantity fits the stored precision: at most four decimals, below 10^10
pub fn validate_quantity_range(quantity: Decimal) -> Result<(), &'static str> {
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err("Quantity cannot have more than 4 decimal places");
    }
    if quantity.abs() >= MAX_QUANTITY {
        return Err("Quantity is too large");
    }
    Ok(())
}

/// Ledger quantities are strictly positive; the sign comes from the entry type
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    validate_quantity_range(quantity)
}

/// Reported quantities (used, returned, lost) may be zero but never negative
pub fn validate_non_negative(quantity: Decimal) -> Result<(), &'static str> {
    if quantity < Decimal::ZERO {
        return Err("Quantity cannot be negative");
    }
    validate_quantity_range(quantity)
}

/// Free-text reasons on ledger entries and losses must say something
pub fn validate_reason(reason: &str) -> Result<(), &'static str> {
    if reason.trim().is_empty() {
        return Err("Reason cannot be empty");
    }
    Ok(())
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Every assigned unit must be accounted for as used, returned or lost
pub fn validate_line_conservation(
    asignada: Decimal,
    utilizada: Decimal,
    devuelta: Decimal,
    perdida: Decimal,
) -> Result<(), &'static str> {
    validate_non_negative(utilizada)?;
    validate_non_negative(devuelta)?;
    validate_non_negative(perdida)?;
    let accounted = utilizada
        .checked_add(devuelta)
        .and_then(|sum| sum.checked_add(perdida));
    if accounted != Some(asignada) {
        return Err("Used + returned + lost must equal the assigned quantity");
    }
    Ok(())
}

/// A loss needs an explanation
pub fn validate_loss_reason(perdida: Decimal, motivo: Option<&str>) -> Result<(), &'static str> {
    if perdida > Decimal::ZERO && motivo.map_or(true, |m| m.trim().is_empty()) {
        return Err("A reason is required when material is lost");
    }
    Ok(())
}

/// Priced value of lost material, rounded half away from zero to the stored
/// precision (the same rounding Postgres applies to NUMERIC columns)
pub fn loss_value(perdida: Decimal, costo_unitario: Decimal) -> Result<Decimal, &'static str> {
    perdida
        .checked_mul(costo_unitario)
        .map(|value| {
            value.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointAwayFromZero)
        })
        .filter(|value| *value < MAX_AMOUNT)
        .ok_or("Priced loss is too large")
}

// ============================================================================
// Alerts
// ============================================================================

/// Available balance is strictly below the alert threshold
pub fn is_low_balance(disponible: Decimal, threshold: Decimal) -> bool {
    disponible < threshold
}
