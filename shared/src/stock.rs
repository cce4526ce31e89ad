//! Technician stock projection
//!
//! Balances are a materialized fold over the movement ledger. The arena keeps
//! one versioned record per `(technician_id, material_id)` and only accepts
//! writes whose expected version matches, so a read-validate-write sequence
//! that lost a race is detected instead of silently overwriting.

use std::collections::HashMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::ledger::MovementLedger;
use crate::models::{StockKey, TechnicianStockLine, VersionedBalance};
use crate::validation::MAX_QUANTITY;

/// Read access to balances and the shared pool, as of some commit point
pub trait StockView {
    fn versioned_balance(&self, key: StockKey) -> VersionedBalance;

    /// Units of a material left in the shared warehouse pool
    fn central_available(&self, material_id: Uuid) -> Decimal;

    fn balance(&self, technician_id: Uuid, material_id: Uuid) -> TechnicianStockLine {
        self.versioned_balance(StockKey::new(technician_id, material_id))
            .line
    }
}

/// New value for a balance, valid only if the stored version still matches
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceWrite {
    pub expected_version: i64,
    pub line: TechnicianStockLine,
}

/// Signed change to the shared pool; negative deltas are guarded against
/// driving the pool below zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolWrite {
    pub material_id: Uuid,
    pub delta: Decimal,
}

/// Point-in-time copy of the balances an operation needs
///
/// Used by callers that load state from an external store before planning.
#[derive(Debug, Clone, Default)]
pub struct StockSnapshot {
    pub balances: HashMap<StockKey, VersionedBalance>,
    pub central: HashMap<Uuid, Decimal>,
}

impl StockView for StockSnapshot {
    fn versioned_balance(&self, key: StockKey) -> VersionedBalance {
        self.balances
            .get(&key)
            .cloned()
            .unwrap_or_else(|| VersionedBalance::empty(key))
    }

    fn central_available(&self, material_id: Uuid) -> Decimal {
        self.central.get(&material_id).copied().unwrap_or_default()
    }
}

fn pool_out_of_range(material_id: Uuid) -> DomainError {
    DomainError::InvalidQuantity(format!(
        "shared pool of material {} would exceed the storable range",
        material_id
    ))
}

/// Versioned balance records plus the optional shared pool
#[derive(Debug, Clone, Default)]
pub struct StockArena {
    balances: HashMap<StockKey, VersionedBalance>,
    central: HashMap<Uuid, Decimal>,
}

impl StockView for StockArena {
    fn versioned_balance(&self, key: StockKey) -> VersionedBalance {
        self.balances
            .get(&key)
            .cloned()
            .unwrap_or_else(|| VersionedBalance::empty(key))
    }

    fn central_available(&self, material_id: Uuid) -> Decimal {
        self.central.get(&material_id).copied().unwrap_or_default()
    }
}

impl StockArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored lines for one technician, ordered by material id
    pub fn balances_for(&self, technician_id: Uuid) -> Vec<TechnicianStockLine> {
        let mut lines: Vec<_> = self
            .balances
            .values()
            .filter(|b| b.line.technician_id == technician_id)
            .map(|b| b.line.clone())
            .collect();
        lines.sort_by_key(|l| l.material_id);
        lines
    }

    pub fn lines(&self) -> impl Iterator<Item = &TechnicianStockLine> {
        self.balances.values().map(|b| &b.line)
    }

    /// Check every expected version (and pool guard) first, then apply all
    /// writes; either everything lands or nothing does
    pub fn compare_and_swap(
        &mut self,
        writes: &[BalanceWrite],
        pool: &[PoolWrite],
    ) -> DomainResult<()> {
        for write in writes {
            let key = write.line.key();
            let current = self.balances.get(&key).map_or(0, |b| b.version);
            if current != write.expected_version {
                return Err(DomainError::ConcurrencyConflict {
                    resource: format!(
                        "stock {}/{}",
                        key.technician_id, key.material_id
                    ),
                });
            }
            if !write.line.is_consistent() {
                return Err(DomainError::NegativeStock {
                    technician_id: key.technician_id,
                    material_id: key.material_id,
                });
            }
        }

        let mut pool_totals: HashMap<Uuid, Decimal> = HashMap::new();
        for change in pool {
            let total = pool_totals.entry(change.material_id).or_default();
            *total = total
                .checked_add(change.delta)
                .ok_or_else(|| pool_out_of_range(change.material_id))?;
        }
        let mut pool_after: HashMap<Uuid, Decimal> = HashMap::with_capacity(pool_totals.len());
        for (material_id, delta) in &pool_totals {
            let available = self.central_available(*material_id);
            let after = available
                .checked_add(*delta)
                .filter(|q| *q < MAX_QUANTITY)
                .ok_or_else(|| pool_out_of_range(*material_id))?;
            if after < Decimal::ZERO {
                return Err(DomainError::InsufficientStock {
                    material_id: *material_id,
                    requested: -*delta,
                    available,
                });
            }
            pool_after.insert(*material_id, after);
        }

        for write in writes {
            let key = write.line.key();
            self.balances.insert(
                key,
                VersionedBalance {
                    line: write.line.clone(),
                    version: write.expected_version + 1,
                },
            );
        }
        self.central.extend(pool_after);
        Ok(())
    }

    /// Rebuild every balance by folding the ledger from the start
    pub fn rebuild(ledger: &MovementLedger) -> DomainResult<HashMap<StockKey, TechnicianStockLine>> {
        let mut lines: HashMap<StockKey, TechnicianStockLine> = HashMap::new();
        for entry in ledger.entries() {
            let key = StockKey::new(entry.technician_id, entry.material_id);
            lines
                .entry(key)
                .or_insert_with(|| TechnicianStockLine::empty(key))
                .apply(entry)?;
        }
        Ok(lines)
    }

    /// Replace every stored balance with `lines`, bumping versions so that
    /// in-flight plans planned against the old records are rejected
    pub fn reset_balances(&mut self, lines: HashMap<StockKey, TechnicianStockLine>) {
        let mut next = HashMap::with_capacity(lines.len());
        for (key, line) in lines {
            let version = self.balances.get(&key).map_or(0, |b| b.version) + 1;
            next.insert(key, VersionedBalance { line, version });
        }
        self.balances = next;
    }

    /// Whether the stored balances equal a fresh fold of `ledger`
    pub fn matches_ledger(&self, ledger: &MovementLedger) -> bool {
        let Ok(rebuilt) = Self::rebuild(ledger) else {
            return false;
        };
        rebuilt.len() == self.balances.len()
            && rebuilt.iter().all(|(key, line)| {
                self.balances.get(key).map_or(false, |stored| {
                    stored.line.cantidad_actual == line.cantidad_actual
                        && stored.line.cantidad_apartada == line.cantidad_apartada
                        && stored.line.cantidad_disponible == line.cantidad_disponible
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn line(key: StockKey, actual: i64, apartada: i64) -> TechnicianStockLine {
        TechnicianStockLine {
            technician_id: key.technician_id,
            material_id: key.material_id,
            cantidad_actual: Decimal::from(actual),
            cantidad_apartada: Decimal::from(apartada),
            cantidad_disponible: Decimal::from(actual - apartada),
            ultimo_movimiento: Some(Utc::now()),
        }
    }

    #[test]
    fn test_missing_balance_defaults_to_zero() {
        let arena = StockArena::new();
        let balance = arena.balance(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(balance.cantidad_actual, Decimal::ZERO);
        assert_eq!(balance.cantidad_disponible, Decimal::ZERO);
        assert!(balance.ultimo_movimiento.is_none());
    }

    #[test]
    fn test_compare_and_swap_bumps_version() {
        let mut arena = StockArena::new();
        let key = StockKey::new(Uuid::new_v4(), Uuid::new_v4());

        arena
            .compare_and_swap(
                &[BalanceWrite {
                    expected_version: 0,
                    line: line(key, 10, 0),
                }],
                &[],
            )
            .unwrap();
        assert_eq!(arena.versioned_balance(key).version, 1);

        // A writer that still believes version 0 loses
        let stale = arena.compare_and_swap(
            &[BalanceWrite {
                expected_version: 0,
                line: line(key, 99, 0),
            }],
            &[],
        );
        assert!(matches!(stale, Err(DomainError::ConcurrencyConflict { .. })));
        assert_eq!(arena.balance(key.technician_id, key.material_id).cantidad_actual, Decimal::from(10));
    }

    #[test]
    fn test_compare_and_swap_is_all_or_nothing() {
        let mut arena = StockArena::new();
        let a = StockKey::new(Uuid::new_v4(), Uuid::new_v4());
        let b = StockKey::new(a.technician_id, Uuid::new_v4());

        let result = arena.compare_and_swap(
            &[
                BalanceWrite {
                    expected_version: 0,
                    line: line(a, 5, 0),
                },
                BalanceWrite {
                    expected_version: 3,
                    line: line(b, 5, 0),
                },
            ],
            &[],
        );
        assert!(result.is_err());
        assert_eq!(arena.versioned_balance(a).version, 0);
    }

    #[test]
    fn test_pool_guard() {
        let mut arena = StockArena::new();
        let material = Uuid::new_v4();
        arena
            .compare_and_swap(
                &[],
                &[PoolWrite {
                    material_id: material,
                    delta: Decimal::from(4),
                }],
            )
            .unwrap();

        let short = arena.compare_and_swap(
            &[],
            &[PoolWrite {
                material_id: material,
                delta: Decimal::from(-5),
            }],
        );
        assert!(matches!(short, Err(DomainError::InsufficientStock { .. })));
        assert_eq!(arena.central_available(material), Decimal::from(4));
    }

    #[test]
    fn test_pool_overflow_is_rejected() {
        let mut arena = StockArena::new();
        let material = Uuid::new_v4();
        let restock = |delta: Decimal| PoolWrite {
            material_id: material,
            delta,
        };
        arena
            .compare_and_swap(&[], &[restock(Decimal::from(4))])
            .unwrap();

        let summed = arena.compare_and_swap(&[], &[restock(Decimal::MAX), restock(Decimal::MAX)]);
        assert!(matches!(summed, Err(DomainError::InvalidQuantity(_))));

        let beyond = arena.compare_and_swap(&[], &[restock(MAX_QUANTITY - Decimal::from(2))]);
        assert!(matches!(beyond, Err(DomainError::InvalidQuantity(_))));
        assert_eq!(arena.central_available(material), Decimal::from(4));
    }
}
