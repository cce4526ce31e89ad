//! Technician stock service: balance reads and projection rebuilds

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use shared::{MovementLedger, StockArena, StockKey};

use crate::error::AppResult;
use crate::models::{LedgerRow, MovementEntry, StockRow, TechnicianStockLine, VersionedBalance};
use crate::services::store::LEDGER_COLUMNS;

/// Result of refolding the ledger into `technician_stock`
#[derive(Debug, Serialize)]
pub struct RebuildReport {
    pub ledger_entries: usize,
    pub lines: usize,
    /// Stored lines that disagreed with the fold
    pub mismatched: Vec<StockKey>,
    pub applied: bool,
}

#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

impl StockService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Current line, or a zero balance if the technician never held it
    pub async fn balance(&self, technician_id: Uuid, material_id: Uuid) -> AppResult<TechnicianStockLine> {
        let row = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT technician_id, material_id, cantidad_actual, cantidad_apartada,
                   cantidad_disponible, ultimo_movimiento, version
            FROM technician_stock
            WHERE technician_id = $1 AND material_id = $2
            "#,
        )
        .bind(technician_id)
        .bind(material_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(match row {
            Some(row) => VersionedBalance::from(row).line,
            None => TechnicianStockLine::empty(StockKey::new(technician_id, material_id)),
        })
    }

    pub async fn balances_for(&self, technician_id: Uuid) -> AppResult<Vec<TechnicianStockLine>> {
        let rows = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT technician_id, material_id, cantidad_actual, cantidad_apartada,
                   cantidad_disponible, ultimo_movimiento, version
            FROM technician_stock
            WHERE technician_id = $1
            ORDER BY material_id
            "#,
        )
        .bind(technician_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| VersionedBalance::from(row).line)
            .collect())
    }

    /// Fold the full ledger and compare with stored balances. With `apply`,
    /// overwrite the stored lines (bumping versions) inside one transaction
    /// that holds the stock table locked against concurrent writers.
    pub async fn rebuild(&self, apply: bool) -> AppResult<RebuildReport> {
        let mut tx = self.db.begin().await?;

        sqlx::query("LOCK TABLE technician_stock IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {} FROM movement_ledger ORDER BY secuencia",
            LEDGER_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;

        let mut ledger = MovementLedger::new();
        for row in rows {
            ledger.append(MovementEntry::try_from(row)?)?;
        }
        let rebuilt = StockArena::rebuild(&ledger)?;

        let stored: HashMap<StockKey, TechnicianStockLine> = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT technician_id, material_id, cantidad_actual, cantidad_apartada,
                   cantidad_disponible, ultimo_movimiento, version
            FROM technician_stock
            "#,
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|row| {
            let line = VersionedBalance::from(row).line;
            (line.key(), line)
        })
        .collect();

        let mut mismatched: Vec<StockKey> = rebuilt
            .iter()
            .filter(|(key, line)| {
                stored.get(*key).map_or(true, |s| {
                    s.cantidad_actual != line.cantidad_actual
                        || s.cantidad_apartada != line.cantidad_apartada
                        || s.cantidad_disponible != line.cantidad_disponible
                })
            })
            .map(|(key, _)| *key)
            .chain(
                stored
                    .iter()
                    .filter(|(key, line)| {
                        !rebuilt.contains_key(*key)
                            && !(line.cantidad_actual.is_zero() && line.cantidad_apartada.is_zero())
                    })
                    .map(|(key, _)| *key),
            )
            .collect();
        mismatched.sort();

        if apply {
            for key in &mismatched {
                match rebuilt.get(key) {
                    Some(line) => {
                        sqlx::query(
                            r#"
                            INSERT INTO technician_stock
                                (technician_id, material_id, cantidad_actual, cantidad_apartada,
                                 cantidad_disponible, ultimo_movimiento, version)
                            VALUES ($1, $2, $3, $4, $5, $6, 1)
                            ON CONFLICT (technician_id, material_id) DO UPDATE
                            SET cantidad_actual = EXCLUDED.cantidad_actual,
                                cantidad_apartada = EXCLUDED.cantidad_apartada,
                                cantidad_disponible = EXCLUDED.cantidad_disponible,
                                ultimo_movimiento = EXCLUDED.ultimo_movimiento,
                                version = technician_stock.version + 1
                            "#,
                        )
                        .bind(line.technician_id)
                        .bind(line.material_id)
                        .bind(line.cantidad_actual)
                        .bind(line.cantidad_apartada)
                        .bind(line.cantidad_disponible)
                        .bind(line.ultimo_movimiento)
                        .execute(&mut *tx)
                        .await?;
                    }
                    None => {
                        sqlx::query(
                            r#"
                            UPDATE technician_stock
                            SET cantidad_actual = 0, cantidad_apartada = 0,
                                cantidad_disponible = 0, version = version + 1
                            WHERE technician_id = $1 AND material_id = $2
                            "#,
                        )
                        .bind(key.technician_id)
                        .bind(key.material_id)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }

        if mismatched.is_empty() {
            tracing::info!(entries = ledger.len(), "Stock projection matches ledger");
        } else {
            tracing::warn!(
                entries = ledger.len(),
                mismatched = mismatched.len(),
                applied = apply,
                "Stock projection drifted from ledger"
            );
        }

        Ok(RebuildReport {
            ledger_entries: ledger.len(),
            lines: rebuilt.len(),
            mismatched,
            applied: apply,
        })
    }
}
