//! PostgreSQL persistence for plans built by the shared planners
//!
//! Reads happen outside any transaction and carry the version of every
//! record they saw. `commit` then writes the whole plan in one transaction,
//! each write guarded by `WHERE version = $expected`; a guard that matches no
//! row aborts the transaction with `ConcurrencyConflict`.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{ControlWrite, DomainError, Plan, StockSnapshot};

use crate::error::{AppError, AppResult};
use crate::models::{
    AlertEvent, ControlRow, HistoryRow, LineRow, Material, MaterialCatalog, MaterialControl,
    MaterialRow, MovementEntry, StockKey, StockRow,
};

pub(crate) const LEDGER_COLUMNS: &str = "secuencia, id, technician_id, material_id, tipo, cantidad, \
     direccion, motivo, responsable_id, origen_tipo, origen_referencia, control_id, \
     visible_para_analistas, fecha";

const CONTROL_COLUMNS: &str = "id, technician_id, order_id, bodeguero_id, analista_id, \
     estado_general, fecha_asignacion, fecha_inicio_trabajo, fecha_fin_trabajo, fecha_devolucion, \
     fecha_resolucion_descuadre, fecha_cierre, descuadre_resuelto, motivo_descuadre, \
     observaciones_bodeguero, observaciones_tecnico, observaciones_analista, version";

const LINE_COLUMNS: &str = "control_id, material_id, posicion, cantidad_asignada, \
     cantidad_utilizada, cantidad_devuelta, cantidad_perdida, motivo_perdida, valor_perdida, estado";

/// Rows written by a committed plan
#[derive(Debug)]
pub struct CommitOutcome {
    pub entries: Vec<MovementEntry>,
    pub control: Option<MaterialControl>,
    pub alerts: Vec<AlertEvent>,
}

impl CommitOutcome {
    pub fn into_control(self) -> AppResult<MaterialControl> {
        self.control
            .ok_or_else(|| AppError::Internal("plan committed without a control".to_string()))
    }

    pub fn into_entry(self) -> AppResult<MovementEntry> {
        self.entries
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("plan committed without a ledger entry".to_string()))
    }
}

/// Snapshot reads and plan commits over one connection pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Catalog entries for the given materials
    pub async fn load_catalog(&self, material_ids: &[Uuid]) -> AppResult<MaterialCatalog> {
        let rows = sqlx::query_as::<_, MaterialRow>(
            r#"
            SELECT id, codigo, nombre, unidad, costo_unitario
            FROM materials
            WHERE id = ANY($1)
            "#,
        )
        .bind(material_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Material::from).collect())
    }

    /// Balances of one technician for the given materials, plus the pool
    pub async fn load_snapshot(
        &self,
        technician_id: Uuid,
        material_ids: &[Uuid],
    ) -> AppResult<StockSnapshot> {
        let rows = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT technician_id, material_id, cantidad_actual, cantidad_apartada,
                   cantidad_disponible, ultimo_movimiento, version
            FROM technician_stock
            WHERE technician_id = $1 AND material_id = ANY($2)
            "#,
        )
        .bind(technician_id)
        .bind(material_ids)
        .fetch_all(&self.db)
        .await?;

        let central: Vec<(Uuid, Decimal)> = sqlx::query_as(
            "SELECT material_id, cantidad FROM central_stock WHERE material_id = ANY($1)",
        )
        .bind(material_ids)
        .fetch_all(&self.db)
        .await?;

        let mut snapshot = StockSnapshot::default();
        for row in rows {
            let key = StockKey::new(row.technician_id, row.material_id);
            snapshot.balances.insert(key, row.into());
        }
        snapshot.central.extend(central);
        Ok(snapshot)
    }

    pub async fn load_control(&self, control_id: Uuid) -> AppResult<MaterialControl> {
        let row = sqlx::query_as::<_, ControlRow>(&format!(
            "SELECT {} FROM material_controls WHERE id = $1",
            CONTROL_COLUMNS
        ))
        .bind(control_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(DomainError::NotFound {
            resource: "Material control",
            id: control_id,
        })?;

        let mut controls = self.assemble(vec![row]).await?;
        controls.pop().ok_or(AppError::NotFound("Material control".to_string()))
    }

    /// Controls matching the optional filters, oldest assignment first
    pub async fn query_controls(
        &self,
        technician_id: Option<Uuid>,
        estado: Option<&str>,
        tiene_descuadre: Option<bool>,
        descuadre_resuelto: Option<bool>,
        solo_abiertos: bool,
    ) -> AppResult<Vec<MaterialControl>> {
        let rows = sqlx::query_as::<_, ControlRow>(&format!(
            r#"
            SELECT {}
            FROM material_controls
            WHERE ($1::uuid IS NULL OR technician_id = $1)
              AND ($2::varchar IS NULL OR estado_general = $2)
              AND ($3::boolean IS NULL OR tiene_descuadre = $3)
              AND ($4::boolean IS NULL OR descuadre_resuelto = $4)
              AND (NOT $5 OR estado_general <> 'cerrado')
            ORDER BY fecha_asignacion, id
            "#,
            CONTROL_COLUMNS
        ))
        .bind(technician_id)
        .bind(estado)
        .bind(tiene_descuadre)
        .bind(descuadre_resuelto)
        .bind(solo_abiertos)
        .fetch_all(&self.db)
        .await?;

        self.assemble(rows).await
    }

    async fn assemble(&self, rows: Vec<ControlRow>) -> AppResult<Vec<MaterialControl>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let lines = sqlx::query_as::<_, LineRow>(&format!(
            "SELECT {} FROM assignment_lines WHERE control_id = ANY($1) ORDER BY control_id, posicion",
            LINE_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;

        let history = sqlx::query_as::<_, HistoryRow>(
            "SELECT control_id, estado, fecha FROM control_state_history WHERE control_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;

        let mut lines_by_control: HashMap<Uuid, Vec<LineRow>> = HashMap::new();
        for line in lines {
            lines_by_control.entry(line.control_id).or_default().push(line);
        }
        let mut history_by_control: HashMap<Uuid, Vec<HistoryRow>> = HashMap::new();
        for change in history {
            history_by_control
                .entry(change.control_id)
                .or_default()
                .push(change);
        }

        rows.into_iter()
            .map(|row| {
                let lines = lines_by_control.remove(&row.id).unwrap_or_default();
                let history = history_by_control.remove(&row.id).unwrap_or_default();
                row.into_control(lines, history)
            })
            .collect()
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Write a plan atomically; any stale version rolls everything back
    pub async fn commit(&self, plan: Plan, low_stock_threshold: Decimal) -> AppResult<CommitOutcome> {
        let alert_kinds = plan.alert_events(low_stock_threshold);
        let mut tx = self.db.begin().await?;

        let control = match plan.control {
            Some(write) => Some(write_control(&mut tx, write).await?),
            None => None,
        };

        for write in &plan.balances {
            let line = &write.line;
            let result = if write.expected_version == 0 {
                sqlx::query(
                    r#"
                    INSERT INTO technician_stock
                        (technician_id, material_id, cantidad_actual, cantidad_apartada,
                         cantidad_disponible, ultimo_movimiento, version)
                    VALUES ($1, $2, $3, $4, $5, $6, 1)
                    ON CONFLICT (technician_id, material_id) DO NOTHING
                    "#,
                )
                .bind(line.technician_id)
                .bind(line.material_id)
                .bind(line.cantidad_actual)
                .bind(line.cantidad_apartada)
                .bind(line.cantidad_disponible)
                .bind(line.ultimo_movimiento)
                .execute(&mut *tx)
                .await?
            } else {
                sqlx::query(
                    r#"
                    UPDATE technician_stock
                    SET cantidad_actual = $3, cantidad_apartada = $4, cantidad_disponible = $5,
                        ultimo_movimiento = $6, version = version + 1
                    WHERE technician_id = $1 AND material_id = $2 AND version = $7
                    "#,
                )
                .bind(line.technician_id)
                .bind(line.material_id)
                .bind(line.cantidad_actual)
                .bind(line.cantidad_apartada)
                .bind(line.cantidad_disponible)
                .bind(line.ultimo_movimiento)
                .bind(write.expected_version)
                .execute(&mut *tx)
                .await?
            };

            if result.rows_affected() == 0 {
                tracing::warn!(
                    technician_id = %line.technician_id,
                    material_id = %line.material_id,
                    expected_version = write.expected_version,
                    "Stale stock balance"
                );
                return Err(DomainError::ConcurrencyConflict {
                    resource: format!("stock {}/{}", line.technician_id, line.material_id),
                }
                .into());
            }
        }

        for change in &plan.pool {
            if change.delta >= Decimal::ZERO {
                sqlx::query(
                    r#"
                    INSERT INTO central_stock (material_id, cantidad)
                    VALUES ($1, $2)
                    ON CONFLICT (material_id) DO UPDATE
                    SET cantidad = central_stock.cantidad + EXCLUDED.cantidad,
                        version = central_stock.version + 1,
                        updated_at = NOW()
                    "#,
                )
                .bind(change.material_id)
                .bind(change.delta)
                .execute(&mut *tx)
                .await?;
            } else {
                let requested = -change.delta;
                let result = sqlx::query(
                    r#"
                    UPDATE central_stock
                    SET cantidad = cantidad - $2, version = version + 1, updated_at = NOW()
                    WHERE material_id = $1 AND cantidad >= $2
                    "#,
                )
                .bind(change.material_id)
                .bind(requested)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    let available: Option<Decimal> = sqlx::query_scalar(
                        "SELECT cantidad FROM central_stock WHERE material_id = $1",
                    )
                    .bind(change.material_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                    return Err(DomainError::InsufficientStock {
                        material_id: change.material_id,
                        requested,
                        available: available.unwrap_or_default(),
                    }
                    .into());
                }
            }
        }

        let mut entries = Vec::with_capacity(plan.entries.len());
        for mut entry in plan.entries {
            entry.secuencia = sqlx::query_scalar(
                r#"
                INSERT INTO movement_ledger
                    (id, technician_id, material_id, tipo, cantidad, direccion, motivo,
                     responsable_id, origen_tipo, origen_referencia, control_id,
                     visible_para_analistas, fecha)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                RETURNING secuencia
                "#,
            )
            .bind(entry.id)
            .bind(entry.technician_id)
            .bind(entry.material_id)
            .bind(entry.tipo.as_str())
            .bind(entry.cantidad)
            .bind(entry.direccion.map(|d| d.as_str()))
            .bind(&entry.motivo)
            .bind(entry.responsable_id)
            .bind(entry.origen.kind.as_str())
            .bind(entry.origen.reference_id)
            .bind(entry.control_id)
            .bind(entry.visible_para_analistas)
            .bind(entry.fecha)
            .fetch_one(&mut *tx)
            .await?;
            entries.push(entry);
        }

        let mut alerts = Vec::with_capacity(alert_kinds.len());
        for evento in alert_kinds {
            let payload = serde_json::to_value(&evento)
                .map_err(|e| AppError::Internal(format!("Failed to encode alert: {}", e)))?;
            let fecha = Utc::now();
            let secuencia: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO alert_events (tipo, technician_id, payload, fecha)
                VALUES ($1, $2, $3, $4)
                RETURNING secuencia
                "#,
            )
            .bind(evento.as_str())
            .bind(evento.technician_id())
            .bind(payload)
            .bind(fecha)
            .fetch_one(&mut *tx)
            .await?;
            alerts.push(AlertEvent {
                secuencia,
                evento,
                fecha,
            });
        }

        tx.commit().await?;

        Ok(CommitOutcome {
            entries,
            control,
            alerts,
        })
    }
}

/// Insert a new control or CAS-update an existing one, lines and history included
async fn write_control(
    tx: &mut Transaction<'_, Postgres>,
    write: ControlWrite,
) -> AppResult<MaterialControl> {
    let mut control = write.control;
    let valor_descuadre = control.valor_descuadre();
    let tiene_descuadre = control.tiene_descuadre();

    let result = match write.expected_version {
        None => {
            control.version = 0;
            sqlx::query(
                r#"
                INSERT INTO material_controls
                    (id, technician_id, order_id, bodeguero_id, analista_id, estado_general,
                     fecha_asignacion, fecha_inicio_trabajo, fecha_fin_trabajo, fecha_devolucion,
                     fecha_resolucion_descuadre, fecha_cierre, valor_descuadre, tiene_descuadre,
                     descuadre_resuelto, motivo_descuadre, observaciones_bodeguero,
                     observaciones_tecnico, observaciones_analista, version)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                        $17, $18, $19, 0)
                "#,
            )
            .bind(control.id)
            .bind(control.technician_id)
            .bind(control.order_id)
            .bind(control.bodeguero_id)
            .bind(control.analista_id)
            .bind(control.estado_general.as_str())
            .bind(control.fecha_asignacion)
            .bind(control.fecha_inicio_trabajo)
            .bind(control.fecha_fin_trabajo)
            .bind(control.fecha_devolucion)
            .bind(control.fecha_resolucion_descuadre)
            .bind(control.fecha_cierre)
            .bind(valor_descuadre)
            .bind(tiene_descuadre)
            .bind(control.descuadre_resuelto)
            .bind(&control.motivo_descuadre)
            .bind(&control.observaciones_bodeguero)
            .bind(&control.observaciones_tecnico)
            .bind(&control.observaciones_analista)
            .execute(&mut **tx)
            .await?
        }
        Some(expected) => {
            control.version = expected + 1;
            sqlx::query(
                r#"
                UPDATE material_controls
                SET analista_id = $2, estado_general = $3, fecha_inicio_trabajo = $4,
                    fecha_fin_trabajo = $5, fecha_devolucion = $6,
                    fecha_resolucion_descuadre = $7, fecha_cierre = $8, valor_descuadre = $9,
                    tiene_descuadre = $10, descuadre_resuelto = $11, motivo_descuadre = $12,
                    observaciones_tecnico = $13, observaciones_analista = $14,
                    version = version + 1, updated_at = NOW()
                WHERE id = $1 AND version = $15
                "#,
            )
            .bind(control.id)
            .bind(control.analista_id)
            .bind(control.estado_general.as_str())
            .bind(control.fecha_inicio_trabajo)
            .bind(control.fecha_fin_trabajo)
            .bind(control.fecha_devolucion)
            .bind(control.fecha_resolucion_descuadre)
            .bind(control.fecha_cierre)
            .bind(valor_descuadre)
            .bind(tiene_descuadre)
            .bind(control.descuadre_resuelto)
            .bind(&control.motivo_descuadre)
            .bind(&control.observaciones_tecnico)
            .bind(&control.observaciones_analista)
            .bind(expected)
            .execute(&mut **tx)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        tracing::warn!(control_id = %control.id, "Stale material control");
        return Err(DomainError::ConcurrencyConflict {
            resource: format!("control {}", control.id),
        }
        .into());
    }

    for (posicion, line) in control.lines.iter().enumerate() {
        let posicion = i32::try_from(posicion)
            .map_err(|_| AppError::Internal("too many assignment lines".to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO assignment_lines
                (control_id, material_id, posicion, cantidad_asignada, cantidad_utilizada,
                 cantidad_devuelta, cantidad_perdida, motivo_perdida, valor_perdida, estado)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (control_id, material_id) DO UPDATE
            SET cantidad_utilizada = EXCLUDED.cantidad_utilizada,
                cantidad_devuelta = EXCLUDED.cantidad_devuelta,
                cantidad_perdida = EXCLUDED.cantidad_perdida,
                motivo_perdida = EXCLUDED.motivo_perdida,
                valor_perdida = EXCLUDED.valor_perdida,
                estado = EXCLUDED.estado
            "#,
        )
        .bind(line.control_id)
        .bind(line.material_id)
        .bind(posicion)
        .bind(line.cantidad_asignada)
        .bind(line.cantidad_utilizada)
        .bind(line.cantidad_devuelta)
        .bind(line.cantidad_perdida)
        .bind(&line.motivo_perdida)
        .bind(line.valor_perdida)
        .bind(line.estado.as_str())
        .execute(&mut **tx)
        .await?;
    }

    for change in &control.historial {
        sqlx::query(
            r#"
            INSERT INTO control_state_history (control_id, estado, fecha)
            VALUES ($1, $2, $3)
            ON CONFLICT (control_id, estado) DO NOTHING
            "#,
        )
        .bind(control.id)
        .bind(change.estado.as_str())
        .bind(change.fecha)
        .execute(&mut **tx)
        .await?;
    }

    Ok(control)
}
