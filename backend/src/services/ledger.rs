//! Movement ledger service: manual entries, adjustments and ledger queries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{
    plan_adjustment, plan_receive, plan_restock_central, AdjustmentDirection, AdjustmentRequest,
    EngineConfig, PaginatedResponse, Pagination, ReceiveRequest,
};

use crate::error::{AppError, AppResult};
use crate::models::{LedgerRow, MovementEntry, MovementType};
use crate::services::store::{PgStore, LEDGER_COLUMNS};

/// Input for loading stock into a technician's van
#[derive(Debug, Deserialize, Validate)]
pub struct ReceiveInput {
    pub technician_id: Uuid,
    pub material_id: Uuid,
    pub cantidad: Decimal,
    #[validate(length(min = 1, max = 500, message = "A reason is required"))]
    pub motivo: String,
    pub order_id: Option<Uuid>,
    pub visible_para_analistas: Option<bool>,
}

/// Input for a signed stock correction
#[derive(Debug, Deserialize, Validate)]
pub struct AdjustInput {
    pub technician_id: Uuid,
    pub material_id: Uuid,
    pub direccion: AdjustmentDirection,
    pub cantidad: Decimal,
    #[validate(length(min = 1, max = 500, message = "A reason is required"))]
    pub motivo: String,
    /// Control being corrected, usually one already closed
    pub control_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RestockInput {
    pub material_id: Uuid,
    pub cantidad: Decimal,
}

/// Query parameters for a technician's ledger
#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub material_id: Option<Uuid>,
    pub tipo: Option<MovementType>,
    pub desde: Option<DateTime<Utc>>,
    pub hasta: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
    store: PgStore,
    config: EngineConfig,
}

impl LedgerService {
    pub fn new(db: PgPool, config: EngineConfig) -> Self {
        Self {
            store: PgStore::new(db.clone()),
            db,
            config,
        }
    }

    /// Manual `entrada`
    pub async fn receive(&self, responsable_id: Uuid, input: ReceiveInput) -> AppResult<MovementEntry> {
        input.validate()?;

        let catalog = self.store.load_catalog(&[input.material_id]).await?;
        let snapshot = self
            .store
            .load_snapshot(input.technician_id, &[input.material_id])
            .await?;
        let request = ReceiveRequest {
            technician_id: input.technician_id,
            material_id: input.material_id,
            cantidad: input.cantidad,
            motivo: input.motivo,
            responsable_id,
            order_id: input.order_id,
            visible_para_analistas: input.visible_para_analistas.unwrap_or(true),
        };
        let plan = plan_receive(&snapshot, &catalog, request, Utc::now())?;
        let entry = self
            .store
            .commit(plan, self.config.low_stock_threshold)
            .await?
            .into_entry()?;

        tracing::info!(
            secuencia = entry.secuencia,
            technician_id = %entry.technician_id,
            material_id = %entry.material_id,
            cantidad = %entry.cantidad,
            "Stock received"
        );
        Ok(entry)
    }

    /// Signed `ajuste`, optionally referencing a control of the same technician
    pub async fn adjust(&self, responsable_id: Uuid, input: AdjustInput) -> AppResult<MovementEntry> {
        input.validate()?;

        let referenced = match input.control_id {
            Some(control_id) => Some(self.store.load_control(control_id).await?),
            None => None,
        };
        let catalog = self.store.load_catalog(&[input.material_id]).await?;
        let snapshot = self
            .store
            .load_snapshot(input.technician_id, &[input.material_id])
            .await?;
        let request = AdjustmentRequest {
            technician_id: input.technician_id,
            material_id: input.material_id,
            direccion: input.direccion,
            cantidad: input.cantidad,
            motivo: input.motivo,
            responsable_id,
            control_id: input.control_id,
        };
        let plan = plan_adjustment(
            &snapshot,
            &catalog,
            request,
            referenced.as_ref(),
            Utc::now(),
        )?;
        let entry = self
            .store
            .commit(plan, self.config.low_stock_threshold)
            .await?
            .into_entry()?;

        tracing::info!(
            secuencia = entry.secuencia,
            technician_id = %entry.technician_id,
            direccion = ?entry.direccion,
            control_id = ?entry.control_id,
            "Stock adjusted"
        );
        Ok(entry)
    }

    /// Add units to the shared warehouse pool; returns the new pool level
    pub async fn restock_central(&self, input: RestockInput) -> AppResult<Decimal> {
        let catalog = self.store.load_catalog(&[input.material_id]).await?;
        let plan = plan_restock_central(&catalog, input.material_id, input.cantidad)?;
        self.store
            .commit(plan, self.config.low_stock_threshold)
            .await?;

        let cantidad: Decimal =
            sqlx::query_scalar("SELECT cantidad FROM central_stock WHERE material_id = $1")
                .bind(input.material_id)
                .fetch_one(&self.db)
                .await?;

        tracing::info!(material_id = %input.material_id, cantidad = %cantidad, "Central stock replenished");
        Ok(cantidad)
    }

    /// One technician's ledger, timestamp order, one page at a time
    pub async fn for_technician(
        &self,
        technician_id: Uuid,
        query: LedgerQuery,
        solo_visibles: bool,
    ) -> AppResult<PaginatedResponse<MovementEntry>> {
        let pagination = Pagination::new(query.page, query.per_page);
        let tipo = query.tipo.map(|t| t.as_str());

        let filters = r#"
            WHERE technician_id = $1
              AND ($2::uuid IS NULL OR material_id = $2)
              AND ($3::varchar IS NULL OR tipo = $3)
              AND ($4::timestamptz IS NULL OR fecha >= $4)
              AND ($5::timestamptz IS NULL OR fecha <= $5)
              AND (NOT $6 OR visible_para_analistas)
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM movement_ledger {}",
            filters
        ))
        .bind(technician_id)
        .bind(query.material_id)
        .bind(tipo)
        .bind(query.desde)
        .bind(query.hasta)
        .bind(solo_visibles)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {} FROM movement_ledger {} ORDER BY fecha, secuencia LIMIT $7 OFFSET $8",
            LEDGER_COLUMNS, filters
        ))
        .bind(technician_id)
        .bind(query.material_id)
        .bind(tipo)
        .bind(query.desde)
        .bind(query.hasta)
        .bind(solo_visibles)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let entries = rows
            .into_iter()
            .map(MovementEntry::try_from)
            .collect::<Result<Vec<_>, AppError>>()?;
        Ok(PaginatedResponse::new(entries, pagination, total.max(0) as u64))
    }

    /// Every movement of one material, across technicians
    pub async fn for_material(
        &self,
        material_id: Uuid,
        solo_visibles: bool,
    ) -> AppResult<Vec<MovementEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            r#"
            SELECT {}
            FROM movement_ledger
            WHERE material_id = $1 AND (NOT $2 OR visible_para_analistas)
            ORDER BY fecha, secuencia
            "#,
            LEDGER_COLUMNS
        ))
        .bind(material_id)
        .bind(solo_visibles)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MovementEntry::try_from).collect()
    }

    /// Entries written on behalf of one control
    pub async fn for_control(&self, control_id: Uuid) -> AppResult<Vec<MovementEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {} FROM movement_ledger WHERE control_id = $1 ORDER BY fecha, secuencia",
            LEDGER_COLUMNS
        ))
        .bind(control_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MovementEntry::try_from).collect()
    }
}
