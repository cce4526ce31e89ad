//! HTTP handlers for technician stock endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{CurrentUser, Role};
use crate::models::TechnicianStockLine;
use crate::services::stock::RebuildReport;
use crate::services::StockService;
use crate::AppState;

const STAFF: &[Role] = &[Role::Bodeguero, Role::Analista];

/// All balances a technician carries
pub async fn technician_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(technician_id): Path<Uuid>,
) -> AppResult<Json<Vec<TechnicianStockLine>>> {
    current_user.0.require_self_or_role(technician_id, STAFF)?;
    let lines = StockService::new(state.db)
        .balances_for(technician_id)
        .await?;
    Ok(Json(lines))
}

/// One balance; zero when the technician never held the material
pub async fn technician_material_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((technician_id, material_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<TechnicianStockLine>> {
    current_user.0.require_self_or_role(technician_id, STAFF)?;
    let line = StockService::new(state.db)
        .balance(technician_id, material_id)
        .await?;
    Ok(Json(line))
}

#[derive(Debug, Default, Deserialize)]
pub struct RebuildQuery {
    /// Write the refolded balances back; otherwise only report
    #[serde(default)]
    pub apply: bool,
}

/// Refold the ledger and compare against stored balances
pub async fn rebuild_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<RebuildQuery>,
) -> AppResult<Json<RebuildReport>> {
    current_user.0.require_role(&[Role::Admin])?;
    let report = StockService::new(state.db).rebuild(query.apply).await?;
    Ok(Json(report))
}
