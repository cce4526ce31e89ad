//! HTTP handlers for movement ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::PaginatedResponse;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{CurrentUser, Role};
use crate::models::MovementEntry;
use crate::services::ledger::{AdjustInput, LedgerQuery, ReceiveInput, RestockInput};
use crate::services::LedgerService;
use crate::AppState;

fn ledger_service(state: &AppState) -> LedgerService {
    LedgerService::new(state.db.clone(), state.config.stock.engine_config())
}

/// Manual stock entry into a technician's van
pub async fn receive_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ReceiveInput>,
) -> AppResult<(StatusCode, Json<MovementEntry>)> {
    current_user.0.require_role(&[Role::Bodeguero])?;
    let entry = ledger_service(&state)
        .receive(current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Signed correction of a technician's stock
pub async fn adjust_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AdjustInput>,
) -> AppResult<(StatusCode, Json<MovementEntry>)> {
    current_user.0.require_role(&[Role::Bodeguero])?;
    let entry = ledger_service(&state)
        .adjust(current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Serialize)]
pub struct CentralStockResponse {
    pub material_id: Uuid,
    pub cantidad_disponible: Decimal,
}

/// Replenish the central warehouse pool
pub async fn restock_central(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RestockInput>,
) -> AppResult<Json<CentralStockResponse>> {
    current_user.0.require_role(&[Role::Bodeguero])?;
    let material_id = input.material_id;
    let cantidad_disponible = ledger_service(&state).restock_central(input).await?;
    Ok(Json(CentralStockResponse {
        material_id,
        cantidad_disponible,
    }))
}

/// A technician's movements, filtered and paginated
pub async fn technician_ledger(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(technician_id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> AppResult<Json<PaginatedResponse<MovementEntry>>> {
    current_user
        .0
        .require_self_or_role(technician_id, &[Role::Bodeguero, Role::Analista])?;
    let page = ledger_service(&state)
        .for_technician(technician_id, query, !current_user.0.sees_hidden_entries())
        .await?;
    Ok(Json(page))
}

pub async fn material_ledger(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<Vec<MovementEntry>>> {
    current_user
        .0
        .require_role(&[Role::Bodeguero, Role::Analista])?;
    let entries = ledger_service(&state)
        .for_material(material_id, !current_user.0.sees_hidden_entries())
        .await?;
    Ok(Json(entries))
}
