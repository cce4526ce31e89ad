//! HTTP handlers for the alert outbox

use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::AppResult;
use crate::middleware::{CurrentUser, Role};
use crate::models::AlertEvent;
use crate::services::alerts::AlertQuery;
use crate::services::AlertService;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 100;

/// Events after a sequence number; poll again with the last `secuencia` seen
pub async fn list_alerts(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<AlertQuery>,
) -> AppResult<Json<Vec<AlertEvent>>> {
    current_user
        .0
        .require_role(&[Role::Bodeguero, Role::Analista])?;
    let events = AlertService::new(state.db)
        .after(query.after.unwrap_or(0), query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(events))
}
