//! Route definitions for the field materials API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - assignment lifecycle
        .nest("/controls", control_routes())
        // Protected routes - per-technician stock, ledger and open work
        .nest("/technicians", technician_routes())
        // Protected routes - manual ledger writes
        .nest("/ledger", ledger_routes())
        .nest("/materials", material_routes())
        .nest("/central-stock", central_stock_routes())
        .nest("/stock", stock_routes())
        .nest("/me", me_routes())
        .nest("/alerts", alert_routes())
}

/// Material control routes (protected)
fn control_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_controls).post(handlers::assign_materials),
        )
        .route("/:control_id", get(handlers::get_control))
        .route("/:control_id/ledger", get(handlers::get_control_ledger))
        .route("/:control_id/start", post(handlers::start_work))
        .route("/:control_id/complete", post(handlers::complete_work))
        .route("/:control_id/returns", post(handlers::record_return))
        .route(
            "/:control_id/returns/preview",
            post(handlers::preview_return),
        )
        .route("/:control_id/resolve", post(handlers::resolve_discrepancy))
        .route("/:control_id/close", post(handlers::close_control))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Technician routes (protected)
fn technician_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/:technician_id/controls/open",
            get(handlers::list_open_for_technician),
        )
        .route("/:technician_id/stock", get(handlers::technician_stock))
        .route(
            "/:technician_id/stock/:material_id",
            get(handlers::technician_material_stock),
        )
        .route("/:technician_id/ledger", get(handlers::technician_ledger))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Ledger write routes (protected)
fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/entries", post(handlers::receive_stock))
        .route("/adjustments", post(handlers::adjust_stock))
        .route_layer(middleware::from_fn(auth_middleware))
}

fn material_routes() -> Router<AppState> {
    Router::new()
        .route("/:material_id/ledger", get(handlers::material_ledger))
        .route_layer(middleware::from_fn(auth_middleware))
}

fn central_stock_routes() -> Router<AppState> {
    Router::new()
        .route("/restock", post(handlers::restock_central))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Projection maintenance (protected, admin)
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/rebuild", post(handlers::rebuild_stock))
        .route_layer(middleware::from_fn(auth_middleware))
}

fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/controls", get(handlers::my_controls))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Alert outbox routes (protected)
fn alert_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_alerts))
        .route_layer(middleware::from_fn(auth_middleware))
}
