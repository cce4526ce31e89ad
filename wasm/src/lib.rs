//! WebAssembly module for the field materials client
//!
//! Lets the technician app check a return before sending it:
//! - Per-line conservation and loss-reason checks
//! - Line state a return would produce
//! - Full discrepancy preview against a control
//! - Low-balance check for the stock screen
//!
//! Quantities cross the boundary as decimal strings so nothing is rounded.

use std::str::FromStr;

use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::reconciliation::{ReturnLineUpdate, ReturnPreview, ReturnRequest};
pub use shared::validation::*;

fn parse_quantity(field: &str, value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|_| format!("{} is not a valid quantity: '{}'", field, value))
}

fn check_return_line(
    asignada: &str,
    utilizada: &str,
    devuelta: &str,
    perdida: &str,
    motivo_perdida: Option<&str>,
) -> Result<(), String> {
    let asignada = parse_quantity("asignada", asignada)?;
    let utilizada = parse_quantity("utilizada", utilizada)?;
    let devuelta = parse_quantity("devuelta", devuelta)?;
    let perdida = parse_quantity("perdida", perdida)?;
    validate_line_conservation(asignada, utilizada, devuelta, perdida)?;
    validate_loss_reason(perdida, motivo_perdida)?;
    Ok(())
}

fn line_state_after_return(asignada: &str, devuelta: &str) -> Result<String, String> {
    let asignada = parse_quantity("asignada", asignada)?;
    let devuelta = parse_quantity("devuelta", devuelta)?;
    Ok(LineState::after_return(asignada, devuelta).as_str().to_string())
}

fn preview_json(control_json: &str, request_json: &str, materials_json: &str) -> Result<String, String> {
    let control: MaterialControl =
        serde_json::from_str(control_json).map_err(|e| format!("Invalid control JSON: {}", e))?;
    let request: ReturnRequest =
        serde_json::from_str(request_json).map_err(|e| format!("Invalid return JSON: {}", e))?;
    let materials: Vec<Material> = serde_json::from_str(materials_json)
        .map_err(|e| format!("Invalid materials JSON: {}", e))?;

    let mut catalog = MaterialCatalog::new();
    for material in materials {
        catalog.insert(material);
    }

    let preview = shared::reconciliation::preview_return(&control, &request, &catalog)
        .map_err(|e| e.to_string())?;
    serde_json::to_string(&preview).map_err(|e| format!("Failed to encode preview: {}", e))
}

/// Check one reported line: used + returned + lost equals assigned, and a
/// loss carries a reason
#[wasm_bindgen]
pub fn validate_return_line(
    asignada: &str,
    utilizada: &str,
    devuelta: &str,
    perdida: &str,
    motivo_perdida: Option<String>,
) -> Result<(), JsValue> {
    check_return_line(asignada, utilizada, devuelta, perdida, motivo_perdida.as_deref())
        .map_err(|e| JsValue::from_str(&e))
}

/// State a line ends in after its return is recorded
#[wasm_bindgen]
pub fn classify_line_state(asignada: &str, devuelta: &str) -> Result<String, JsValue> {
    line_state_after_return(asignada, devuelta).map_err(|e| JsValue::from_str(&e))
}

/// Evaluate a return without sending it; returns the preview as JSON
#[wasm_bindgen]
pub fn preview_discrepancy(
    control_json: &str,
    request_json: &str,
    materials_json: &str,
) -> Result<String, JsValue> {
    preview_json(control_json, request_json, materials_json).map_err(|e| JsValue::from_str(&e))
}

/// Whether an available balance should be flagged as running low
#[wasm_bindgen]
pub fn is_running_low(disponible: &str, threshold: &str) -> Result<bool, JsValue> {
    let disponible = parse_quantity("disponible", disponible).map_err(|e| JsValue::from_str(&e))?;
    let threshold = parse_quantity("threshold", threshold).map_err(|e| JsValue::from_str(&e))?;
    Ok(is_low_balance(disponible, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_check_return_line() {
        assert!(check_return_line("10", "7", "3", "0", None).is_ok());
        assert!(check_return_line("10", "7", "2", "0", None).is_err());
        assert!(check_return_line("10", "7", "2", "1", None).is_err());
        assert!(check_return_line("10", "7", "2", "1", Some("dropped in a manhole")).is_ok());
        assert!(check_return_line("10", "abc", "0", "0", None).is_err());
    }

    #[test]
    fn test_check_return_line_out_of_range() {
        let max = Decimal::MAX.to_string();
        assert!(check_return_line("10", &max, "1", "0", None).is_err());
        assert!(check_return_line(&max, &max, &max, "0", None).is_err());
        assert!(check_return_line("10", "9.99995", "0", "0.00005", Some("trim")).is_err());
        assert!(check_return_line("10", "9.9999", "0", "0.0001", Some("trim")).is_ok());
    }

    #[test]
    fn test_line_state_after_return() {
        assert_eq!(line_state_after_return("10", "0").unwrap(), "completado");
        assert_eq!(line_state_after_return("10", "10").unwrap(), "devuelto_total");
        assert_eq!(line_state_after_return("10", "2.5").unwrap(), "devuelto_parcial");
    }

    #[test]
    fn test_preview_prices_the_loss() {
        let material = Material {
            id: Uuid::new_v4(),
            codigo: "CAB-UTP-05".to_string(),
            nombre: "Cable UTP".to_string(),
            unidad: "m".to_string(),
            costo_unitario: Decimal::from(2),
        };
        let now = Utc::now();
        let mut control = MaterialControl::new(Uuid::new_v4(), Uuid::new_v4(), None, now);
        control
            .lines
            .push(AssignmentLine::new(control.id, material.id, Decimal::from(10)));
        control
            .transition(ControlState::EnTrabajo, "start", now)
            .unwrap();
        control
            .transition(ControlState::TrabajoCompletado, "complete", now)
            .unwrap();

        let request = ReturnRequest {
            lines: vec![ReturnLineUpdate {
                material_id: material.id,
                cantidad_utilizada: Decimal::from(6),
                cantidad_devuelta: Decimal::from(1),
                cantidad_perdida: Decimal::from(3),
                motivo_perdida: Some("stolen from the van".to_string()),
            }],
            observaciones: None,
        };

        let json = preview_json(
            &serde_json::to_string(&control).unwrap(),
            &serde_json::to_string(&request).unwrap(),
            &serde_json::to_string(&vec![material]).unwrap(),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["estado_resultante"], "devolucion_completada");
        assert_eq!(value["tiene_descuadre"], true);
        assert_eq!(value["lines"][0]["estado"], "devuelto_parcial");
    }
}
