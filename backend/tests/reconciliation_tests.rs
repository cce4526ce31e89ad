//! Reconciliation engine tests
//!
//! Scenario tests for the assignment lifecycle including:
//! - Full happy path with a loss
//! - Clean return, mismatched quantities, resolve then close, premature close
//! - Property 4: Atomicity of rejected multi-line operations
//! - Partial returns, post-close adjustments, central pool policy, alerts
//! - Quantities outside the stored precision or range

use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::{
    preview_return, AdjustmentDirection, AdjustmentRequest, AlertKind, AssignmentLineInput,
    AssignmentRequest, ControlState, DomainError, EngineConfig, LineState, Material,
    MaterialCatalog, MaterialControl, MaterialEngine, MovementType, ReceiveRequest,
    ReturnLineUpdate, ReturnRequest, StockPolicy,
};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct Fixture {
    engine: MaterialEngine,
    technician_id: Uuid,
    bodeguero_id: Uuid,
    analista_id: Uuid,
    cable: Material,
    conector: Material,
}

fn material(codigo: &str, costo: &str) -> Material {
    Material {
        id: Uuid::new_v4(),
        codigo: codigo.to_string(),
        nombre: codigo.to_string(),
        unidad: "und".to_string(),
        costo_unitario: dec(costo),
    }
}

/// Technician carrying 50 m of cable and 100 connectors
fn fixture_with(config: EngineConfig) -> Fixture {
    let cable = material("CAB-UTP-05", "2.50");
    let conector = material("CON-RJ45", "0.40");
    let catalog: MaterialCatalog = vec![cable.clone(), conector.clone()].into_iter().collect();
    let engine = MaterialEngine::new(catalog, config);
    let technician_id = Uuid::new_v4();
    let bodeguero_id = Uuid::new_v4();

    if config.policy == StockPolicy::TechnicianStock {
        for (m, q) in [(&cable, "50"), (&conector, "100")] {
            engine
                .receive(ReceiveRequest {
                    technician_id,
                    material_id: m.id,
                    cantidad: dec(q),
                    motivo: "Carga de camioneta".to_string(),
                    responsable_id: bodeguero_id,
                    order_id: None,
                    visible_para_analistas: true,
                })
                .unwrap();
        }
    }

    Fixture {
        engine,
        technician_id,
        bodeguero_id,
        analista_id: Uuid::new_v4(),
        cable,
        conector,
    }
}

fn fixture() -> Fixture {
    fixture_with(EngineConfig::default())
}

impl Fixture {
    fn assign(&self, lines: &[(&Material, &str)]) -> Result<MaterialControl, DomainError> {
        self.engine.assign(AssignmentRequest {
            technician_id: self.technician_id,
            bodeguero_id: self.bodeguero_id,
            order_id: Some(Uuid::new_v4()),
            lines: lines
                .iter()
                .map(|(m, q)| AssignmentLineInput {
                    material_id: m.id,
                    cantidad: dec(q),
                })
                .collect(),
            observaciones: None,
        })
    }

    /// Assign, start and complete in one go
    fn finished_job(&self, lines: &[(&Material, &str)]) -> MaterialControl {
        let control = self.assign(lines).unwrap();
        self.engine
            .start_work(control.id, self.technician_id)
            .unwrap();
        self.engine.complete_work(control.id, None).unwrap()
    }

    fn report(&self, control_id: Uuid, lines: Vec<ReturnLineUpdate>) -> Result<MaterialControl, DomainError> {
        self.engine.record_return(
            control_id,
            &ReturnRequest {
                lines,
                observaciones: None,
            },
            self.technician_id,
        )
    }
}

fn line(m: &Material, utilizada: &str, devuelta: &str, perdida: &str, motivo: Option<&str>) -> ReturnLineUpdate {
    ReturnLineUpdate {
        material_id: m.id,
        cantidad_utilizada: dec(utilizada),
        cantidad_devuelta: dec(devuelta),
        cantidad_perdida: dec(perdida),
        motivo_perdida: motivo.map(str::to_string),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[cfg(test)]
mod scenarios {
    use super::*;

    /// Assign 10, start, return 7 used / 2 returned / 1 lost
    #[test]
    fn test_full_happy_path_with_loss() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10")]);

        let control = f
            .report(control.id, vec![line(&f.cable, "7", "2", "1", Some("broke"))])
            .unwrap();

        assert_eq!(control.estado_general, ControlState::DevolucionCompletada);
        assert_eq!(control.valor_descuadre(), dec("2.50"));
        assert!(control.tiene_descuadre());
        assert!(control.fecha_devolucion.is_some());
        assert_eq!(control.lines[0].estado, LineState::DevueltoParcial);
        assert!(control
            .motivo_descuadre
            .as_deref()
            .unwrap()
            .contains("CAB-UTP-05"));

        // 50 carried, 10 went out, 2 came back
        let balance = f.engine.balance(f.technician_id, f.cable.id);
        assert_eq!(balance.cantidad_actual, dec("42"));
        assert_eq!(balance.cantidad_apartada, Decimal::ZERO);
        assert_eq!(balance.cantidad_disponible, dec("42"));
        assert!(f.engine.ledger_is_consistent());
    }

    #[test]
    fn test_clean_return_is_closeable_immediately() {
        let f = fixture();
        let control = f.finished_job(&[(&f.conector, "5")]);

        let control = f
            .report(control.id, vec![line(&f.conector, "5", "0", "0", None)])
            .unwrap();
        assert_eq!(control.lines[0].estado, LineState::Completado);
        assert!(!control.tiene_descuadre());
        assert!(control.can_close());

        let closed = f.engine.close(control.id, f.analista_id).unwrap();
        assert_eq!(closed.estado_general, ControlState::Cerrado);
        assert!(closed.fecha_cierre.is_some());
    }

    #[test]
    fn test_full_return_unused() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "8")]);
        let control = f
            .report(control.id, vec![line(&f.cable, "0", "8", "0", None)])
            .unwrap();
        assert_eq!(control.lines[0].estado, LineState::DevueltoTotal);
        assert_eq!(
            f.engine.balance(f.technician_id, f.cable.id).cantidad_disponible,
            dec("50")
        );
    }

    /// 7 + 2 + 2 = 11 against 10 assigned
    #[test]
    fn test_mismatched_quantities_change_nothing() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10")]);
        let ledger_before = f.engine.ledger_len();

        let result = f.report(control.id, vec![line(&f.cable, "7", "2", "2", Some("broke"))]);
        assert!(matches!(result, Err(DomainError::QuantityMismatch { .. })));

        let after = f.engine.control(control.id).unwrap();
        assert_eq!(after, control);
        assert_eq!(f.engine.ledger_len(), ledger_before);
    }

    #[test]
    fn test_loss_without_reason_is_rejected() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10")]);
        let result = f.report(control.id, vec![line(&f.cable, "9", "0", "1", Some("  "))]);
        assert!(matches!(result, Err(DomainError::QuantityMismatch { .. })));
    }

    #[test]
    fn test_resolve_then_close() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10")]);
        f.report(control.id, vec![line(&f.cable, "7", "2", "1", Some("broke"))])
            .unwrap();

        let resolved = f
            .engine
            .resolve_discrepancy(control.id, f.analista_id, "Descontado al técnico".to_string())
            .unwrap();
        assert!(resolved.descuadre_resuelto);
        assert_eq!(resolved.valor_descuadre(), dec("2.50"));
        assert_eq!(resolved.analista_id, Some(f.analista_id));
        assert!(resolved.fecha_resolucion_descuadre.is_some());
        assert_eq!(resolved.estado_general, ControlState::DevolucionCompletada);

        let closed = f.engine.close(control.id, f.analista_id).unwrap();
        assert_eq!(closed.estado_general, ControlState::Cerrado);
        assert_eq!(closed.valor_descuadre(), dec("2.50"));
    }

    #[test]
    fn test_premature_close_is_rejected() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10")]);
        f.report(control.id, vec![line(&f.cable, "7", "2", "1", Some("broke"))])
            .unwrap();

        let result = f.engine.close(control.id, f.analista_id);
        assert!(matches!(result, Err(DomainError::StateTransition { .. })));
        assert_eq!(
            f.engine.control(control.id).unwrap().estado_general,
            ControlState::DevolucionCompletada
        );
    }

    #[test]
    fn test_resolve_without_discrepancy_is_rejected() {
        let f = fixture();
        let control = f.finished_job(&[(&f.conector, "5")]);
        f.report(control.id, vec![line(&f.conector, "5", "0", "0", None)])
            .unwrap();
        let result = f
            .engine
            .resolve_discrepancy(control.id, f.analista_id, "nada".to_string());
        assert!(matches!(result, Err(DomainError::StateTransition { .. })));
    }
}

// ============================================================================
// Lifecycle guards
// ============================================================================

#[cfg(test)]
mod lifecycle {
    use super::*;

    #[test]
    fn test_assignment_reserves_stock() {
        let f = fixture();
        let control = f.assign(&[(&f.cable, "10"), (&f.conector, "20")]).unwrap();

        assert_eq!(control.estado_general, ControlState::Asignado);
        assert_eq!(control.lines.len(), 2);
        assert!(control.lines.iter().all(|l| l.estado == LineState::Pendiente));

        let cable = f.engine.balance(f.technician_id, f.cable.id);
        assert_eq!(cable.cantidad_actual, dec("50"));
        assert_eq!(cable.cantidad_apartada, dec("10"));
        assert_eq!(cable.cantidad_disponible, dec("40"));

        let entries = f.engine.ledger_for_control(control.id);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.tipo == MovementType::Apartado));
        assert!(entries.iter().all(|e| e.responsable_id == f.bodeguero_id));
    }

    #[test]
    fn test_start_work_converts_reservation() {
        let f = fixture();
        let control = f.assign(&[(&f.cable, "10")]).unwrap();
        let started = f
            .engine
            .start_work(control.id, f.technician_id)
            .unwrap();

        assert_eq!(started.estado_general, ControlState::EnTrabajo);
        assert!(started.fecha_inicio_trabajo.is_some());
        assert_eq!(started.lines[0].estado, LineState::EnUso);

        let cable = f.engine.balance(f.technician_id, f.cable.id);
        assert_eq!(cable.cantidad_actual, dec("40"));
        assert_eq!(cable.cantidad_apartada, Decimal::ZERO);
        assert_eq!(cable.cantidad_disponible, dec("40"));
    }

    #[test]
    fn test_operations_out_of_order_are_rejected() {
        let f = fixture();
        let control = f.assign(&[(&f.cable, "10")]).unwrap();

        assert!(matches!(
            f.engine.complete_work(control.id, None),
            Err(DomainError::StateTransition { .. })
        ));
        assert!(matches!(
            f.report(control.id, vec![line(&f.cable, "10", "0", "0", None)]),
            Err(DomainError::StateTransition { .. })
        ));

        f.engine.start_work(control.id, f.technician_id).unwrap();
        assert!(matches!(
            f.engine.start_work(control.id, f.technician_id),
            Err(DomainError::StateTransition { .. })
        ));
    }

    #[test]
    fn test_unknown_control_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.engine.start_work(Uuid::new_v4(), f.technician_id),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn test_empty_assignment_is_rejected() {
        let f = fixture();
        assert!(f.assign(&[]).is_err());
    }

    #[test]
    fn test_partial_returns_until_complete() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10"), (&f.conector, "20")]);

        let pending = f
            .report(control.id, vec![line(&f.cable, "10", "0", "0", None)])
            .unwrap();
        assert_eq!(pending.estado_general, ControlState::DevolucionPendiente);
        assert_eq!(pending.lines[0].estado, LineState::Completado);
        assert_eq!(pending.lines[1].estado, LineState::EnUso);
        assert!(pending.fecha_devolucion.is_none());

        // A reconciled line cannot be reported twice
        assert!(f
            .report(control.id, vec![line(&f.cable, "9", "1", "0", None)])
            .is_err());

        let done = f
            .report(control.id, vec![line(&f.conector, "12", "6", "2", Some("perdidos"))])
            .unwrap();
        assert_eq!(done.estado_general, ControlState::DevolucionCompletada);
        assert_eq!(done.valor_descuadre(), dec("0.80"));
        assert_eq!(
            done.historial.iter().map(|h| h.estado).collect::<Vec<_>>(),
            vec![
                ControlState::Asignado,
                ControlState::EnTrabajo,
                ControlState::TrabajoCompletado,
                ControlState::DevolucionPendiente,
                ControlState::DevolucionCompletada,
            ]
        );
    }

    /// Closed controls are read-only; corrections go through `ajuste`
    #[test]
    fn test_adjustment_after_close() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10")]);
        f.report(control.id, vec![line(&f.cable, "10", "0", "0", None)])
            .unwrap();
        let closed = f.engine.close(control.id, f.analista_id).unwrap();

        assert!(f
            .report(control.id, vec![line(&f.cable, "8", "2", "0", None)])
            .is_err());

        let entry = f
            .engine
            .adjust(AdjustmentRequest {
                technician_id: f.technician_id,
                material_id: f.cable.id,
                direccion: AdjustmentDirection::Incremento,
                cantidad: dec("2"),
                motivo: "Sobrante encontrado después del cierre".to_string(),
                responsable_id: f.bodeguero_id,
                control_id: Some(control.id),
            })
            .unwrap();
        assert_eq!(entry.control_id, Some(control.id));
        assert_eq!(f.engine.control(control.id).unwrap(), closed);
        assert_eq!(
            f.engine.balance(f.technician_id, f.cable.id).cantidad_actual,
            dec("42")
        );
    }

    #[test]
    fn test_adjustment_for_another_technicians_control() {
        let f = fixture();
        let control = f.assign(&[(&f.cable, "1")]).unwrap();
        let result = f.engine.adjust(AdjustmentRequest {
            technician_id: Uuid::new_v4(),
            material_id: f.cable.id,
            direccion: AdjustmentDirection::Incremento,
            cantidad: dec("1"),
            motivo: "Corrección".to_string(),
            responsable_id: f.bodeguero_id,
            control_id: Some(control.id),
        });
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[test]
    fn test_preview_matches_commit() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10")]);
        let request = ReturnRequest {
            lines: vec![line(&f.cable, "6", "1", "3", Some("robados"))],
            observaciones: None,
        };

        let preview = preview_return(&control, &request, f.engine.catalog()).unwrap();
        assert_eq!(f.engine.ledger_for_control(control.id).len(), 2);

        let committed = f
            .engine
            .record_return(control.id, &request, f.technician_id)
            .unwrap();
        assert_eq!(preview.valor_descuadre, committed.valor_descuadre());
        assert_eq!(preview.estado_resultante, committed.estado_general);
        assert_eq!(preview.lines[0].estado, committed.lines[0].estado);
    }

    #[test]
    fn test_queries_by_state_and_discrepancy() {
        let f = fixture();
        let lossy = f.finished_job(&[(&f.cable, "4")]);
        f.report(lossy.id, vec![line(&f.cable, "3", "0", "1", Some("corte"))])
            .unwrap();
        let clean = f.finished_job(&[(&f.conector, "4")]);
        f.report(clean.id, vec![line(&f.conector, "4", "0", "0", None)])
            .unwrap();
        f.engine.close(clean.id, f.analista_id).unwrap();
        let open = f.assign(&[(&f.cable, "1")]).unwrap();

        let open_ids: Vec<_> = f
            .engine
            .open_controls_for(f.technician_id)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(open_ids.len(), 2);
        assert!(open_ids.contains(&lossy.id) && open_ids.contains(&open.id));

        let review = f.engine.controls_by_discrepancy(Some(true), Some(false));
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].id, lossy.id);

        assert_eq!(f.engine.controls_for(f.technician_id, None).len(), 3);
    }
}

// ============================================================================
// Atomicity and stock policy
// ============================================================================

#[cfg(test)]
mod atomicity {
    use super::*;

    /// Property 4: one bad line rejects the whole return
    #[test]
    fn test_bad_line_rejects_whole_return() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10"), (&f.conector, "10")]);
        let ledger_before = f.engine.ledger_len();
        let balance_before = f.engine.balance(f.technician_id, f.cable.id);

        let result = f.report(
            control.id,
            vec![
                line(&f.cable, "5", "5", "0", None),
                line(&f.conector, "5", "5", "5", None),
            ],
        );
        assert!(result.is_err());
        assert_eq!(f.engine.ledger_len(), ledger_before);
        assert_eq!(f.engine.balance(f.technician_id, f.cable.id), balance_before);
        assert_eq!(
            f.engine.control(control.id).unwrap().estado_general,
            ControlState::TrabajoCompletado
        );
    }

    /// One short line rejects the whole assignment
    #[test]
    fn test_insufficient_line_rejects_whole_assignment() {
        let f = fixture();
        let ledger_before = f.engine.ledger_len();

        let result = f.assign(&[(&f.conector, "10"), (&f.cable, "51")]);
        assert!(matches!(result, Err(DomainError::InsufficientStock { .. })));
        assert_eq!(f.engine.ledger_len(), ledger_before);
        assert_eq!(
            f.engine
                .balance(f.technician_id, f.conector.id)
                .cantidad_apartada,
            Decimal::ZERO
        );
        assert!(f.engine.controls_for(f.technician_id, None).is_empty());
    }

    #[test]
    fn test_reserved_stock_is_not_available_twice() {
        let f = fixture();
        f.assign(&[(&f.cable, "30")]).unwrap();
        let result = f.assign(&[(&f.cable, "30")]);
        assert!(matches!(
            result,
            Err(DomainError::InsufficientStock { .. })
        ));
        assert!(f.assign(&[(&f.cable, "20")]).is_ok());
    }

    #[test]
    fn test_central_pool_policy() {
        let f = fixture_with(EngineConfig {
            policy: StockPolicy::CentralPool,
            ..EngineConfig::default()
        });
        assert!(matches!(
            f.assign(&[(&f.cable, "5")]),
            Err(DomainError::InsufficientStock { .. })
        ));

        f.engine.restock_central(f.cable.id, dec("12")).unwrap();
        let control = f.assign(&[(&f.cable, "5")]).unwrap();
        assert_eq!(f.engine.central_available(f.cable.id), dec("7"));

        let balance = f.engine.balance(f.technician_id, f.cable.id);
        assert_eq!(balance.cantidad_actual, dec("5"));
        assert_eq!(balance.cantidad_apartada, dec("5"));
        assert_eq!(balance.cantidad_disponible, Decimal::ZERO);

        let tipos: Vec<_> = f
            .engine
            .ledger_for_control(control.id)
            .into_iter()
            .map(|e| e.tipo)
            .collect();
        assert_eq!(tipos, vec![MovementType::Entrada, MovementType::Apartado]);

        assert!(matches!(
            f.assign(&[(&f.cable, "8")]),
            Err(DomainError::InsufficientStock { .. })
        ));
        assert_eq!(f.engine.central_available(f.cable.id), dec("7"));
        assert!(f.engine.ledger_is_consistent());
    }
}

// ============================================================================
// Quantity limits
// ============================================================================

#[cfg(test)]
mod quantity_limits {
    use super::*;

    fn receive(f: &Fixture, cantidad: Decimal) -> Result<shared::MovementEntry, DomainError> {
        f.engine.receive(ReceiveRequest {
            technician_id: f.technician_id,
            material_id: f.cable.id,
            cantidad,
            motivo: "Carga de camioneta".to_string(),
            responsable_id: f.bodeguero_id,
            order_id: None,
            visible_para_analistas: true,
        })
    }

    #[test]
    fn test_huge_return_quantity_is_a_mismatch() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10")]);
        let ledger_before = f.engine.ledger_len();

        let mut huge = line(&f.cable, "0", "1", "0", None);
        huge.cantidad_utilizada = Decimal::MAX;
        let err = f.report(control.id, vec![huge]).unwrap_err();
        assert!(matches!(err, DomainError::QuantityMismatch { .. }));

        assert_eq!(f.engine.control(control.id).unwrap(), control);
        assert_eq!(f.engine.ledger_len(), ledger_before);
    }

    #[test]
    fn test_huge_receive_is_rejected() {
        let f = fixture();
        let before = f.engine.balance(f.technician_id, f.cable.id);

        let err = receive(&f, Decimal::MAX).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));

        // The entry is in range but 50 + 9999999999 is not
        let err = receive(&f, dec("9999999999")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));

        assert_eq!(f.engine.balance(f.technician_id, f.cable.id), before);
        assert!(f.engine.ledger_is_consistent());
    }

    #[test]
    fn test_more_than_four_decimals_is_rejected() {
        let f = fixture();
        let err = receive(&f, dec("0.00001")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
        assert!(matches!(
            f.assign(&[(&f.cable, "1.00005")]),
            Err(DomainError::InvalidQuantity(_))
        ));

        // Sums to exactly 10, but neither part fits four decimals
        let control = f.finished_job(&[(&f.cable, "10")]);
        let err = f
            .report(
                control.id,
                vec![line(&f.cable, "9.99995", "0", "0.00005", Some("recorte"))],
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::QuantityMismatch { .. }));

        // 0.0001 * 2.50 = 0.00025
        let done = f
            .report(
                control.id,
                vec![line(&f.cable, "9.9999", "0", "0.0001", Some("recorte"))],
            )
            .unwrap();
        assert_eq!(done.valor_descuadre(), dec("0.0003"));
    }

    #[test]
    fn test_priced_loss_keeps_four_decimals() {
        let f = fixture();
        let control = f.finished_job(&[(&f.conector, "1")]);
        // 0.0003 * 0.40 = 0.00012
        let done = f
            .report(
                control.id,
                vec![line(&f.conector, "0.9997", "0", "0.0003", Some("perdido"))],
            )
            .unwrap();
        assert_eq!(done.valor_descuadre(), dec("0.0001"));
        assert!(done.lines[0].valor_perdida.scale() <= 4);
    }
}

// ============================================================================
// Alert outbox
// ============================================================================

#[cfg(test)]
mod alerts {
    use super::*;

    #[test]
    fn test_discrepancy_emits_event() {
        let f = fixture();
        let control = f.finished_job(&[(&f.cable, "10")]);
        let seen = f.engine.alerts_after(0).last().map_or(0, |a| a.secuencia);

        f.report(control.id, vec![line(&f.cable, "7", "2", "1", Some("broke"))])
            .unwrap();

        let new_events = f.engine.alerts_after(seen);
        assert!(new_events.iter().any(|e| matches!(
            e.evento,
            AlertKind::DiscrepancyDetected { control_id, valor_descuadre, .. }
                if control_id == control.id && valor_descuadre == dec("2.50")
        )));
    }

    #[test]
    fn test_low_balance_emits_event() {
        let f = fixture_with(EngineConfig {
            low_stock_threshold: dec("45"),
            ..EngineConfig::default()
        });
        f.assign(&[(&f.cable, "10")]).unwrap();

        let events = f.engine.alerts_after(0);
        assert!(events.iter().any(|e| matches!(
            e.evento,
            AlertKind::LowBalance { material_id, cantidad_disponible, .. }
                if material_id == f.cable.id && cantidad_disponible == dec("40")
        )));
        assert!(events.windows(2).all(|w| w[0].secuencia < w[1].secuencia));
    }

    #[test]
    fn test_outbox_is_restartable() {
        let f = fixture_with(EngineConfig {
            low_stock_threshold: dec("1000"),
            ..EngineConfig::default()
        });
        let all = f.engine.alerts_after(0);
        assert!(!all.is_empty());
        let last = all.last().unwrap().secuencia;
        assert!(f.engine.alerts_after(last).is_empty());
        assert_eq!(f.engine.alerts_after(0), all);
    }
}
