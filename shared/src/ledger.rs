//! Append-only movement ledger
//!
//! The ledger is the source of truth for every quantity change. It exposes
//! append and read, never update or delete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::models::{MovementEntry, MovementType};
use crate::validation::{validate_positive_quantity, validate_reason};

/// Validate an entry before it may be appended
pub fn validate_entry(entry: &MovementEntry) -> DomainResult<()> {
    validate_positive_quantity(entry.cantidad).map_err(|msg| {
        DomainError::InvalidQuantity(format!("{} (got {})", msg, entry.cantidad))
    })?;

    match (entry.tipo, entry.direccion) {
        (MovementType::Ajuste, None) => {
            return Err(DomainError::InvalidQuantity(
                "ajuste entries require a direction".to_string(),
            ))
        }
        (tipo, Some(_)) if tipo != MovementType::Ajuste => {
            return Err(DomainError::InvalidQuantity(format!(
                "{} entries cannot carry a direction",
                tipo
            )))
        }
        _ => {}
    }

    validate_reason(&entry.motivo).map_err(|msg| DomainError::InvalidQuantity(msg.to_string()))
}

/// Optional filters for ledger queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub material_id: Option<Uuid>,
    pub tipo: Option<MovementType>,
    pub control_id: Option<Uuid>,
    pub desde: Option<DateTime<Utc>>,
    pub hasta: Option<DateTime<Utc>>,
    /// Restrict to entries tagged `visible_para_analistas`
    #[serde(default)]
    pub solo_visibles: bool,
}

impl LedgerFilter {
    pub fn matches(&self, entry: &MovementEntry) -> bool {
        self.material_id.map_or(true, |id| entry.material_id == id)
            && self.tipo.map_or(true, |t| entry.tipo == t)
            && self.control_id.map_or(true, |id| entry.control_id == Some(id))
            && self.desde.map_or(true, |d| entry.fecha >= d)
            && self.hasta.map_or(true, |h| entry.fecha <= h)
            && (!self.solo_visibles || entry.visible_para_analistas)
    }
}

/// In-memory ledger; entries are ordered by `secuencia`, and `fecha` never
/// decreases along that order
#[derive(Debug, Clone, Default)]
pub struct MovementLedger {
    entries: Vec<MovementEntry>,
}

impl MovementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry, assigning its sequence number
    ///
    /// An entry stamped earlier than the ledger tail is re-stamped to the
    /// tail's time so timestamp order and sequence order agree.
    pub fn append(&mut self, mut entry: MovementEntry) -> DomainResult<&MovementEntry> {
        validate_entry(&entry)?;

        if let Some(last) = self.entries.last() {
            if entry.fecha < last.fecha {
                entry.fecha = last.fecha;
            }
        }
        entry.secuencia = self.last_sequence() + 1;
        self.entries.push(entry);

        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn last_sequence(&self) -> i64 {
        self.entries.last().map_or(0, |e| e.secuencia)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MovementEntry] {
        &self.entries
    }

    /// Lazy, restartable view of one technician's entries in ledger order
    pub fn query_by_technician<'a>(
        &'a self,
        technician_id: Uuid,
        filter: &'a LedgerFilter,
    ) -> impl Iterator<Item = &'a MovementEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.technician_id == technician_id && filter.matches(e))
    }

    /// Lazy, restartable view of one material's entries across technicians
    pub fn query_by_material(
        &self,
        material_id: Uuid,
    ) -> impl Iterator<Item = &MovementEntry> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.material_id == material_id)
    }

    /// Entries written on behalf of one control
    pub fn query_by_control(&self, control_id: Uuid) -> impl Iterator<Item = &MovementEntry> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.control_id == Some(control_id))
    }
}
