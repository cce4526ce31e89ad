//! Material catalog references

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// A catalog material as seen by the reconciliation core (read-only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Material {
    pub id: Uuid,
    /// Warehouse code (e.g., "CAB-UTP-05")
    pub codigo: String,
    pub nombre: String,
    /// Unit of measure (m, und, kg)
    pub unidad: String,
    /// Unit cost, used only to price discrepancies
    pub costo_unitario: Decimal,
}

/// Read-only `material_id -> Material` lookup supplied by the catalog collaborator
#[derive(Debug, Clone, Default)]
pub struct MaterialCatalog {
    materials: HashMap<Uuid, Material>,
}

impl MaterialCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, material: Material) {
        self.materials.insert(material.id, material);
    }

    pub fn get(&self, material_id: &Uuid) -> Option<&Material> {
        self.materials.get(material_id)
    }

    /// Look up a material, failing with `NotFound` for unknown ids
    pub fn require(&self, material_id: Uuid) -> DomainResult<&Material> {
        self.materials.get(&material_id).ok_or(DomainError::NotFound {
            resource: "Material",
            id: material_id,
        })
    }

    pub fn costo_unitario(&self, material_id: &Uuid) -> Option<Decimal> {
        self.materials.get(material_id).map(|m| m.costo_unitario)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl FromIterator<Material> for MaterialCatalog {
    fn from_iter<I: IntoIterator<Item = Material>>(iter: I) -> Self {
        Self {
            materials: iter.into_iter().map(|m| (m.id, m)).collect(),
        }
    }
}
