use std::sync::{Arc, PoisonError, RwLock};

use crate::Property;
use crate::db::{
    CatalogStorageError, PgPool, PropertyUpsertResponse, UpsertStatus, fetch_properties,
    upsert_property,
};

/// Process-local catalog used when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    rows: Arc<RwLock<Vec<Property>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// First `limit` rows in insertion order.
    pub fn fetch_all(&self, limit: usize) -> Vec<Property> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.iter().take(limit).cloned().collect()
    }

    /// Replaces the row with the same `external_id` in place, or appends.
    pub fn upsert(&self, property: &Property) -> PropertyUpsertResponse {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = rows
            .iter_mut()
            .find(|row| row.external_id == property.external_id)
        {
            let id = existing.id.unwrap_or_default();
            *existing = Property {
                id: Some(id),
                ..property.clone()
            };
            return PropertyUpsertResponse {
                id,
                status: UpsertStatus::Updated,
            };
        }

        let id = rows.len() as i64 + 1;
        rows.push(Property {
            id: Some(id),
            ..property.clone()
        });
        PropertyUpsertResponse {
            id,
            status: UpsertStatus::Created,
        }
    }
}

/// Where catalog snapshots come from.
#[derive(Clone)]
pub enum Catalog {
    Postgres(PgPool),
    Memory(MemoryCatalog),
}

impl Catalog {
    pub fn in_memory() -> Self {
        Catalog::Memory(MemoryCatalog::new())
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Catalog::Postgres(_) => "postgres",
            Catalog::Memory(_) => "memory",
        }
    }

    pub fn pool(&self) -> Option<&PgPool> {
        match self {
            Catalog::Postgres(pool) => Some(pool),
            Catalog::Memory(_) => None,
        }
    }

    pub async fn fetch_all(&self, limit: usize) -> Result<Vec<Property>, CatalogStorageError> {
        match self {
            Catalog::Postgres(pool) => {
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                fetch_properties(pool, limit).await
            }
            Catalog::Memory(memory) => Ok(memory.fetch_all(limit)),
        }
    }

    pub async fn upsert(
        &self,
        property: &Property,
    ) -> Result<PropertyUpsertResponse, CatalogStorageError> {
        match self {
            Catalog::Postgres(pool) => upsert_property(pool, property).await,
            Catalog::Memory(memory) => Ok(memory.upsert(property)),
        }
    }
}
