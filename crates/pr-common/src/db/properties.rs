use deadpool_postgres::PoolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_postgres::{Error as PgError, Row};
use tracing::{debug, instrument};

use crate::Property;
use crate::db::PgPool;
use crate::db::util::{CatalogQuery, TimedClientExt, normalize_json};

#[derive(Debug, thiserror::Error)]
pub enum CatalogStorageError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStatus {
    Created,
    Updated,
}

impl UpsertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertStatus::Created => "created",
            UpsertStatus::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUpsertResponse {
    pub id: i64,
    pub status: UpsertStatus,
}

fn property_from_row(row: &Row) -> Property {
    Property {
        id: Some(row.get("id")),
        external_id: row.get("external_id"),
        commune: row.get("comuna"),
        latitude: row.get("lat"),
        longitude: row.get("lon"),
        bedrooms: row.get("bedrooms"),
        price: row.get("price"),
        metadata: row.get::<_, Option<Value>>("raw"),
    }
}

/// Read up to `limit` catalog rows in insertion order.
#[instrument(skip(pool))]
pub async fn fetch_properties(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<Property>, CatalogStorageError> {
    let client = pool.get().await?;
    let rows = client
        .timed_query(
            CatalogQuery::FetchProperties,
            "SELECT id, external_id, comuna, lat, lon, bedrooms, price, raw
             FROM rec.properties
             ORDER BY id
             LIMIT $1",
            &[&limit],
        )
        .await?;

    let properties: Vec<Property> = rows.iter().map(property_from_row).collect();
    debug!(count = properties.len(), "fetched catalog");
    Ok(properties)
}

/// Insert or update a property keyed by `external_id`.
#[instrument(skip(pool, property), fields(external_id = property.external_id))]
pub async fn upsert_property(
    pool: &PgPool,
    property: &Property,
) -> Result<PropertyUpsertResponse, CatalogStorageError> {
    let client = pool.get().await?;
    // xmax is zero only for freshly inserted tuples.
    let row = client
        .timed_query_one(
            CatalogQuery::UpsertProperty,
            "INSERT INTO rec.properties (external_id, comuna, lat, lon, bedrooms, price, raw)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (external_id) DO UPDATE SET
                comuna = EXCLUDED.comuna,
                lat = EXCLUDED.lat,
                lon = EXCLUDED.lon,
                bedrooms = EXCLUDED.bedrooms,
                price = EXCLUDED.price,
                raw = EXCLUDED.raw,
                updated_at = NOW()
             RETURNING id, (xmax = 0) AS inserted",
            &[
                &property.external_id,
                &property.commune,
                &property.latitude,
                &property.longitude,
                &property.bedrooms,
                &property.price,
                &normalize_json(&property.metadata),
            ],
        )
        .await?;

    let inserted: bool = row.get("inserted");
    Ok(PropertyUpsertResponse {
        id: row.get("id"),
        status: if inserted {
            UpsertStatus::Created
        } else {
            UpsertStatus::Updated
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_response_wire_format() {
        let body = serde_json::to_value(PropertyUpsertResponse {
            id: 7,
            status: UpsertStatus::Updated,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"id": 7, "status": "updated"}));
        assert_eq!(UpsertStatus::Created.as_str(), "created");
    }
}
