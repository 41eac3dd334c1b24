use chrono::{DateTime, Utc};
use deadpool_postgres::PoolError;
use tokio_postgres::Error as PgError;
use tracing::{debug, instrument};

use crate::RecommendationResult;
use crate::db::PgPool;
use crate::db::util::{CatalogQuery, TimedClientExt};

#[derive(Debug, thiserror::Error)]
pub enum RecommendationStorageError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
}

/// Ranked output of one finished job.
#[derive(Debug, Clone)]
pub struct RecommendationRecord {
    pub job_id: String,
    pub user_id: String,
    pub origin_external_id: i64,
    pub strategy: String,
    pub results: Vec<RecommendationResult>,
    /// When the job finished; stamped on every stored row.
    pub created_at: DateTime<Utc>,
}

/// Store one row per ranked match. Rows already written for the same
/// `(job_id, rank)` are ignored. Returns the number of rows inserted.
#[instrument(skip(pool, record), fields(job_id = %record.job_id, matches = record.results.len()))]
pub async fn insert_recommendations(
    pool: &PgPool,
    record: &RecommendationRecord,
) -> Result<u64, RecommendationStorageError> {
    if record.results.is_empty() {
        return Ok(0);
    }

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let mut inserted = 0;
    for (idx, result) in record.results.iter().enumerate() {
        let rank = (idx + 1) as i16;
        inserted += tx
            .timed_execute(
                CatalogQuery::InsertRecommendation,
                "INSERT INTO rec.recommendations (
                    job_id,
                    user_id,
                    origin_external_id,
                    rank,
                    recommended_external_id,
                    distance_km,
                    similarity_distance,
                    strategy,
                    created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (job_id, rank) DO NOTHING",
                &[
                    &record.job_id,
                    &record.user_id,
                    &record.origin_external_id,
                    &rank,
                    &result.property.external_id,
                    &result.distance_km,
                    &result.similarity_distance,
                    &record.strategy,
                    &record.created_at,
                ],
            )
            .await?;
    }
    tx.commit().await?;

    debug!(inserted, "stored recommendations");
    Ok(inserted)
}
