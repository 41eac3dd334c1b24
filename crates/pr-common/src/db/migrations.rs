use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::PgPool;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "property catalog",
        sql: r#"
CREATE TABLE IF NOT EXISTS rec.properties (
    id BIGSERIAL PRIMARY KEY,
    external_id BIGINT NOT NULL UNIQUE,
    comuna TEXT,
    lat DOUBLE PRECISION,
    lon DOUBLE PRECISION,
    bedrooms INTEGER,
    price DOUBLE PRECISION CHECK (price IS NULL OR price >= 0),
    raw JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_properties_comuna ON rec.properties(comuna);
"#,
    },
    Migration {
        id: 2,
        description: "recommendations produced by jobs",
        sql: r#"
CREATE TABLE IF NOT EXISTS rec.recommendations (
    id BIGSERIAL PRIMARY KEY,
    job_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    origin_external_id BIGINT NOT NULL,
    rank SMALLINT NOT NULL CHECK (rank >= 1),
    recommended_external_id BIGINT NOT NULL,
    distance_km DOUBLE PRECISION NOT NULL,
    similarity_distance DOUBLE PRECISION,
    strategy TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (job_id, rank)
);

CREATE INDEX IF NOT EXISTS idx_recommendations_user
    ON rec.recommendations(user_id, created_at DESC);
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS rec;
             CREATE TABLE IF NOT EXISTS rec.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM rec.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO rec.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_ids_are_strictly_increasing() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].id < w[1].id));
        assert!(MIGRATIONS.iter().all(|m| m.sql.contains("rec.")));
    }
}
