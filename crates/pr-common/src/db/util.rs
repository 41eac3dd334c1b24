#![allow(async_fn_in_trait)]

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use deadpool_postgres::GenericClient;
use metrics::histogram;
use serde_json::Value;
use tokio_postgres::{Row, types::Json, types::ToSql};
use tracing::warn;

/// Statements the recommender runs. The name labels the
/// `catalog_db_query_seconds` histogram and slow-query warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogQuery {
    FetchProperties,
    UpsertProperty,
    InsertRecommendation,
}

impl CatalogQuery {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogQuery::FetchProperties => "properties.fetch",
            CatalogQuery::UpsertProperty => "properties.upsert",
            CatalogQuery::InsertRecommendation => "recommendations.insert",
        }
    }
}

/// Wrap the free-form `raw` listing payload for a JSONB column.
pub fn normalize_json(value: &Option<Value>) -> Option<Json<&Value>> {
    value.as_ref().map(Json)
}

/// `PR_DB_LOG_MIN_DURATION_MS`; unset, zero or unparsable disables warnings.
fn parse_slow_threshold(raw: Option<&str>) -> Option<Duration> {
    raw?.trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn slow_threshold() -> Option<Duration> {
    static THRESHOLD: OnceLock<Option<Duration>> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        parse_slow_threshold(std::env::var("PR_DB_LOG_MIN_DURATION_MS").ok().as_deref())
    })
}

fn is_slow(elapsed: Duration, threshold: Option<Duration>) -> bool {
    threshold.is_some_and(|threshold| elapsed >= threshold)
}

fn record_timing(query: CatalogQuery, started: Instant) {
    let elapsed = started.elapsed();
    histogram!("catalog_db_query_seconds", "query" => query.as_str())
        .record(elapsed.as_secs_f64());

    if is_slow(elapsed, slow_threshold()) {
        warn!(
            query = query.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "slow catalog query"
        );
    }
}

/// Cached-statement calls that are timed per `CatalogQuery`.
pub trait TimedClientExt: GenericClient {
    async fn timed_query(
        &self,
        query: CatalogQuery,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, tokio_postgres::Error> {
        let started = Instant::now();
        let prepared = self.prepare_cached(statement).await?;
        let rows = self.query(&prepared, params).await;
        record_timing(query, started);
        rows
    }

    async fn timed_query_one(
        &self,
        query: CatalogQuery,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Row, tokio_postgres::Error> {
        let started = Instant::now();
        let prepared = self.prepare_cached(statement).await?;
        let row = self.query_one(&prepared, params).await;
        record_timing(query, started);
        row
    }

    async fn timed_execute(
        &self,
        query: CatalogQuery,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, tokio_postgres::Error> {
        let started = Instant::now();
        let prepared = self.prepare_cached(statement).await?;
        let affected = self.execute(&prepared, params).await;
        record_timing(query, started);
        affected
    }
}

impl<T: GenericClient + ?Sized> TimedClientExt for T {}
