use axum::{
    Json,
    extract::{Path, Query, State},
};
use pr_common::RankingStrategy;
use pr_common::queue::{JobHandle, JobStatusView, RecommendationJob};
use serde::Deserialize;
use tracing::info;

use crate::SharedState;
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct JobParams {
    /// `rule_based` or `knn`; the configured default when absent.
    pub strategy: Option<String>,
    /// KNN only: restrict candidates to the origin's commune.
    pub commune_filter: Option<bool>,
}

fn resolve_strategy(state: &SharedState, params: &JobParams) -> Result<RankingStrategy, ApiError> {
    let requested = params
        .strategy
        .as_deref()
        .map(str::parse::<RankingStrategy>)
        .transpose()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    Ok(state
        .service
        .config()
        .resolve_strategy(requested, params.commune_filter))
}

/// Snapshot the catalog and queue a recommendation job for it.
pub async fn create_job(
    State(state): State<SharedState>,
    Path((user_id, property_id)): Path<(String, i64)>,
    Query(params): Query<JobParams>,
) -> Result<Json<JobHandle>, ApiError> {
    let strategy = resolve_strategy(&state, &params)?;

    let snapshot = state
        .catalog
        .fetch_all(state.config.catalog_limit)
        .await
        .map_err(|err| ApiError::ServiceUnavailable(format!("catalog unavailable: {err}")))?;

    let snapshot_size = snapshot.len();
    let handle = state.queue.enqueue(RecommendationJob::new(
        &user_id,
        property_id,
        strategy,
        snapshot,
    ));

    info!(
        task_id = %handle.task_id,
        user_id = %user_id,
        property_id,
        strategy = %strategy,
        snapshot_size,
        "recommendation job queued"
    );

    Ok(Json(handle))
}

pub async fn get_job(
    State(state): State<SharedState>,
    Path(task_id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    state
        .queue
        .status(&task_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job {task_id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_strategy() {
        let params = JobParams {
            strategy: Some("nearest".into()),
            commune_filter: None,
        };

        let err = resolve_strategy(&crate::test_state(), &params).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn defaults_to_configured_strategy() {
        let strategy = resolve_strategy(&crate::test_state(), &JobParams::default()).unwrap();
        assert_eq!(strategy, RankingStrategy::RuleBased);
    }

    #[test]
    fn commune_filter_applies_to_knn() {
        let params = JobParams {
            strategy: Some("knn".into()),
            commune_filter: Some(true),
        };

        let strategy = resolve_strategy(&crate::test_state(), &params).unwrap();
        assert_eq!(
            strategy,
            RankingStrategy::FeatureSpace {
                commune_filter: true
            }
        );
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let err = get_job(
            State(crate::test_state()),
            Path("01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
