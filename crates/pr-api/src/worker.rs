use std::time::Instant;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use pr_common::db::{RecommendationRecord, insert_recommendations};
use pr_common::queue::{ClaimedJob, JobStatus};
use pr_common::{RecommendationRequest, RecommendationResult};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::SharedState;

async fn persist(
    state: &SharedState,
    job_id: &str,
    request: &RecommendationRequest,
    results: &[RecommendationResult],
) {
    let Some(pool) = state.catalog.pool() else {
        return;
    };

    let created_at = state.queue.completed_at(job_id).unwrap_or_else(Utc::now);
    let record = RecommendationRecord {
        job_id: job_id.to_string(),
        user_id: request.user_id.clone(),
        origin_external_id: request.target_property_id,
        strategy: request.strategy.as_str().to_string(),
        results: results.to_vec(),
        created_at,
    };

    if let Err(err) = insert_recommendations(pool, &record).await {
        warn!(task_id = job_id, error = %err, "failed to store recommendations");
    }
}

/// Claim one pending job, compute it off the async runtime and record the
/// outcome. Returns `None` when the queue had nothing pending.
pub async fn process_next(state: &SharedState, worker_id: &str) -> Option<JobStatus> {
    let ClaimedJob {
        job_id, request, ..
    } = state.queue.claim_next(worker_id)?;
    gauge!("recommendation_queue_depth").set(state.queue.pending_count() as f64);
    debug!(task_id = %job_id, worker_id, "job claimed");

    let service = state.service.clone();
    let started = Instant::now();
    let computed = tokio::task::spawn_blocking(move || {
        let outcome = service.compute(&request);
        (request, outcome)
    })
    .await;
    histogram!("recommendation_compute_seconds").record(started.elapsed().as_secs_f64());

    let status = match computed {
        Ok((request, outcome)) => {
            if let Err(err) = &outcome {
                info!(task_id = %job_id, code = err.code(), error = %err, "recommendation failed");
            }
            let results = outcome.as_ref().ok().filter(|r| !r.is_empty()).cloned();

            let status = state.queue.finish(&job_id, outcome);
            if let Some(results) = results {
                persist(state, &job_id, &request, &results).await;
            }
            status
        }
        Err(err) => {
            error!(task_id = %job_id, error = %err, "recommendation task did not complete");
            state.queue.abort(&job_id)
        }
    };

    if let Some(status) = status {
        counter!("recommendation_jobs_total", "status" => status.as_str()).increment(1);
        info!(
            task_id = %job_id,
            worker_id,
            status = status.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "job finished"
        );
    }

    status
}

/// Start the configured number of workers. They exit once readiness drops.
/// Each worker span is a child of the span current at the call.
pub fn spawn_workers(state: SharedState) -> Vec<JoinHandle<()>> {
    (0..state.config.workers)
        .map(|idx| {
            let state = state.clone();
            let worker_id = format!("{}-{idx}", env!("CARGO_PKG_NAME"));
            let span = info_span!("worker", worker_id = %worker_id);
            tokio::spawn(
                async move {
                    info!("worker started");
                    while state.is_ready() {
                        if process_next(&state, &worker_id).await.is_none() {
                            tokio::time::sleep(state.config.idle_poll_interval).await;
                        }
                    }
                    info!("worker stopped");
                }
                .instrument(span),
            )
        })
        .collect()
}
