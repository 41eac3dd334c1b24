use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::Method,
    http::Request,
    http::header::{CONTENT_TYPE, HeaderName, HeaderValue},
    middleware,
    middleware::Next,
    response::Response,
    routing::{get, post},
};
use chrono::TimeDelta;
use clap::Parser;
use dotenvy::dotenv;
use pr_common::catalog::Catalog;
use pr_common::db::{create_pool_from_url_checked, run_migrations};
use pr_common::logging::{init_tracing_subscriber, install_tracing_panic_hook, process_span};
use pr_common::queue::{JobRetention, SharedJobQueue};
use pr_common::{RankingStrategy, RecommendationService, RecommenderConfig, run_id};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, info, warn};

pub mod error;
pub mod handlers;
pub mod worker;

use error::ApiError;
use handlers::{health, jobs, properties};

const SHUTDOWN_DRAIN_GRACE: Duration = Duration::from_millis(200);
const MAX_CATALOG_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Parser)]
#[command(name = "pr-api", about = "Property recommendation API and workers")]
struct Cli {
    /// PostgreSQL connection string; an in-memory catalog is used when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Server port
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "PR_CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,

    /// Number of recommendation workers
    #[arg(long, env = "PR_WORKERS", default_value_t = 2)]
    workers: usize,

    /// Sleep between polls when the queue is empty
    #[arg(long, env = "PR_IDLE_POLL_INTERVAL_MS", default_value_t = 250)]
    idle_poll_interval_ms: u64,

    /// Strategy used when a job does not name one: rule_based | knn
    #[arg(long, env = "PR_DEFAULT_STRATEGY", default_value = "rule_based")]
    default_strategy: String,

    /// Restrict KNN candidates to the origin's commune unless the job overrides it
    #[arg(long, env = "PR_KNN_COMMUNE_FILTER", default_value = "false")]
    knn_commune_filter: bool,

    /// Properties read into one catalog snapshot
    #[arg(long, env = "PR_CATALOG_LIMIT", default_value_t = 100)]
    catalog_limit: usize,

    /// Seconds a finished job stays pollable
    #[arg(long, env = "PR_JOB_RETENTION_SECS", default_value_t = 3600)]
    job_retention_secs: i64,

    /// Finished jobs kept in memory; the oldest are dropped first
    #[arg(long, env = "PR_JOB_RETENTION_MAX", default_value_t = 10_000)]
    job_retention_max: usize,

    /// Prometheus exporter port
    #[arg(long, env = "PR_METRICS_PORT", default_value_t = 9100)]
    metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub workers: usize,
    pub idle_poll_interval: Duration,
    pub recommender: RecommenderConfig,
    pub catalog_limit: usize,
    pub job_retention: JobRetention,
    pub metrics_port: u16,
}

impl AppConfig {
    fn from_cli(cli: Cli) -> Result<Self, ApiError> {
        let cors_origins = cli
            .cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>();

        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ApiError::BadRequest(
                "PR_CORS_ORIGINS must list explicit origins".into(),
            ));
        }

        if cli.workers == 0 {
            return Err(ApiError::BadRequest("PR_WORKERS must be at least 1".into()));
        }

        if cli.idle_poll_interval_ms == 0 {
            return Err(ApiError::BadRequest(
                "PR_IDLE_POLL_INTERVAL_MS must be positive".into(),
            ));
        }

        if !(1..=MAX_CATALOG_LIMIT).contains(&cli.catalog_limit) {
            return Err(ApiError::BadRequest(format!(
                "PR_CATALOG_LIMIT must be between 1 and {MAX_CATALOG_LIMIT}"
            )));
        }

        if cli.job_retention_max == 0 {
            return Err(ApiError::BadRequest(
                "PR_JOB_RETENTION_MAX must be at least 1".into(),
            ));
        }

        let job_retention_ttl = Some(cli.job_retention_secs)
            .filter(|secs| *secs > 0)
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                ApiError::BadRequest("PR_JOB_RETENTION_SECS must be a positive number".into())
            })?;

        let default_strategy = cli
            .default_strategy
            .parse::<RankingStrategy>()
            .map_err(|err| ApiError::BadRequest(format!("PR_DEFAULT_STRATEGY: {err}")))?;

        let database_url = cli
            .database_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Ok(Self {
            database_url,
            port: cli.port,
            cors_origins,
            workers: cli.workers,
            idle_poll_interval: Duration::from_millis(cli.idle_poll_interval_ms),
            recommender: RecommenderConfig {
                default_strategy,
                knn_commune_filter: cli.knn_commune_filter,
                ..RecommenderConfig::default()
            },
            catalog_limit: cli.catalog_limit,
            job_retention: JobRetention {
                max_finished: cli.job_retention_max,
                ttl: job_retention_ttl,
            },
            metrics_port: cli.metrics_port,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            port: 8000,
            cors_origins: vec!["http://localhost:3000".into()],
            workers: 2,
            idle_poll_interval: Duration::from_millis(10),
            recommender: RecommenderConfig::default(),
            catalog_limit: 100,
            job_retention: JobRetention::default(),
            metrics_port: 9100,
        }
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub catalog: Catalog,
    pub queue: SharedJobQueue,
    pub service: RecommendationService,
    pub readiness: Arc<AtomicBool>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig, catalog: Catalog) -> Self {
        let service = RecommendationService::with_config(config.recommender);
        let queue = SharedJobQueue::with_retention(config.job_retention);
        Self {
            config,
            catalog,
            queue,
            service,
            readiness: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.load(Ordering::SeqCst)
    }

    /// Stop reporting ready; workers exit after their current job.
    pub fn shutdown(&self) {
        self.readiness.store(false, Ordering::SeqCst);
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("x-request-id")])
}

async fn attach_request_id_context(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    error::with_request_id(request_id, next.run(req)).await
}

pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_header = request_id_header.clone();

    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(&trace_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
            run_id = run_id::get(),
            status = tracing::field::Empty,
        )
    });

    let recommender_routes = Router::new()
        .route("/heartbeat", get(health::heartbeat))
        .route("/job/:user_id/:property_id", post(jobs::create_job))
        .route("/job/:task_id", get(jobs::get_job))
        .route("/properties", get(properties::list_properties))
        .route("/properties/notify", post(properties::notify_property));

    Router::new()
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .nest("/recommender", recommender_routes)
        .layer(middleware::from_fn(attach_request_id_context))
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid::default(),
        ))
        .layer(cors)
        .with_state(state)
}

/// State backed by the in-memory catalog, with readiness on.
pub fn test_state() -> SharedState {
    Arc::new(AppState::new(AppConfig::for_tests(), Catalog::in_memory()))
}

async fn open_catalog(config: &AppConfig) -> Result<Catalog, ApiError> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; using in-memory catalog");
        return Ok(Catalog::in_memory());
    };

    let pool = create_pool_from_url_checked(url).await?;
    run_migrations(&pool).await?;
    Ok(Catalog::Postgres(pool))
}

pub async fn run() -> Result<(), ApiError> {
    dotenv().ok();
    init_tracing_subscriber(env!("CARGO_PKG_NAME"));
    install_tracing_panic_hook(env!("CARGO_PKG_NAME"));

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli)?;

    serve(config)
        .instrument(process_span(env!("CARGO_PKG_NAME")))
        .await
}

async fn serve(config: AppConfig) -> Result<(), ApiError> {
    pr_metrics::init_metrics("PR_METRICS_PORT", config.metrics_port);

    let catalog = open_catalog(&config).await?;
    let state = Arc::new(AppState::new(config.clone(), catalog));

    let workers = worker::spawn_workers(state.clone());

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let app = create_router(state.clone());

    info!(
        %addr,
        catalog = state.catalog.backend(),
        workers = config.workers,
        default_strategy = %config.recommender.default_strategy,
        job_retention_max = config.job_retention.max_finished,
        job_retention_secs = config.job_retention.ttl.num_seconds(),
        "pr-api listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    state.shutdown();
    for handle in workers {
        if let Err(err) = handle.await {
            warn!(error = %err, "worker did not stop cleanly");
        }
    }

    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    state.shutdown();

    // Load balancers get a window to see /readyz fail before the listener closes.
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE).await;
}
