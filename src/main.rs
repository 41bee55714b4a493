// Weather ETL service v0.1
use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod pipelines;
mod routes;
mod services;

use config::AppConfig;
use services::scheduler::{self, SchedulerState, SharedSchedulerState};
use services::weatherapi::WeatherApiClient;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Weather ETL service — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Weather ETL",
        version = "0.1.0",
        description = "Hourly weather ingestion and nightly per-city aggregation. \
            Fetches current conditions from weatherapi.com for a fixed city roster, \
            persists normalized readings, and summarizes each city's previous local \
            day into temperature/wind/precipitation/humidity statistics with \
            astronomical events.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Scheduler", description = "Pipeline scheduler status"),
    ),
    paths(
        routes::health::health_check,
        routes::scheduler::get_scheduler_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            services::scheduler::SchedulerState,
            services::scheduler::CityRunStatus,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_etl=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!(
        "Scheduling {} cities: {}",
        config.cities.len(),
        config
            .cities
            .iter()
            .map(|j| j.city.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    );

    // Create weatherapi.com client
    let client = WeatherApiClient::new(&config.weather_api_base_url, &config.weather_api_key);

    // Create shared scheduler state and spawn the pipeline loops
    let scheduler_state: SharedSchedulerState = Arc::new(RwLock::new(SchedulerState::new()));
    tokio::spawn(scheduler::run_hourly_ingestion(
        pool.clone(),
        client.clone(),
        config.cities.clone(),
        scheduler_state.clone(),
    ));
    for (index, job) in config.cities.iter().enumerate() {
        tokio::spawn(scheduler::run_nightly_aggregation(
            pool.clone(),
            client.clone(),
            job.clone(),
            index,
            scheduler_state.clone(),
        ));
    }

    // CORS — read-only status API, restrict methods to GET
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .allow_headers(Any);

    // Build router
    // Health check uses PgPool to verify DB connectivity; scheduler status
    // uses SharedSchedulerState.
    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(pool);

    let scheduler_routes = Router::new()
        .route(
            "/api/v1/scheduler/status",
            get(routes::scheduler::get_scheduler_status),
        )
        .with_state(scheduler_state);

    let app = Router::new()
        .merge(health_routes)
        .merge(scheduler_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Status API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
