//! Meetup Backend
//!
//! REST backend for meetup topics and meetings with SQLite persistence and
//! per-user topic voting.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod reconcile;
mod voting;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    init_logging(&config);

    tracing::info!("Starting meetup backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (MEETUP_API_PSK). API key check is disabled!");
    }

    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let topics = repo.count_topics().await?;
    let meetings = repo.count_meetings().await?;
    tracing::info!("Loaded {} topics and {} meetings", topics, meetings);

    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Install the global tracing subscriber.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Topics
        .route("/topics", get(api::list_topics).post(api::create_topic))
        .route("/topics/all", get(api::list_all_topics))
        .route("/topics/top-rated", get(api::top_rated_topic))
        .route("/topics/vote/{id}", put(api::vote_topic))
        .route(
            "/topics/{id}",
            get(api::get_topic)
                .put(api::update_topic)
                .delete(api::delete_topic),
        )
        // Meetings
        .route("/meetings", get(api::list_meetings).post(api::create_meeting))
        .route("/meetings/all", get(api::list_all_meetings))
        .route("/meetings/sorted", get(api::list_sorted_meetings))
        .route("/meetings/archive", get(api::meetings_archive))
        .route("/meetings/schedule", get(api::meetings_schedule))
        .route("/meetings/incoming", get(api::incoming_meeting))
        .route("/meetings/last-one", get(api::last_meeting))
        .route("/meetings/last", get(api::last_meetings))
        .route(
            "/meetings/{id}",
            get(api::get_meeting)
                .put(api::update_meeting)
                .delete(api::delete_meeting),
        )
        // Identity
        .route("/user", get(api::get_current_user))
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
