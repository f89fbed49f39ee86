use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::report::ReportGenerator;
use services::session::SessionStore;

// Application state
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub reports: ReportGenerator,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = SessionStore::new(config.max_sessions, config.session_ttl);
        let reports = ReportGenerator::new(config.openai_key.as_deref(), &config.report_model);
        Self {
            config,
            sessions,
            reports,
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_file_size;
    Router::new()
        .merge(routes::routes())
        .merge(routes::sessions::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
