// routes.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use http::{header::CONTENT_TYPE, Method};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::state::AppState;

pub fn create_routes(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/polls", post(handlers::create_poll))
        .route("/polls/{poll_id}", get(handlers::get_poll))
        .route("/polls/{poll_id}/vote", post(handlers::cast_vote))
        .route("/polls/{poll_id}/audit", get(handlers::audit_poll))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
