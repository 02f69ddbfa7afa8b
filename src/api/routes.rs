//! HTTP route table (spec §6).

use super::{handlers, ApiState};
use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_app(state: ApiState, enable_cors: bool) -> Router {
    let router = Router::new()
        .route("/leaderboard", get(handlers::get_leaderboard))
        .route("/agent/:address", get(handlers::get_agent))
        .route("/user/agents", get(handlers::get_agents_by_creator))
        .route("/search", get(handlers::search_by_name))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
