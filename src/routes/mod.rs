//! Route modules for the study documents server

pub mod annotations;
pub mod documents;
pub mod health;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Prefix of every study-docs route
pub const API_PREFIX: &str = "/api/study-docs";

/// The application router, without transport layers
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(documents::router())
        .merge(annotations::router());

    Router::new()
        .route("/health", get(health::health_check))
        .nest(API_PREFIX, api)
        .with_state(state)
}
