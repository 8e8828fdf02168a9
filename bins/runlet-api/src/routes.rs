use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::{handlers, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/execute", post(handlers::execute))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/version", get(handlers::version))
}
