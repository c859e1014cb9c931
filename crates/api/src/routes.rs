use crate::{handlers::*, AppState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Environment lifecycle
        .route("/provision", post(provision))
        .route("/destroy", post(destroy))
        .route("/list", get(list))
        .route("/gc", post(gc))
        // Health and metrics
        .route("/healthz", get(health_check))
        .route("/metrics", get(metrics))
}

pub fn build_router(state: AppState) -> Router {
    create_router().with_state(state)
}
