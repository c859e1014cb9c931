pub mod handlers;
pub mod routes;
pub mod state;

pub use handlers::*;
pub use routes::*;
pub use state::*;

use axum::Router;
use qa_control::ControlPlane;
use qa_metrics::MetricsService;
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Router with tracing and permissive CORS applied.
pub fn app(state: AppState) -> Router {
    Router::new().merge(build_router(state)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

pub async fn start_server(
    bind: String,
    port: u16,
    control_plane: Arc<ControlPlane>,
    metrics: Arc<MetricsService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    metrics.set_active_environments(control_plane.store().len().await);
    let app = app(AppState::new(control_plane, metrics));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind, port)).await?;
    info!("QA provisioner API listening on {}:{}", bind, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
