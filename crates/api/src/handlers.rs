use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
};
use qa_models::{
    DestroyRequest, DestroyResponse, ErrorShape, GcResponse, HealthResponse, ListResponse,
    ProvisionRequest, ProvisionResponse, ProvisionerError,
};
use std::time::Instant;
use tracing::{error, info, instrument};

type ApiError = (StatusCode, Json<ErrorShape>);

fn error_response(e: &ProvisionerError) -> ApiError {
    (
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(e.to_error_shape()),
    )
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        error_response(&ProvisionerError::InvalidRequest {
            reason: rejection.body_text(),
        })
    })
}

#[instrument(skip(state, payload))]
pub async fn provision(
    State(state): State<AppState>,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Result<Json<ProvisionResponse>, ApiError> {
    let payload = parse_body(payload)?;
    info!(branch = %payload.branch, service = %payload.service, "Provisioning environment");

    let started = Instant::now();
    match state.control.provision(payload).await {
        Ok(response) => {
            state
                .metrics
                .record_provisioned(&response.env_id, started.elapsed().as_secs_f64());
            state
                .metrics
                .set_active_environments(state.control.store().len().await);
            Ok(Json(response))
        }
        Err(e) => {
            error!("Failed to provision environment: {}", e);
            state.metrics.record_provision_failure(e.error_type());
            Err(error_response(&e))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn destroy(
    State(state): State<AppState>,
    payload: Result<Json<DestroyRequest>, JsonRejection>,
) -> Result<Json<DestroyResponse>, ApiError> {
    let payload = parse_body(payload)?;
    info!(env_id = %payload.env_id, "Destroying environment");

    match state.control.destroy(&payload.env_id).await {
        Ok(response) => {
            state.metrics.record_destroyed(&payload.env_id);
            state
                .metrics
                .set_active_environments(state.control.store().len().await);
            Ok(Json(response))
        }
        Err(e) => {
            error!("Failed to destroy environment {}: {}", payload.env_id, e);
            Err(error_response(&e))
        }
    }
}

#[instrument(skip(state))]
pub async fn list(State(state): State<AppState>) -> Json<ListResponse> {
    Json(state.control.list().await)
}

#[instrument(skip(state))]
pub async fn gc(State(state): State<AppState>) -> Json<GcResponse> {
    let response = state.control.garbage_collect().await;
    state
        .metrics
        .record_garbage_collected(response.garbage_collected.len());
    state
        .metrics
        .set_active_environments(state.control.store().len().await);
    Json(response)
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        environments: state.control.store().len().await,
    })
}

#[instrument(skip(state))]
pub async fn metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    match state.metrics.export() {
        Ok(metrics) => Ok(metrics),
        Err(e) => {
            error!("Failed to get metrics: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
