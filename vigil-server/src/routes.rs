//! HTTP control surface: status checks and manual triggers.
//!
//! Thin adapters over the core components. Result translation: 200 on
//! success, 400 on invalid input, 500 on upstream failure.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use vigil_core::providers::candidate_name;
use vigil_core::{
    FailoverOrchestrator, HealthEvaluator, PipelineRun, Registrar, VigilError,
};

#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<HealthEvaluator>,
    pub registrar: Arc<dyn Registrar>,
    pub orchestrator: Arc<FailoverOrchestrator>,
    pub candidate_prefix: String,
    pub candidate_tld: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/check-domain-status", post(check_domain_status))
        .route("/register-new-domain", post(register_new_domain))
        .route("/switch", post(switch_domain))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    reachable: bool,
    status_code: Option<u16>,
    switch_required: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    domain: String,
}

/// Status code for an error escaping a handler: bad input is the caller's
/// fault, everything else is an upstream failure.
fn error_status(error: &VigilError) -> StatusCode {
    match error {
        VigilError::InvalidDomain(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(error: &VigilError) -> Json<Value> {
    Json(json!({ "error": error.to_string() }))
}

async fn index() -> Json<Value> {
    Json(json!({
        "service": "vigil",
        "status": "running",
    }))
}

async fn check_domain_status(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, (StatusCode, Json<Value>)> {
    let domain = vigil_core::validate_domain_safe(&request.url)
        .await
        .map_err(|e| (error_status(&e), error_body(&e)))?;

    let verdict = state
        .evaluator
        .evaluate(&domain)
        .await
        .map_err(|e| (error_status(&e), error_body(&e)))?;

    Ok(Json(CheckResponse {
        reachable: verdict.reachable,
        status_code: verdict.http_status,
        switch_required: !verdict.is_healthy(),
    }))
}

async fn register_new_domain(
    State(state): State<AppState>,
) -> Result<Json<RegisterResponse>, (StatusCode, Json<Value>)> {
    let name = candidate_name(&state.candidate_prefix, &state.candidate_tld);

    let record = state
        .registrar
        .register(&name)
        .await
        .map_err(|e| {
            warn!(error = %e, "manual registration failed");
            (error_status(&e), error_body(&e))
        })?;

    Ok(Json(RegisterResponse { domain: record.name }))
}

async fn switch_domain(State(state): State<AppState>) -> Json<PipelineRun> {
    Json(state.orchestrator.run_failover_check().await)
}
