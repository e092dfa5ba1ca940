use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::AppError;
use crate::http::server::AppState;
use crate::load_balancer::LoadStats;
use crate::resilience::{BreakerSnapshot, CircuitState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: i64,
    pub breakers: usize,
    pub open_breakers: Vec<String>,
    pub critical_dependencies: Vec<String>,
    pub load: LoadStats,
}

#[derive(Debug, Serialize)]
pub struct LoadSummary {
    pub healthy: bool,
    #[serde(flatten)]
    pub stats: LoadStats,
}

#[derive(Debug, Serialize)]
pub struct ResetSummary {
    pub reset: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let statuses = state.registry.all_statuses();
    let open_breakers = statuses
        .values()
        .filter(|s| s.state == CircuitState::Open)
        .map(|s| s.name.clone())
        .collect();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        breakers: statuses.len(),
        open_breakers,
        critical_dependencies: state.critical.load_full().to_vec(),
        load: state.admission.load_stats(),
    })
}

pub async fn list_breakers(State(state): State<AppState>) -> Json<BTreeMap<String, BreakerSnapshot>> {
    Json(state.registry.all_statuses())
}

pub async fn get_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, AppError> {
    state
        .registry
        .status(&name)
        .map(Json)
        .ok_or_else(|| unknown_breaker(&name))
}

pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, AppError> {
    apply(&state, &name, state.registry.reset(&name), "reset")
}

pub async fn open_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, AppError> {
    apply(&state, &name, state.registry.force_open(&name), "force_open")
}

pub async fn close_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, AppError> {
    apply(&state, &name, state.registry.force_closed(&name), "force_closed")
}

pub async fn reset_all(State(state): State<AppState>) -> Json<ResetSummary> {
    state.registry.reset_all();
    tracing::info!(action = "reset_all", "Admin action");
    Json(ResetSummary {
        reset: state.registry.len(),
    })
}

pub async fn get_load(State(state): State<AppState>) -> Json<LoadSummary> {
    Json(LoadSummary {
        healthy: state.admission.is_healthy(),
        stats: state.admission.load_stats(),
    })
}

fn apply(
    state: &AppState,
    name: &str,
    found: bool,
    action: &'static str,
) -> Result<Json<BreakerSnapshot>, AppError> {
    if !found {
        return Err(unknown_breaker(name));
    }
    tracing::info!(breaker = %name, action, "Admin action");
    state
        .registry
        .status(name)
        .map(Json)
        .ok_or_else(|| unknown_breaker(name))
}

fn unknown_breaker(name: &str) -> AppError {
    AppError::not_found(format!("Circuit breaker '{}' not found", name))
}
