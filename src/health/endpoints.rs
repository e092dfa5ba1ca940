//! Health endpoints.
//!
//! - `GET /health`: health gate over the critical dependencies
//! - `GET /health/load`: admission load, for an external load balancer

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::AppError;
use crate::health::HealthGate;
use crate::http::server::AppState;
use crate::load_balancer::LoadStats;
use crate::resilience::BreakerSnapshot;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub circuit_breakers: BTreeMap<String, BreakerSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct LoadReport {
    pub healthy: bool,
    pub stats: LoadStats,
    pub timestamp: DateTime<Utc>,
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthReport>, AppError> {
    let critical = state.critical.load();
    HealthGate::new(state.registry.clone()).check(critical.as_slice())?;

    Ok(Json(HealthReport {
        status: "ok",
        timestamp: Utc::now(),
        circuit_breakers: state.registry.all_statuses(),
    }))
}

pub async fn load_health(State(state): State<AppState>) -> Response {
    let healthy = state.admission.is_healthy();
    let report = LoadReport {
        healthy,
        stats: state.admission.load_stats(),
        timestamp: Utc::now(),
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
