// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::auth::publishable_key::InstanceType;
use crate::state::{AppState, KeyProvider};

/// Health check response with individual component status.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Instance type of the configured publishable key.
    pub instance: InstanceType,
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Verification key status: "static" for a PEM key, otherwise the
    /// JWKS fetch result.
    pub keys: String,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

async fn check_keys(state: &AppState) -> String {
    match &state.keys {
        KeyProvider::Static(_) => "static".to_string(),
        KeyProvider::Jwks(manager) => {
            if manager.is_cached().await {
                return "ok".to_string();
            }
            match manager.refresh().await {
                Ok(_) => "ok".to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "JWKS unavailable during health check");
                    "unavailable".to_string()
                }
            }
        }
    }
}

/// Readiness handler.
///
/// Returns 200 when verification keys are available, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let keys = check_keys(&state).await;
    let ok = keys != "unavailable";

    let response = ReadyResponse {
        status: if ok { "ok" } else { "degraded" }.to_string(),
        instance: state.engine.config().publishable_key.instance_type,
        checks: HealthChecks {
            service: "ok".to_string(),
            keys,
        },
    };

    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
