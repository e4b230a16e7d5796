//! Service info and health handlers

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

use super::super::state::AppState;
use crate::messaging::ConsumerState;

#[derive(Serialize, ToSchema)]
pub struct ServiceInfo {
    #[schema(example = "Account Management API")]
    pub message: &'static str,
    #[schema(example = "1.0.0")]
    pub version: &'static str,
    /// Source revision the binary was built from
    pub build: &'static str,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`
    #[schema(example = "healthy")]
    pub status: &'static str,
    /// Ledger store backend
    #[schema(example = "postgres")]
    pub store: &'static str,
    /// Token consumer state, absent when the consumer is disabled
    #[schema(value_type = Option<String>, example = "consuming")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<ConsumerState>,
    /// Tokens currently cached
    pub cached_tokens: usize,
}

/// Service banner
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service info", body = ServiceInfo)),
    tag = "System"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Account Management API",
        version: "1.0.0",
        build: env!("GIT_HASH"),
    })
}

/// Health check endpoint
///
/// 503 when the PostgreSQL store does not answer.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Store unavailable", body = HealthResponse)
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = match &state.db {
        Some(db) => match db.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "[HEALTH] PostgreSQL ping failed");
                false
            }
        },
        None => true,
    };

    let body = HealthResponse {
        status: if store_ok { "healthy" } else { "unhealthy" },
        store: state.accounts.store_name(),
        consumer: state.consumer_state.as_ref().map(|rx| *rx.borrow()),
        cached_tokens: state.tokens.len(),
    };
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
