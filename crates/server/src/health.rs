use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use ocbot_db::InstallationRepository;

use crate::bootstrap::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub installation_store: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let installation_store = store_check(state.installations.as_ref()).await;
    let ready = installation_store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "ocbot-server runtime initialized".to_string(),
        },
        installation_store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn store_check(store: &dyn InstallationRepository) -> HealthCheck {
    match store.ping().await {
        Ok(()) => HealthCheck {
            status: "ready",
            detail: format!("{} store answered", store.backend_name()),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("{} store check failed: {error}", store.backend_name()),
        },
    }
}
