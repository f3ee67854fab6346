//! "Add to Slack": `/login` starts the flow and `/oauth` receives Slack's
//! callback and stores the installation.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use ocbot_core::domain::installation::{Installation, OAuthState};
use ocbot_db::RepositoryError;
use ocbot_slack::oauth::OAuthError;

use crate::bootstrap::AppState;

pub const LOGIN_PATH: &str = "/login";
pub const CALLBACK_PATH: &str = "/oauth";

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("{0}")]
    Denied(String),
    #[error("missing state")]
    MissingState,
    #[error("unknown or expired state")]
    InvalidState,
    #[error("missing code")]
    MissingCode,
    #[error(transparent)]
    Exchange(#[from] OAuthError),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(LOGIN_PATH, get(login))
        .route(CALLBACK_PATH, get(callback))
        .with_state(state)
}

pub async fn login(State(state): State<AppState>) -> Response {
    let token = Uuid::new_v4().simple().to_string();
    let pending =
        OAuthState::issue(token.clone(), state.oauth.redirect_uri().map(str::to_owned), Utc::now());

    if let Err(error) = state.installations.save_oauth_state(pending).await {
        error!(
            event_name = "oauth.login.state_store_failed",
            correlation_id = %token,
            error = %error,
            "could not persist oauth state"
        );
        return error_response(&error);
    }

    match state.oauth.authorize_url(&token) {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(error) => error_response(&error),
    }
}

pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    match complete_install(&state, query).await {
        Ok(installation) => {
            info!(
                event_name = "oauth.install.completed",
                team_id = %installation.team_id.0,
                installed_by = installation.installed_by.as_deref().unwrap_or("unknown"),
                "slack workspace installed"
            );
            (StatusCode::OK, "Success!").into_response()
        }
        Err(error) => {
            error!(event_name = "oauth.install.failed", error = %error, "slack install failed");
            error_response(&error)
        }
    }
}

async fn complete_install(
    state: &AppState,
    query: CallbackQuery,
) -> Result<Installation, CallbackError> {
    if let Some(denied) = query.error {
        return Err(CallbackError::Denied(denied));
    }
    let token = query.state.filter(|value| !value.is_empty()).ok_or(CallbackError::MissingState)?;
    let pending = state
        .installations
        .take_oauth_state(&token, Utc::now())
        .await?
        .ok_or(CallbackError::InvalidState)?;
    let code = query.code.filter(|value| !value.is_empty()).ok_or(CallbackError::MissingCode)?;

    let installation = state.oauth.exchange_code(&code, pending.redirect_uri.as_deref()).await?;
    state.installations.save_installation(installation.clone()).await?;
    Ok(installation)
}

fn error_response(error: &dyn std::fmt::Display) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("ERROR: {error}")).into_response()
}
