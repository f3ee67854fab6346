use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use ocbot_slack::commands::SlashCommandPayload;
use ocbot_slack::verification::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

use crate::bootstrap::AppState;

pub const RECEIVE_PATH: &str = "/slack/receive";

pub fn router(state: AppState) -> Router {
    Router::new().route(RECEIVE_PATH, post(receive)).with_state(state)
}

/// Acknowledges the command immediately; replies go out through the
/// command's `response_url` from a spawned task.
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let correlation_id = Uuid::new_v4().to_string();

    if let Some(verifier) = &state.signature {
        let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
        if let Err(error) = verifier.verify(
            header(TIMESTAMP_HEADER),
            header(SIGNATURE_HEADER),
            &body,
            Utc::now().timestamp(),
        ) {
            warn!(
                event_name = "ingress.slack.signature_rejected",
                correlation_id = %correlation_id,
                error = %error,
                "request signature rejected"
            );
            return StatusCode::UNAUTHORIZED;
        }
    }

    let payload = match SlashCommandPayload::from_form(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                event_name = "ingress.slack.payload_invalid",
                correlation_id = %correlation_id,
                error = %error,
                "slash command body could not be parsed"
            );
            return StatusCode::BAD_REQUEST;
        }
    };

    info!(
        event_name = "ingress.slack.command_received",
        correlation_id = %correlation_id,
        command = %payload.command,
        "slash command acknowledged"
    );

    let handler = state.commands.clone();
    tokio::spawn(async move {
        handler.handle(payload, &correlation_id).await;
    });

    StatusCode::OK
}
