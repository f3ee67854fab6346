use std::sync::Arc;
use std::time::Duration;

use ocbot_airtable::record_store_from_config;
use ocbot_core::config::{AppConfig, ConfigError};
use ocbot_core::directory::{DirectoryService, RecordDirectory};
use ocbot_core::records::RecordStoreError;
use ocbot_db::{open_installation_store, InstallationRepository, StorageError};
use ocbot_slack::handler::SlashCommandHandler;
use ocbot_slack::oauth::{OAuthError, SlackOAuthClient};
use ocbot_slack::reply::{ReplyError, ReplySender, ResponseUrlReplier};
use ocbot_slack::verification::SignatureVerifier;
use thiserror::Error;
use tracing::info;

/// Everything the HTTP routes need, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub installations: Arc<dyn InstallationRepository>,
    pub oauth: Arc<SlackOAuthClient>,
    pub commands: Arc<SlashCommandHandler>,
    pub signature: Option<SignatureVerifier>,
}

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("installation store unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("record store client could not be built: {0}")]
    RecordStore(#[from] RecordStoreError),
    #[error("reply client could not be built: {0}")]
    Reply(#[from] ReplyError),
    #[error("oauth client could not be built: {0}")]
    OAuth(#[from] OAuthError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let installations = open_installation_store(&config.storage).await?;
    info!(
        event_name = "system.bootstrap.storage_ready",
        correlation_id = "bootstrap",
        backend = installations.backend_name(),
        "installation store ready"
    );

    let records = record_store_from_config(&config.airtable)?;
    let directory: Arc<dyn DirectoryService> = Arc::new(RecordDirectory::new(records));
    let replies: Arc<dyn ReplySender> =
        Arc::new(ResponseUrlReplier::new(Duration::from_secs(config.slack.reply_timeout_secs))?);
    let commands = SlashCommandHandler::new(
        config.slack.verification_token.clone(),
        directory,
        replies,
    );
    let oauth = SlackOAuthClient::from_config(&config.slack)?;
    let signature = config.slack.signing_secret.clone().map(SignatureVerifier::new);

    info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        signature_verification = signature.is_some(),
        airtable_configured = config.airtable.is_configured(),
        "application bootstrap complete"
    );

    Ok(Application {
        state: AppState {
            installations,
            oauth: Arc::new(oauth),
            commands: Arc::new(commands),
            signature,
        },
        config,
    })
}
