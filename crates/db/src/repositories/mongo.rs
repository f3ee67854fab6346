use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ocbot_core::domain::installation::{Installation, OAuthState, TeamId};

use super::{parse_timestamp, timestamp, InstallationRepository, RepositoryError};

const DEFAULT_DATABASE: &str = "ocbot";
const TEAMS_COLLECTION: &str = "teams";
const STATES_COLLECTION: &str = "oauth_states";

#[derive(Debug, Serialize, Deserialize)]
struct TeamDocument {
    #[serde(rename = "_id")]
    team_id: String,
    team_name: Option<String>,
    access_token: String,
    scope: Option<String>,
    bot_user_id: Option<String>,
    app_id: Option<String>,
    installed_by: Option<String>,
    installed_at: String,
}

impl TeamDocument {
    fn from_installation(installation: Installation) -> Self {
        Self {
            team_id: installation.team_id.0,
            team_name: installation.team_name,
            access_token: installation.access_token,
            scope: installation.scope,
            bot_user_id: installation.bot_user_id,
            app_id: installation.app_id,
            installed_by: installation.installed_by,
            installed_at: timestamp(installation.installed_at),
        }
    }

    fn into_installation(self) -> Result<Installation, RepositoryError> {
        Ok(Installation {
            team_id: TeamId(self.team_id),
            team_name: self.team_name,
            access_token: self.access_token,
            scope: self.scope,
            bot_user_id: self.bot_user_id,
            app_id: self.app_id,
            installed_by: self.installed_by,
            installed_at: parse_timestamp(&self.installed_at)?,
        })
    }
}

/// Timestamps are stored in a fixed-width RFC 3339 form so string
/// comparison orders them.
#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    #[serde(rename = "_id")]
    state_token: String,
    redirect_uri: Option<String>,
    created_at: String,
    expires_at: String,
}

impl StateDocument {
    fn from_state(state: OAuthState) -> Self {
        Self {
            state_token: state.state_token,
            redirect_uri: state.redirect_uri,
            created_at: timestamp(state.created_at),
            expires_at: timestamp(state.expires_at),
        }
    }

    fn into_state(self) -> Result<OAuthState, RepositoryError> {
        Ok(OAuthState {
            state_token: self.state_token,
            redirect_uri: self.redirect_uri,
            created_at: parse_timestamp(&self.created_at)?,
            expires_at: parse_timestamp(&self.expires_at)?,
        })
    }
}

/// Installation store over a MongoDB database, for `MONGOLAB_URI` style
/// deployments. Uses the database named in the URL, or `ocbot`.
pub struct MongoInstallationRepository {
    database: Database,
}

impl MongoInstallationRepository {
    /// Parses the URL and builds a client. The driver connects lazily, so an
    /// unreachable server surfaces on the first operation.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let client = Client::with_uri_str(url).await?;
        let database =
            client.default_database().unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        Ok(Self { database })
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    fn teams(&self) -> Collection<TeamDocument> {
        self.database.collection(TEAMS_COLLECTION)
    }

    fn states(&self) -> Collection<StateDocument> {
        self.database.collection(STATES_COLLECTION)
    }
}

#[async_trait::async_trait]
impl InstallationRepository for MongoInstallationRepository {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn find_installation(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<Installation>, RepositoryError> {
        self.teams()
            .find_one(doc! { "_id": team_id.0.as_str() })
            .await?
            .map(TeamDocument::into_installation)
            .transpose()
    }

    async fn save_installation(&self, installation: Installation) -> Result<(), RepositoryError> {
        let document = TeamDocument::from_installation(installation);
        self.teams()
            .replace_one(doc! { "_id": document.team_id.as_str() }, &document)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn list_installations(&self) -> Result<Vec<Installation>, RepositoryError> {
        let mut cursor = self.teams().find(doc! {}).sort(doc! { "_id": 1 }).await?;

        let mut installations = Vec::new();
        while cursor.advance().await? {
            installations.push(cursor.deserialize_current()?.into_installation()?);
        }
        Ok(installations)
    }

    async fn save_oauth_state(&self, state: OAuthState) -> Result<(), RepositoryError> {
        let purged = self
            .states()
            .delete_many(doc! { "expires_at": { "$lte": timestamp(Utc::now()) } })
            .await?;
        if purged.deleted_count > 0 {
            debug!(
                event_name = "db.oauth_state.purged",
                purged = purged.deleted_count,
                "removed expired oauth states"
            );
        }

        let document = StateDocument::from_state(state);
        self.states()
            .replace_one(doc! { "_id": document.state_token.as_str() }, &document)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn pending_oauth_states(&self) -> Result<usize, RepositoryError> {
        let count = self.states().count_documents(doc! {}).await?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn take_oauth_state(
        &self,
        state_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuthState>, RepositoryError> {
        let taken = self.states().find_one_and_delete(doc! { "_id": state_token }).await?;
        match taken {
            Some(document) => {
                let state = document.into_state()?;
                Ok((!state.is_expired(now)).then_some(state))
            }
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use ocbot_core::domain::installation::OAuthState;

    use super::{MongoInstallationRepository, StateDocument, TeamDocument};
    use crate::repositories::{contract, InstallationRepository, RepositoryError};

    /// Set to run the shared behavior against a live server.
    const LIVE_URL_VAR: &str = "OCBOT_TEST_MONGODB_URL";

    #[test]
    fn documents_keep_every_installation_field() {
        let installation = contract::installation("T42", "xoxp-mongo");

        let document = TeamDocument::from_installation(installation.clone());
        assert_eq!(document.team_id, "T42");

        let restored = document.into_installation().expect("decode installation");
        assert_eq!(restored.team_id, installation.team_id);
        assert_eq!(restored.access_token, "xoxp-mongo");
        assert_eq!(restored.installed_by, installation.installed_by);
    }

    #[test]
    fn state_timestamps_sort_as_strings() {
        let earlier = OAuthState::issue("a", None, Utc::now());
        let later = OAuthState::issue("b", None, earlier.created_at + chrono::Duration::seconds(1));

        let earlier = StateDocument::from_state(earlier);
        let later = StateDocument::from_state(later);
        assert!(earlier.expires_at < later.expires_at);
        assert_eq!(earlier.expires_at.len(), later.expires_at.len());
    }

    #[tokio::test]
    async fn database_name_comes_from_the_url() {
        let named = MongoInstallationRepository::connect("mongodb://127.0.0.1:1/heroku_abc")
            .await
            .expect("parse url");
        assert_eq!(named.database_name(), "heroku_abc");
        assert_eq!(named.backend_name(), "mongodb");

        let unnamed =
            MongoInstallationRepository::connect("mongodb://127.0.0.1:1").await.expect("parse url");
        assert_eq!(unnamed.database_name(), "ocbot");
    }

    #[tokio::test]
    async fn unreachable_server_fails_ping() {
        let repository = MongoInstallationRepository::connect(
            "mongodb://127.0.0.1:1/ocbot?serverSelectionTimeoutMS=200&connectTimeoutMS=200",
        )
        .await
        .expect("parse url");

        let error = repository.ping().await.expect_err("nothing listens on port 1");
        assert!(matches!(error, RepositoryError::Mongo(_)));
    }

    #[tokio::test]
    async fn live_server_shares_repository_behavior() {
        let Ok(url) = std::env::var(LIVE_URL_VAR) else {
            return;
        };
        let repository = MongoInstallationRepository::connect(&url).await.expect("connect");
        repository.database.drop().await.expect("reset database");

        contract::installations_upsert_by_team(&repository).await;
        contract::oauth_states_are_single_use_and_expire(&repository).await;
        repository.database.drop().await.expect("reset database");
        contract::expired_states_are_purged_on_save(&repository).await;
    }
}
