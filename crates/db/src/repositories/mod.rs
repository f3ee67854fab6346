use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use ocbot_core::domain::installation::{Installation, OAuthState, TeamId};

pub mod installation;
pub mod json_file;
pub mod memory;
pub mod mongo;

pub use installation::SqlInstallationRepository;
pub use json_file::JsonFileInstallationRepository;
pub use memory::InMemoryInstallationRepository;
pub use mongo::MongoInstallationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("file store error at `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("decode error: {0}")]
    Decode(String),
}

/// Installation state for the "Add to Slack" flow.
#[async_trait]
pub trait InstallationRepository: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn find_installation(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<Installation>, RepositoryError>;

    /// Inserts or replaces the installation for its team.
    async fn save_installation(&self, installation: Installation) -> Result<(), RepositoryError>;

    async fn list_installations(&self) -> Result<Vec<Installation>, RepositoryError>;

    /// Stores a pending state and drops every state already expired.
    async fn save_oauth_state(&self, state: OAuthState) -> Result<(), RepositoryError>;

    async fn pending_oauth_states(&self) -> Result<usize, RepositoryError>;

    /// Consumes the state token. Returns it only when it existed and had not
    /// expired at `now`; a token can never be taken twice.
    async fn take_oauth_state(
        &self,
        state_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuthState>, RepositoryError>;

    async fn ping(&self) -> Result<(), RepositoryError>;
}

pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behavior every backend must share.

    use chrono::{Duration, Utc};

    use ocbot_core::domain::installation::{Installation, OAuthState, TeamId};

    use super::InstallationRepository;

    pub fn installation(team_id: &str, token: &str) -> Installation {
        Installation {
            team_id: TeamId(team_id.to_string()),
            team_name: Some(format!("team {team_id}")),
            access_token: token.to_string(),
            scope: Some("commands".to_string()),
            bot_user_id: None,
            app_id: Some("A0001".to_string()),
            installed_by: Some("U0001".to_string()),
            installed_at: Utc::now(),
        }
    }

    pub async fn installations_upsert_by_team(repository: &dyn InstallationRepository) {
        repository.save_installation(installation("T1", "xoxp-first")).await.expect("save T1");
        repository.save_installation(installation("T2", "xoxp-other")).await.expect("save T2");
        repository.save_installation(installation("T1", "xoxp-second")).await.expect("resave T1");

        let found = repository
            .find_installation(&TeamId("T1".to_string()))
            .await
            .expect("find T1")
            .expect("T1 should exist");
        assert_eq!(found.access_token, "xoxp-second");

        let missing =
            repository.find_installation(&TeamId("T9".to_string())).await.expect("find T9");
        assert!(missing.is_none());

        let mut teams = repository
            .list_installations()
            .await
            .expect("list")
            .into_iter()
            .map(|installation| installation.team_id.0)
            .collect::<Vec<_>>();
        teams.sort();
        assert_eq!(teams, vec!["T1", "T2"]);
    }

    pub async fn oauth_states_are_single_use_and_expire(repository: &dyn InstallationRepository) {
        let now = Utc::now();
        repository
            .save_oauth_state(OAuthState::issue("fresh", None, now))
            .await
            .expect("save fresh state");
        repository
            .save_oauth_state(OAuthState::issue("stale", None, now - Duration::minutes(30)))
            .await
            .expect("save stale state");

        let taken = repository.take_oauth_state("fresh", now).await.expect("take fresh");
        assert_eq!(taken.map(|state| state.state_token).as_deref(), Some("fresh"));

        let again = repository.take_oauth_state("fresh", now).await.expect("take fresh again");
        assert!(again.is_none(), "state must be single-use");

        let stale = repository.take_oauth_state("stale", now).await.expect("take stale");
        assert!(stale.is_none(), "expired state must be rejected");

        let unknown = repository.take_oauth_state("never-issued", now).await.expect("take unknown");
        assert!(unknown.is_none());
    }

    pub async fn expired_states_are_purged_on_save(repository: &dyn InstallationRepository) {
        let issued_long_ago = Utc::now() - Duration::hours(2);
        for index in 0..5 {
            repository
                .save_oauth_state(OAuthState::issue(format!("old-{index}"), None, issued_long_ago))
                .await
                .expect("save old state");
        }
        repository
            .save_oauth_state(OAuthState::issue("current", None, Utc::now()))
            .await
            .expect("save current state");

        assert_eq!(repository.pending_oauth_states().await.expect("count states"), 1);
        let current = repository.take_oauth_state("current", Utc::now()).await.expect("take");
        assert!(current.is_some());
        assert_eq!(repository.pending_oauth_states().await.expect("count states"), 0);
    }
}
