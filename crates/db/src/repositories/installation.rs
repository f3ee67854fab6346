use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use ocbot_core::domain::installation::{Installation, OAuthState, TeamId};

use super::{parse_timestamp, timestamp, InstallationRepository, RepositoryError};
use crate::DbPool;

const INSTALLATION_COLUMNS: &str =
    "team_id, team_name, access_token, scope, bot_user_id, app_id, installed_by, installed_at";

pub struct SqlInstallationRepository {
    pool: DbPool,
}

impl SqlInstallationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn purge_expired_states(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM oauth_state WHERE expires_at <= ?")
            .bind(timestamp(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl InstallationRepository for SqlInstallationRepository {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn find_installation(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<Installation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {INSTALLATION_COLUMNS} FROM slack_installation WHERE team_id = ?"
        ))
        .bind(&team_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(installation_from_row).transpose()
    }

    async fn save_installation(&self, installation: Installation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO slack_installation (
                team_id,
                team_name,
                access_token,
                scope,
                bot_user_id,
                app_id,
                installed_by,
                installed_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(team_id) DO UPDATE SET
                team_name = excluded.team_name,
                access_token = excluded.access_token,
                scope = excluded.scope,
                bot_user_id = excluded.bot_user_id,
                app_id = excluded.app_id,
                installed_by = excluded.installed_by,
                installed_at = excluded.installed_at,
                updated_at = excluded.updated_at",
        )
        .bind(&installation.team_id.0)
        .bind(installation.team_name.as_deref())
        .bind(&installation.access_token)
        .bind(installation.scope.as_deref())
        .bind(installation.bot_user_id.as_deref())
        .bind(installation.app_id.as_deref())
        .bind(installation.installed_by.as_deref())
        .bind(timestamp(installation.installed_at))
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_installations(&self) -> Result<Vec<Installation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {INSTALLATION_COLUMNS} FROM slack_installation ORDER BY team_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(installation_from_row).collect()
    }

    async fn save_oauth_state(&self, state: OAuthState) -> Result<(), RepositoryError> {
        let purged = self.purge_expired_states(Utc::now()).await?;
        if purged > 0 {
            debug!(event_name = "db.oauth_state.purged", purged, "removed expired oauth states");
        }

        sqlx::query(
            "INSERT OR REPLACE INTO oauth_state (state_token, redirect_uri, created_at, expires_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&state.state_token)
        .bind(state.redirect_uri.as_deref())
        .bind(timestamp(state.created_at))
        .bind(timestamp(state.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn pending_oauth_states(&self) -> Result<usize, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS pending FROM oauth_state")
            .fetch_one(&self.pool)
            .await?;
        let pending: i64 = row.try_get("pending")?;
        Ok(usize::try_from(pending).unwrap_or_default())
    }

    async fn take_oauth_state(
        &self,
        state_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuthState>, RepositoryError> {
        let row = sqlx::query(
            "DELETE FROM oauth_state WHERE state_token = ?
             RETURNING state_token, redirect_uri, created_at, expires_at",
        )
        .bind(state_token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state = OAuthState {
            state_token: row.try_get("state_token")?,
            redirect_uri: row.try_get("redirect_uri")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
            expires_at: parse_timestamp(&row.try_get::<String, _>("expires_at")?)?,
        };

        Ok((!state.is_expired(now)).then_some(state))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn installation_from_row(row: SqliteRow) -> Result<Installation, RepositoryError> {
    Ok(Installation {
        team_id: TeamId(row.try_get("team_id")?),
        team_name: row.try_get("team_name")?,
        access_token: row.try_get("access_token")?,
        scope: row.try_get("scope")?,
        bot_user_id: row.try_get("bot_user_id")?,
        app_id: row.try_get("app_id")?,
        installed_by: row.try_get("installed_by")?,
        installed_at: parse_timestamp(&row.try_get::<String, _>("installed_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sqlx::Row;

    use ocbot_core::domain::installation::OAuthState;

    use super::SqlInstallationRepository;
    use crate::migrations;
    use crate::repositories::{contract, InstallationRepository};
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn sql_repository_upserts_installations() {
        let repository = SqlInstallationRepository::new(setup_pool().await);
        contract::installations_upsert_by_team(&repository).await;
    }

    #[tokio::test]
    async fn sql_repository_consumes_oauth_states_once() {
        let repository = SqlInstallationRepository::new(setup_pool().await);
        contract::oauth_states_are_single_use_and_expire(&repository).await;
    }

    #[tokio::test]
    async fn sql_repository_purges_expired_states_on_save() {
        let repository = SqlInstallationRepository::new(setup_pool().await);
        contract::expired_states_are_purged_on_save(&repository).await;
    }

    #[tokio::test]
    async fn saving_a_state_purges_expired_rows() {
        let pool = setup_pool().await;
        let repository = SqlInstallationRepository::new(pool.clone());
        let now = Utc::now();

        repository
            .save_oauth_state(OAuthState::issue("old", None, now - Duration::hours(1)))
            .await
            .expect("save old state");
        repository
            .save_oauth_state(OAuthState::issue("new", Some("https://example.test/cb".into()), now))
            .await
            .expect("save new state");

        let tokens = sqlx::query("SELECT state_token FROM oauth_state ORDER BY state_token")
            .fetch_all(&pool)
            .await
            .expect("list states")
            .iter()
            .map(|row| row.try_get::<String, _>("state_token").expect("state_token column"))
            .collect::<Vec<_>>();
        assert_eq!(tokens, vec!["new"]);

        let taken = repository.take_oauth_state("new", now).await.expect("take new");
        assert_eq!(
            taken.and_then(|state| state.redirect_uri).as_deref(),
            Some("https://example.test/cb")
        );
    }

    #[tokio::test]
    async fn ping_succeeds_on_open_pool() {
        let repository = SqlInstallationRepository::new(setup_pool().await);
        repository.ping().await.expect("ping");
        assert_eq!(repository.backend_name(), "sqlite");
    }
}
