use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use ocbot_core::domain::installation::{Installation, OAuthState, TeamId};

use super::{InstallationRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryInstallationRepository {
    installations: RwLock<HashMap<String, Installation>>,
    states: RwLock<HashMap<String, OAuthState>>,
}

impl InMemoryInstallationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl InstallationRepository for InMemoryInstallationRepository {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_installation(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<Installation>, RepositoryError> {
        let installations = self.installations.read().await;
        Ok(installations.get(&team_id.0).cloned())
    }

    async fn save_installation(&self, installation: Installation) -> Result<(), RepositoryError> {
        let mut installations = self.installations.write().await;
        installations.insert(installation.team_id.0.clone(), installation);
        Ok(())
    }

    async fn list_installations(&self) -> Result<Vec<Installation>, RepositoryError> {
        let installations = self.installations.read().await;
        let mut listed = installations.values().cloned().collect::<Vec<_>>();
        listed.sort_by(|left, right| left.team_id.0.cmp(&right.team_id.0));
        Ok(listed)
    }

    async fn save_oauth_state(&self, state: OAuthState) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut states = self.states.write().await;
        states.retain(|_, pending| !pending.is_expired(now));
        states.insert(state.state_token.clone(), state);
        Ok(())
    }

    async fn pending_oauth_states(&self) -> Result<usize, RepositoryError> {
        Ok(self.states.read().await.len())
    }

    async fn take_oauth_state(
        &self,
        state_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuthState>, RepositoryError> {
        let mut states = self.states.write().await;
        Ok(states.remove(state_token).filter(|state| !state.is_expired(now)))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryInstallationRepository;
    use crate::repositories::contract;

    #[tokio::test]
    async fn in_memory_repository_upserts_installations() {
        contract::installations_upsert_by_team(&InMemoryInstallationRepository::new()).await;
    }

    #[tokio::test]
    async fn in_memory_repository_consumes_oauth_states_once() {
        contract::oauth_states_are_single_use_and_expire(&InMemoryInstallationRepository::new())
            .await;
    }

    #[tokio::test]
    async fn in_memory_repository_purges_expired_states_on_save() {
        contract::expired_states_are_purged_on_save(&InMemoryInstallationRepository::new()).await;
    }
}
