//! One JSON document per team and per pending OAuth state, under a single
//! directory. Used when no database URL is configured.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use ocbot_core::domain::installation::{Installation, OAuthState, TeamId};

use super::{InstallationRepository, RepositoryError};

const TEAMS_DIR: &str = "teams";
const STATES_DIR: &str = "oauth_states";

pub struct JsonFileInstallationRepository {
    root: PathBuf,
    // Serializes state writes, sweeps and take-then-delete so a state cannot
    // be consumed twice.
    state_lock: Mutex<()>,
}

impl JsonFileInstallationRepository {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let root = root.into();
        for sub in [TEAMS_DIR, STATES_DIR] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).await.map_err(|source| io_error(&dir, source))?;
        }
        Ok(Self { root, state_lock: Mutex::new(()) })
    }

    /// Opens a store only if its directories already exist; never creates them.
    pub async fn open_existing(root: impl Into<PathBuf>) -> Result<Option<Self>, RepositoryError> {
        let root = root.into();
        for sub in [TEAMS_DIR, STATES_DIR] {
            let dir = root.join(sub);
            match fs::metadata(&dir).await {
                Ok(metadata) if metadata.is_dir() => {}
                Ok(_) => return Ok(None),
                Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
                Err(source) => return Err(io_error(&dir, source)),
            }
        }
        Ok(Some(Self { root, state_lock: Mutex::new(()) }))
    }

    async fn state_files(&self) -> Result<Vec<PathBuf>, RepositoryError> {
        let dir = self.root.join(STATES_DIR);
        let mut entries = fs::read_dir(&dir).await.map_err(|source| io_error(&dir, source))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| io_error(&dir, source))? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Caller holds `state_lock`.
    async fn purge_expired_states(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut purged = 0;
        for path in self.state_files().await? {
            match read_document::<OAuthState>(&path).await {
                Ok(Some(state)) if state.is_expired(now) => {}
                Ok(_) => continue,
                // Undecodable leftovers are logged by `read_document` and kept.
                Err(_) => continue,
            }
            match fs::remove_file(&path).await {
                Ok(()) => purged += 1,
                Err(source) if source.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(io_error(&path, source)),
            }
        }
        Ok(purged)
    }

    fn team_path(&self, team_id: &str) -> Result<PathBuf, RepositoryError> {
        Ok(self.root.join(TEAMS_DIR).join(format!("{}.json", file_key(team_id)?)))
    }

    fn state_path(&self, state_token: &str) -> Result<PathBuf, RepositoryError> {
        Ok(self.root.join(STATES_DIR).join(format!("{}.json", file_key(state_token)?)))
    }
}

#[async_trait::async_trait]
impl InstallationRepository for JsonFileInstallationRepository {
    fn backend_name(&self) -> &'static str {
        "json_file"
    }

    async fn find_installation(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<Installation>, RepositoryError> {
        let path = self.team_path(&team_id.0)?;
        read_document(&path).await
    }

    async fn save_installation(&self, installation: Installation) -> Result<(), RepositoryError> {
        let path = self.team_path(&installation.team_id.0)?;
        write_document(&path, &installation).await
    }

    async fn list_installations(&self) -> Result<Vec<Installation>, RepositoryError> {
        let dir = self.root.join(TEAMS_DIR);
        let mut entries = fs::read_dir(&dir).await.map_err(|source| io_error(&dir, source))?;

        let mut installations = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| io_error(&dir, source))? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(installation) = read_document::<Installation>(&path).await? {
                installations.push(installation);
            }
        }

        installations.sort_by(|left, right| left.team_id.0.cmp(&right.team_id.0));
        Ok(installations)
    }

    async fn save_oauth_state(&self, state: OAuthState) -> Result<(), RepositoryError> {
        let path = self.state_path(&state.state_token)?;

        let _guard = self.state_lock.lock().await;
        let purged = self.purge_expired_states(Utc::now()).await?;
        if purged > 0 {
            debug!(event_name = "db.oauth_state.purged", purged, "removed expired oauth states");
        }
        write_document(&path, &state).await
    }

    async fn pending_oauth_states(&self) -> Result<usize, RepositoryError> {
        Ok(self.state_files().await?.len())
    }

    async fn take_oauth_state(
        &self,
        state_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuthState>, RepositoryError> {
        // Unknown or malformed tokens are simply not found.
        let Ok(path) = self.state_path(state_token) else {
            return Ok(None);
        };

        let _guard = self.state_lock.lock().await;
        let Some(state) = read_document::<OAuthState>(&path).await? else {
            return Ok(None);
        };
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&path, source)),
        }

        Ok((!state.is_expired(now)).then_some(state))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        let dir = self.root.join(TEAMS_DIR);
        let metadata = fs::metadata(&dir).await.map_err(|source| io_error(&dir, source))?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(RepositoryError::Decode(format!("`{}` is not a directory", dir.display())))
        }
    }
}

/// Keys become file names, so only a conservative alphabet is accepted.
fn file_key(raw: &str) -> Result<&str, RepositoryError> {
    let valid = !raw.is_empty()
        && raw.len() <= 128
        && raw.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(raw)
    } else {
        Err(RepositoryError::Decode(format!("`{raw}` is not a valid storage key")))
    }
}

async fn read_document<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, RepositoryError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(io_error(path, source)),
    };

    serde_json::from_slice(&bytes).map(Some).map_err(|error| {
        warn!(
            event_name = "db.json_file.decode_failed",
            path = %path.display(),
            error = %error,
            "stored document could not be decoded"
        );
        RepositoryError::Decode(format!("{}: {error}", path.display()))
    })
}

async fn write_document<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    // Unique per write so concurrent upserts of one key never share a staging file.
    let staging = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

    fs::write(&staging, bytes).await.map_err(|source| io_error(&staging, source))?;
    if let Err(source) = fs::rename(&staging, path).await {
        let _ = fs::remove_file(&staging).await;
        return Err(io_error(path, source));
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> RepositoryError {
    RepositoryError::Io { path: path.to_path_buf(), source }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use tokio::task::JoinSet;

    use ocbot_core::domain::installation::{OAuthState, TeamId};

    use super::JsonFileInstallationRepository;
    use crate::repositories::{contract, InstallationRepository, RepositoryError};

    #[tokio::test]
    async fn json_store_upserts_installations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repository = JsonFileInstallationRepository::open(dir.path()).await.expect("open store");
        contract::installations_upsert_by_team(&repository).await;

        assert!(dir.path().join("teams").join("T1.json").exists());
    }

    #[tokio::test]
    async fn json_store_consumes_oauth_states_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repository = JsonFileInstallationRepository::open(dir.path()).await.expect("open store");
        contract::oauth_states_are_single_use_and_expire(&repository).await;
    }

    #[tokio::test]
    async fn json_store_purges_expired_states_on_save() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repository = JsonFileInstallationRepository::open(dir.path()).await.expect("open store");
        contract::expired_states_are_purged_on_save(&repository).await;
    }

    #[tokio::test]
    async fn expired_state_files_are_removed_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repository = JsonFileInstallationRepository::open(dir.path()).await.expect("open store");
        let issued_long_ago = Utc::now() - Duration::hours(2);
        for index in 0..50 {
            repository
                .save_oauth_state(OAuthState::issue(format!("old-{index}"), None, issued_long_ago))
                .await
                .expect("save old state");
        }
        repository
            .save_oauth_state(OAuthState::issue("fresh", None, Utc::now()))
            .await
            .expect("save fresh state");

        let files = std::fs::read_dir(dir.path().join("oauth_states")).expect("list states").count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn concurrent_upserts_of_one_team_all_succeed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repository =
            Arc::new(JsonFileInstallationRepository::open(dir.path()).await.expect("open store"));

        let mut writers = JoinSet::new();
        for index in 0..16 {
            let repository = repository.clone();
            writers.spawn(async move {
                repository
                    .save_installation(contract::installation("T7", &format!("xoxp-{index}")))
                    .await
            });
        }
        while let Some(joined) = writers.join_next().await {
            joined.expect("writer task").expect("concurrent save");
        }

        let found = repository
            .find_installation(&TeamId("T7".to_string()))
            .await
            .expect("find")
            .expect("installation stored");
        assert!(found.access_token.starts_with("xoxp-"));
        let leftovers = std::fs::read_dir(dir.path().join("teams"))
            .expect("list teams")
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn open_existing_never_creates_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("not-yet");

        let missing =
            JsonFileInstallationRepository::open_existing(&root).await.expect("check missing store");
        assert!(missing.is_none());
        assert!(!root.exists());

        JsonFileInstallationRepository::open(&root).await.expect("create store");
        let existing = JsonFileInstallationRepository::open_existing(&root).await.expect("reopen");
        assert!(existing.is_some());
    }

    #[tokio::test]
    async fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let repository =
                JsonFileInstallationRepository::open(dir.path()).await.expect("open store");
            repository
                .save_installation(contract::installation("T42", "xoxp-kept"))
                .await
                .expect("save");
        }

        let reopened = JsonFileInstallationRepository::open(dir.path()).await.expect("reopen store");
        let found = reopened
            .find_installation(&TeamId("T42".to_string()))
            .await
            .expect("find")
            .expect("installation should persist");
        assert_eq!(found.access_token, "xoxp-kept");
    }

    #[tokio::test]
    async fn path_like_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repository = JsonFileInstallationRepository::open(dir.path()).await.expect("open store");

        let error = repository
            .find_installation(&TeamId("../escape".to_string()))
            .await
            .expect_err("traversal key must be rejected");
        assert!(matches!(error, RepositoryError::Decode(_)));

        let taken =
            repository.take_oauth_state("../../etc/passwd", Utc::now()).await.expect("take");
        assert!(taken.is_none());
    }
}
