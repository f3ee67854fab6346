use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_JSON_FILE_STORE: &str = "./db_slackbutton_slash_command/";

/// Variables the process refuses to start without.
pub const REQUIRED_ENV_VARS: [&str; 4] = ["CLIENT_ID", "CLIENT_SECRET", "VERIFICATION_TOKEN", "PORT"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub airtable: AirtableConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub verification_token: SecretString,
    pub signing_secret: Option<SecretString>,
    pub scopes: Vec<String>,
    pub redirect_uri: Option<String>,
    pub api_base_url: String,
    pub authorize_url: String,
    pub reply_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AirtableConfig {
    pub api_key: Option<SecretString>,
    pub base_id: Option<String>,
    pub api_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Zero means unset; validation rejects it.
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub database_url: Option<String>,
    pub json_file_store: PathBuf,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Database { url: String },
    Mongo { url: String },
    JsonFile { directory: PathBuf },
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub verification_token: Option<String>,
    pub signing_secret: Option<String>,
    pub port: Option<u16>,
    pub database_url: Option<String>,
    pub json_file_store: Option<PathBuf>,
    pub airtable_api_key: Option<String>,
    pub airtable_base_id: Option<String>,
    pub airtable_api_url: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("Specify CLIENT_ID, CLIENT_SECRET, VERIFICATION_TOKEN and PORT in environment (missing: {})", .0.join(", "))]
    MissingRequired(Vec<&'static str>),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                client_id: String::new(),
                client_secret: String::new().into(),
                verification_token: String::new().into(),
                signing_secret: None,
                scopes: vec!["commands".to_string()],
                redirect_uri: None,
                api_base_url: "https://slack.com/api".to_string(),
                authorize_url: "https://slack.com/oauth/v2/authorize".to_string(),
                reply_timeout_secs: 10,
            },
            airtable: AirtableConfig {
                api_key: None,
                base_id: None,
                api_url: "https://api.airtable.com".to_string(),
                timeout_secs: 10,
            },
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: 0 },
            storage: StorageConfig {
                database_url: None,
                json_file_store: PathBuf::from(DEFAULT_JSON_FILE_STORE),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl StorageConfig {
    /// A database URL wins; otherwise installs are kept as JSON files on disk.
    pub fn backend(&self) -> StorageBackend {
        match self.database_url.as_deref().map(str::trim) {
            Some(url) if url.starts_with("mongodb://") || url.starts_with("mongodb+srv://") => {
                StorageBackend::Mongo { url: url.to_string() }
            }
            Some(url) if !url.is_empty() => StorageBackend::Database { url: url.to_string() },
            _ => StorageBackend::JsonFile { directory: self.json_file_store.clone() },
        }
    }
}

impl AirtableConfig {
    pub fn is_configured(&self) -> bool {
        let has_key =
            self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty());
        let has_base = self.base_id.as_ref().is_some_and(|base| !base.trim().is_empty());
        has_key && has_base
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("ocbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(client_id) = slack.client_id {
                self.slack.client_id = client_id;
            }
            if let Some(client_secret) = slack.client_secret {
                self.slack.client_secret = secret_value(client_secret);
            }
            if let Some(verification_token) = slack.verification_token {
                self.slack.verification_token = secret_value(verification_token);
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = Some(secret_value(signing_secret));
            }
            if let Some(scopes) = slack.scopes {
                self.slack.scopes = scopes;
            }
            if let Some(redirect_uri) = slack.redirect_uri {
                self.slack.redirect_uri = Some(redirect_uri);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(authorize_url) = slack.authorize_url {
                self.slack.authorize_url = authorize_url;
            }
            if let Some(reply_timeout_secs) = slack.reply_timeout_secs {
                self.slack.reply_timeout_secs = reply_timeout_secs;
            }
        }

        if let Some(airtable) = patch.airtable {
            if let Some(api_key) = airtable.api_key {
                self.airtable.api_key = Some(secret_value(api_key));
            }
            if let Some(base_id) = airtable.base_id {
                self.airtable.base_id = Some(base_id);
            }
            if let Some(api_url) = airtable.api_url {
                self.airtable.api_url = api_url;
            }
            if let Some(timeout_secs) = airtable.timeout_secs {
                self.airtable.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(database_url) = storage.database_url {
                self.storage.database_url = Some(database_url);
            }
            if let Some(json_file_store) = storage.json_file_store {
                self.storage.json_file_store = json_file_store;
            }
            if let Some(max_connections) = storage.max_connections {
                self.storage.max_connections = max_connections;
            }
            if let Some(timeout_secs) = storage.timeout_secs {
                self.storage.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CLIENT_ID") {
            self.slack.client_id = value;
        }
        if let Some(value) = read_env("CLIENT_SECRET") {
            self.slack.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("VERIFICATION_TOKEN") {
            self.slack.verification_token = secret_value(value);
        }
        if let Some(value) = read_env("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("OCBOT_SLACK_SCOPES") {
            self.slack.scopes = parse_list(&value);
        }
        if let Some(value) = read_env("OCBOT_SLACK_REDIRECT_URI") {
            self.slack.redirect_uri = Some(value);
        }
        if let Some(value) = read_env("OCBOT_SLACK_API_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env("OCBOT_SLACK_AUTHORIZE_URL") {
            self.slack.authorize_url = value;
        }
        if let Some(value) = read_env("OCBOT_REPLY_TIMEOUT_SECS") {
            self.slack.reply_timeout_secs = parse_u64("OCBOT_REPLY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AIRTABLE_API_KEY") {
            self.airtable.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AIRTABLE_BASE") {
            self.airtable.base_id = Some(value);
        }
        if let Some(value) = read_env("OCBOT_AIRTABLE_API_URL") {
            self.airtable.api_url = value;
        }
        if let Some(value) = read_env("OCBOT_AIRTABLE_TIMEOUT_SECS") {
            self.airtable.timeout_secs = parse_u64("OCBOT_AIRTABLE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }
        if let Some(value) = read_env("OCBOT_BIND_ADDRESS") {
            self.server.bind_address = value;
        }

        let database_url = read_env("DATABASE_URL").or_else(|| read_env("MONGOLAB_URI"));
        if let Some(value) = database_url {
            self.storage.database_url = Some(value);
        }
        if let Some(value) = read_env("OCBOT_JSON_FILE_STORE") {
            self.storage.json_file_store = PathBuf::from(value);
        }
        if let Some(value) = read_env("OCBOT_DATABASE_MAX_CONNECTIONS") {
            self.storage.max_connections = parse_u32("OCBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("OCBOT_DATABASE_TIMEOUT_SECS") {
            self.storage.timeout_secs = parse_u64("OCBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OCBOT_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("OCBOT_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(client_id) = overrides.client_id {
            self.slack.client_id = client_id;
        }
        if let Some(client_secret) = overrides.client_secret {
            self.slack.client_secret = secret_value(client_secret);
        }
        if let Some(verification_token) = overrides.verification_token {
            self.slack.verification_token = secret_value(verification_token);
        }
        if let Some(signing_secret) = overrides.signing_secret {
            self.slack.signing_secret = Some(secret_value(signing_secret));
        }
        if let Some(slack_api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = slack_api_base_url;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(database_url) = overrides.database_url {
            self.storage.database_url = Some(database_url);
        }
        if let Some(json_file_store) = overrides.json_file_store {
            self.storage.json_file_store = json_file_store;
        }
        if let Some(api_key) = overrides.airtable_api_key {
            self.airtable.api_key = Some(secret_value(api_key));
        }
        if let Some(base_id) = overrides.airtable_base_id {
            self.airtable.base_id = Some(base_id);
        }
        if let Some(api_url) = overrides.airtable_api_url {
            self.airtable.api_url = api_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_required(self)?;
        validate_slack(&self.slack)?;
        validate_airtable(&self.airtable)?;
        validate_storage(&self.storage)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Loads a `.env` file into the process environment. Variables that are
/// already set keep their values. Without a path, the working directory and
/// its parents are searched.
pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => dotenvy::from_path(path).ok().map(|()| path.to_path_buf()),
        None => dotenvy::dotenv().ok(),
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("ocbot.toml"), PathBuf::from("config/ocbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_required(config: &AppConfig) -> Result<(), ConfigError> {
    let mut missing = Vec::new();
    if config.slack.client_id.trim().is_empty() {
        missing.push(REQUIRED_ENV_VARS[0]);
    }
    if config.slack.client_secret.expose_secret().trim().is_empty() {
        missing.push(REQUIRED_ENV_VARS[1]);
    }
    if config.slack.verification_token.expose_secret().trim().is_empty() {
        missing.push(REQUIRED_ENV_VARS[2]);
    }
    if config.server.port == 0 {
        missing.push(REQUIRED_ENV_VARS[3]);
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingRequired(missing))
    }
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if slack.scopes.iter().all(|scope| scope.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "slack.scopes must contain at least one OAuth scope (e.g. `commands`)".to_string(),
        ));
    }

    validate_http_url("slack.api_base_url", &slack.api_base_url)?;
    validate_http_url("slack.authorize_url", &slack.authorize_url)?;
    if let Some(redirect_uri) = &slack.redirect_uri {
        validate_http_url("slack.redirect_uri", redirect_uri)?;
    }
    validate_timeout("slack.reply_timeout_secs", slack.reply_timeout_secs)
}

fn validate_airtable(airtable: &AirtableConfig) -> Result<(), ConfigError> {
    validate_http_url("airtable.api_url", &airtable.api_url)?;
    validate_timeout("airtable.timeout_secs", airtable.timeout_secs)
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if let StorageBackend::Database { url } = storage.backend() {
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "storage.database_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, `:memory:`) or a mongodb URL (`mongodb://...`, `mongodb+srv://...`)"
                    .to_string(),
            ));
        }
    }

    if storage.json_file_store.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "storage.json_file_store must name a directory".to_string(),
        ));
    }

    if storage.max_connections == 0 {
        return Err(ConfigError::Validation(
            "storage.max_connections must be greater than zero".to_string(),
        ));
    }

    validate_timeout("storage.timeout_secs", storage.timeout_secs)
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
    }
}

fn validate_timeout(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    airtable: Option<AirtablePatch>,
    server: Option<ServerPatch>,
    storage: Option<StoragePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    client_id: Option<String>,
    client_secret: Option<String>,
    verification_token: Option<String>,
    signing_secret: Option<String>,
    scopes: Option<Vec<String>>,
    redirect_uri: Option<String>,
    api_base_url: Option<String>,
    authorize_url: Option<String>,
    reply_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AirtablePatch {
    api_key: Option<String>,
    base_id: Option<String>,
    api_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    database_url: Option<String>,
    json_file_store: Option<PathBuf>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
