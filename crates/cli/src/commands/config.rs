use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ocbot_core::config::{AppConfig, LoadOptions, LogFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_OK};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    command: &'static str,
    status: &'static str,
    source_precedence: &'static str,
    entries: Vec<ConfigEntry>,
}

struct SourceLookup {
    doc: Option<Value>,
    path: Option<PathBuf>,
}

impl SourceLookup {
    fn detect() -> Self {
        let path = detect_config_path();
        let doc = load_config_file_doc(path.as_deref());
        Self { doc, path }
    }

    fn entry(&self, key: &'static str, value: impl Into<String>, env_keys: &[&str]) -> ConfigEntry {
        ConfigEntry { key, value: value.into(), source: self.source(key, env_keys) }
    }

    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let report = ConfigReport {
        command: "config",
        status: "ok",
        source_precedence: "env > file > default",
        entries: entries(&config, &SourceLookup::detect()),
    };

    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult { exit_code: EXIT_OK, output },
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 1),
    }
}

fn entries(config: &AppConfig, lookup: &SourceLookup) -> Vec<ConfigEntry> {
    let slack = &config.slack;
    let airtable = &config.airtable;
    let storage = &config.storage;

    vec![
        lookup.entry("slack.client_id", slack.client_id.clone(), &["CLIENT_ID"]),
        lookup.entry("slack.client_secret", redact(&slack.client_secret), &["CLIENT_SECRET"]),
        lookup.entry(
            "slack.verification_token",
            redact(&slack.verification_token),
            &["VERIFICATION_TOKEN"],
        ),
        lookup.entry(
            "slack.signing_secret",
            redact_optional(slack.signing_secret.as_ref()),
            &["SLACK_SIGNING_SECRET"],
        ),
        lookup.entry("slack.scopes", slack.scopes.join(","), &["OCBOT_SLACK_SCOPES"]),
        lookup.entry(
            "slack.redirect_uri",
            slack.redirect_uri.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["OCBOT_SLACK_REDIRECT_URI"],
        ),
        lookup.entry("slack.api_base_url", slack.api_base_url.clone(), &["OCBOT_SLACK_API_URL"]),
        lookup.entry(
            "slack.authorize_url",
            slack.authorize_url.clone(),
            &["OCBOT_SLACK_AUTHORIZE_URL"],
        ),
        lookup.entry(
            "slack.reply_timeout_secs",
            slack.reply_timeout_secs.to_string(),
            &["OCBOT_REPLY_TIMEOUT_SECS"],
        ),
        lookup.entry(
            "airtable.api_key",
            redact_optional(airtable.api_key.as_ref()),
            &["AIRTABLE_API_KEY"],
        ),
        lookup.entry(
            "airtable.base_id",
            airtable.base_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["AIRTABLE_BASE"],
        ),
        lookup.entry("airtable.api_url", airtable.api_url.clone(), &["OCBOT_AIRTABLE_API_URL"]),
        lookup.entry(
            "airtable.timeout_secs",
            airtable.timeout_secs.to_string(),
            &["OCBOT_AIRTABLE_TIMEOUT_SECS"],
        ),
        lookup.entry(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["OCBOT_BIND_ADDRESS"],
        ),
        lookup.entry("server.port", config.server.port.to_string(), &["PORT"]),
        lookup.entry(
            "storage.database_url",
            storage.database_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["DATABASE_URL", "MONGOLAB_URI"],
        ),
        lookup.entry(
            "storage.json_file_store",
            storage.json_file_store.display().to_string(),
            &["OCBOT_JSON_FILE_STORE"],
        ),
        lookup.entry(
            "storage.max_connections",
            storage.max_connections.to_string(),
            &["OCBOT_DATABASE_MAX_CONNECTIONS"],
        ),
        lookup.entry(
            "storage.timeout_secs",
            storage.timeout_secs.to_string(),
            &["OCBOT_DATABASE_TIMEOUT_SECS"],
        ),
        lookup.entry("logging.level", config.logging.level.clone(), &["OCBOT_LOG_LEVEL"]),
        lookup.entry("logging.format", log_format_name(config.logging.format), &["OCBOT_LOG_FORMAT"]),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("ocbot.toml"), PathBuf::from("config/ocbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn log_format_name(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    }
}

fn redact_optional(secret: Option<&SecretString>) -> String {
    secret.map(redact).unwrap_or_else(|| "<unset>".to_string())
}

/// Keeps a Slack-style prefix (`xoxb-`) so operators can tell token kinds apart.
fn redact(secret: &SecretString) -> String {
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, redact, redact_optional};

    #[test]
    fn redaction_never_reveals_secret_bodies() {
        assert_eq!(redact(&SecretString::from("xoxb-123-abc".to_owned())), "xoxb-***");
        assert_eq!(redact(&SecretString::from("keyABC".to_owned())), "<redacted>");
        assert_eq!(redact(&SecretString::from("  ".to_owned())), "<empty>");
        assert_eq!(redact_optional(None), "<unset>");
    }

    #[test]
    fn nested_keys_are_found_in_config_documents() {
        let doc = "[slack]\nclient_id = \"1.2\"\n".parse::<Value>().expect("toml");

        assert!(contains_path(&doc, "slack.client_id"));
        assert!(!contains_path(&doc, "slack.client_secret"));
        assert!(!contains_path(&doc, "storage.database_url"));
    }
}
