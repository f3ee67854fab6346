//! "Add to Slack" installation: the authorize redirect and the
//! `oauth.v2.access` code exchange.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use ocbot_core::config::SlackConfig;
use ocbot_core::domain::installation::{Installation, TeamId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OAuthError {
    #[error("invalid oauth url `{url}`: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("oauth request failed: {0}")]
    Request(String),
    #[error("oauth endpoint returned {0}")]
    Status(u16),
    #[error("{0}")]
    Rejected(String),
    #[error("oauth response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    bot_user_id: Option<String>,
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    team: Option<TeamRef>,
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    team_name: Option<String>,
    #[serde(default)]
    authed_user: Option<AuthedUser>,
}

#[derive(Debug, Deserialize)]
struct TeamRef {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthedUser {
    id: String,
}

impl AccessResponse {
    fn into_installation(self, now: DateTime<Utc>) -> Result<Installation, OAuthError> {
        if !self.ok {
            return Err(OAuthError::Rejected(
                self.error.unwrap_or_else(|| "unknown_error".to_owned()),
            ));
        }

        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| OAuthError::Decode("response has no access_token".to_owned()))?;
        let (team_id, team_name) = match self.team {
            Some(team) => (Some(team.id), team.name),
            None => (self.team_id, self.team_name),
        };
        let team_id = team_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OAuthError::Decode("response has no team id".to_owned()))?;

        Ok(Installation {
            team_id: TeamId(team_id),
            team_name,
            access_token,
            scope: self.scope,
            bot_user_id: self.bot_user_id,
            app_id: self.app_id,
            installed_by: self.authed_user.map(|user| user.id),
            installed_at: now,
        })
    }
}

pub struct SlackOAuthClient {
    http: Client,
    client_id: String,
    client_secret: SecretString,
    api_base_url: String,
    authorize_url: String,
    scopes: Vec<String>,
    redirect_uri: Option<String>,
}

impl SlackOAuthClient {
    pub fn from_config(config: &SlackConfig) -> Result<Self, OAuthError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.reply_timeout_secs))
            .build()
            .map_err(|error| OAuthError::Request(error.to_string()))?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            authorize_url: config.authorize_url.clone(),
            scopes: config.scopes.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    /// Where `/login` sends the installing user.
    pub fn authorize_url(&self, state: &str) -> Result<Url, OAuthError> {
        let mut url = Url::parse(&self.authorize_url).map_err(|error| OAuthError::InvalidUrl {
            url: self.authorize_url.clone(),
            message: error.to_string(),
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("scope", &self.scopes.join(","));
            query.append_pair("state", state);
            if let Some(redirect_uri) = &self.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }
        }
        Ok(url)
    }

    /// Trades the callback `code` for a workspace installation.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<Installation, OAuthError> {
        let endpoint = format!("{}/oauth.v2.access", self.api_base_url);
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
        ];
        if let Some(redirect_uri) = redirect_uri {
            form.push(("redirect_uri", redirect_uri));
        }

        let response = self
            .http
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|error| OAuthError::Request(error.to_string()))?;
        if !response.status().is_success() {
            return Err(OAuthError::Status(response.status().as_u16()));
        }

        let body = response
            .json::<AccessResponse>()
            .await
            .map_err(|error| OAuthError::Decode(error.to_string()))?;
        body.into_installation(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use ocbot_core::config::AppConfig;

    use super::{AccessResponse, OAuthError, SlackOAuthClient};

    fn client(redirect_uri: Option<&str>) -> SlackOAuthClient {
        let mut config = AppConfig::default().slack;
        config.client_id = "123.456".to_owned();
        config.client_secret = "shh".to_owned().into();
        config.redirect_uri = redirect_uri.map(str::to_owned);
        SlackOAuthClient::from_config(&config).expect("client")
    }

    #[test]
    fn authorize_url_carries_client_scope_and_state() {
        let url = client(Some("https://bot.example.test/oauth"))
            .authorize_url("st8")
            .expect("authorize url");

        assert_eq!(
            url.as_str(),
            "https://slack.com/oauth/v2/authorize?client_id=123.456&scope=commands&state=st8\
&redirect_uri=https%3A%2F%2Fbot.example.test%2Foauth"
        );
    }

    #[test]
    fn failed_exchange_surfaces_slack_error_code() {
        let response: AccessResponse =
            serde_json::from_value(json!({ "ok": false, "error": "invalid_code" }))
                .expect("decode");

        assert_eq!(
            response.into_installation(Utc::now()),
            Err(OAuthError::Rejected("invalid_code".to_owned()))
        );
    }

    #[test]
    fn legacy_team_fields_are_accepted() {
        let response: AccessResponse = serde_json::from_value(json!({
            "ok": true,
            "access_token": "xoxp-1",
            "scope": "commands",
            "team_id": "T9",
            "team_name": "Open Collective"
        }))
        .expect("decode");

        let installation = response.into_installation(Utc::now()).expect("installation");
        assert_eq!(installation.team_id.0, "T9");
        assert_eq!(installation.team_name.as_deref(), Some("Open Collective"));
        assert_eq!(installation.installed_by, None);
    }
}
