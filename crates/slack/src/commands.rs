use std::fmt;

use thiserror::Error;
use tracing::{error, info};

use ocbot_core::directory::{DirectoryError, DirectoryService};
use ocbot_core::errors::ApplicationError;

use crate::blocks::{self, MessageTemplate};

/// The form Slack posts for a slash-command invocation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub token: String,
    pub team_id: String,
    pub team_domain: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    pub command: String,
    pub text: String,
    pub response_url: String,
    pub trigger_id: String,
}

impl fmt::Debug for SlashCommandPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlashCommandPayload")
            .field("token", &"<redacted>")
            .field("team_id", &self.team_id)
            .field("team_domain", &self.team_domain)
            .field("channel_id", &self.channel_id)
            .field("channel_name", &self.channel_name)
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .field("command", &self.command)
            .field("text", &self.text)
            .field("response_url", &self.response_url)
            .field("trigger_id", &self.trigger_id)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("slash command form is missing `{0}`")]
    MissingField(&'static str),
}

impl SlashCommandPayload {
    /// Parses an `application/x-www-form-urlencoded` body. Unknown keys are
    /// ignored; `command` and `response_url` must be present.
    pub fn from_form(body: &[u8]) -> Result<Self, CommandParseError> {
        let mut payload = Self::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            let slot = match key.as_ref() {
                "token" => &mut payload.token,
                "team_id" => &mut payload.team_id,
                "team_domain" => &mut payload.team_domain,
                "channel_id" => &mut payload.channel_id,
                "channel_name" => &mut payload.channel_name,
                "user_id" => &mut payload.user_id,
                "user_name" => &mut payload.user_name,
                "command" => &mut payload.command,
                "text" => &mut payload.text,
                "response_url" => &mut payload.response_url,
                "trigger_id" => &mut payload.trigger_id,
                _ => continue,
            };
            *slot = value.into_owned();
        }

        if payload.command.trim().is_empty() {
            return Err(CommandParseError::MissingField("command"));
        }
        if payload.response_url.trim().is_empty() {
            return Err(CommandParseError::MissingField("response_url"));
        }
        Ok(payload)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Echo { argument: String },
    OcEvents,
    OcUsage { argument: String },
    Mentees { language: String },
    Mentors { language: String },
    LanguageUsage { command: String },
    Unknown { command: String },
}

impl BotCommand {
    /// Exact match on the command name; the argument is the trimmed text.
    pub fn classify(command: &str, text: &str) -> Self {
        let argument = text.trim().to_owned();
        match command {
            "/echo" => Self::Echo { argument },
            "/oc" if argument == "events" => Self::OcEvents,
            "/oc" => Self::OcUsage { argument },
            "/mentees" | "/mentors" if argument.is_empty() => {
                Self::LanguageUsage { command: command.to_owned() }
            }
            "/mentees" => Self::Mentees { language: argument },
            "/mentors" => Self::Mentors { language: argument },
            _ => Self::Unknown { command: command.to_owned() },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Echo { .. } => "echo",
            Self::OcEvents => "oc_events",
            Self::OcUsage { .. } => "oc_usage",
            Self::Mentees { .. } => "mentees",
            Self::Mentors { .. } => "mentors",
            Self::LanguageUsage { .. } => "language_usage",
            Self::Unknown { .. } => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyVisibility {
    /// Visible to the whole channel (`in_channel`).
    Public,
    /// Visible to the invoking user only (`ephemeral`).
    Private,
}

impl ReplyVisibility {
    pub fn response_type(self) -> &'static str {
        match self {
            Self::Public => "in_channel",
            Self::Private => "ephemeral",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub visibility: ReplyVisibility,
    pub message: MessageTemplate,
}

impl Reply {
    pub fn public(message: MessageTemplate) -> Self {
        Self { visibility: ReplyVisibility::Public, message }
    }

    pub fn private(message: MessageTemplate) -> Self {
        Self { visibility: ReplyVisibility::Private, message }
    }

    pub fn text(&self) -> &str {
        &self.message.fallback_text
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("directory lookup for `{command}` failed: {source}")]
    Directory {
        command: &'static str,
        #[source]
        source: DirectoryError,
    },
}

pub struct CommandRouter<D> {
    directory: D,
}

impl<D> CommandRouter<D>
where
    D: DirectoryService,
{
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Replies for one invocation, in the order they must be posted.
    pub async fn route(&self, command: &BotCommand) -> Result<Vec<Reply>, CommandRouteError> {
        let reply = match command {
            BotCommand::Echo { argument } if argument.is_empty() || argument == "help" => {
                Reply::private(blocks::echo_usage_message())
            }
            BotCommand::Echo { argument } => Reply::private(blocks::echo_message(argument)),
            BotCommand::OcEvents => {
                let events = self
                    .directory
                    .events()
                    .await
                    .map_err(|source| CommandRouteError::Directory { command: "/oc", source })?;
                Reply::public(blocks::events_message(&events))
            }
            BotCommand::OcUsage { .. } => Reply::private(blocks::oc_usage_message()),
            BotCommand::Mentees { language } => {
                let handles = self.directory.mentees_for(language).await.map_err(|source| {
                    CommandRouteError::Directory { command: "/mentees", source }
                })?;
                Reply::public(blocks::mentees_message(language, &handles))
            }
            BotCommand::Mentors { language } => {
                let handles = self.directory.mentors_for(language).await.map_err(|source| {
                    CommandRouteError::Directory { command: "/mentors", source }
                })?;
                Reply::public(blocks::mentors_message(language, &handles))
            }
            BotCommand::LanguageUsage { command } => {
                Reply::private(blocks::language_usage_message(command))
            }
            BotCommand::Unknown { command } => {
                Reply::public(blocks::unknown_command_message(command))
            }
        };

        Ok(vec![reply])
    }

    /// Like [`route`](Self::route), but a failed lookup becomes one private
    /// "temporarily unavailable" reply.
    pub async fn replies_for(&self, command: &BotCommand, correlation_id: &str) -> Vec<Reply> {
        match self.route(command).await {
            Ok(replies) => {
                info!(
                    event_name = "slack.command.routed",
                    correlation_id,
                    command = command.name(),
                    replies = replies.len(),
                    "slash command routed"
                );
                replies
            }
            Err(CommandRouteError::Directory { command: name, source }) => {
                let interface = ApplicationError::from(source).into_interface(correlation_id);
                error!(
                    event_name = "slack.command.lookup_failed",
                    correlation_id,
                    command = name,
                    error = %interface,
                    "directory lookup failed"
                );
                vec![Reply::private(blocks::error_message(
                    interface.user_message(),
                    interface.correlation_id(),
                ))]
            }
        }
    }
}
