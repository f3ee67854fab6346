use serde::Serialize;

use ocbot_core::directory::EventListing;

/// Slack rejects section text longer than this.
pub const SECTION_TEXT_LIMIT: usize = 3000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    fn len(&self) -> usize {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text.chars().count(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    /// Drops every block when any section exceeds Slack's limit; the
    /// fallback text then carries the whole message.
    pub fn build(self) -> MessageTemplate {
        let oversized = self.blocks.iter().any(|block| match block {
            Block::Section { text, .. } => text.len() > SECTION_TEXT_LIMIT,
            Block::Context { .. } => false,
        });
        let blocks = if oversized { Vec::new() } else { self.blocks };
        MessageTemplate { fallback_text: self.fallback_text, blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub const ECHO_USAGE: &str = "I echo back what you tell me. Try typing `/echo hello` to see.";
pub const OC_USAGE: &str = "Try `/oc events` to list upcoming OC events.";

fn mrkdwn_message(block_id: &str, text: String) -> MessageTemplate {
    MessageBuilder::new(text.clone())
        .section(block_id, |section| {
            section.mrkdwn(text);
        })
        .build()
}

pub fn echo_usage_message() -> MessageTemplate {
    mrkdwn_message("echo.usage.v1", ECHO_USAGE.to_owned())
}

/// User text is echoed as plain text so it cannot pick up formatting.
pub fn echo_message(argument: &str) -> MessageTemplate {
    MessageBuilder::new(argument.to_owned())
        .section("echo.reply.v1", |section| {
            section.plain(argument);
        })
        .build()
}

pub fn oc_usage_message() -> MessageTemplate {
    mrkdwn_message("oc.usage.v1", OC_USAGE.to_owned())
}

pub fn events_message(events: &[EventListing]) -> MessageTemplate {
    let lines = events.iter().map(EventListing::line).collect::<Vec<_>>();
    mrkdwn_message("oc.events.v1", format!("*OC Events:*\n{}", lines.join("\n\n")))
}

pub fn mentees_message(language: &str, handles: &[String]) -> MessageTemplate {
    mrkdwn_message(
        "mentees.list.v1",
        format!("*Mentees requesting {language}:*\n{}", mention_lines(handles)),
    )
}

pub fn mentors_message(language: &str, handles: &[String]) -> MessageTemplate {
    mrkdwn_message(
        "mentors.list.v1",
        format!("*Mentors for {language}:*\n{}", mention_lines(handles)),
    )
}

pub fn language_usage_message(command: &str) -> MessageTemplate {
    mrkdwn_message(
        "language.usage.v1",
        format!("Tell me which language to look up, for example `{command} Rust`."),
    )
}

pub fn unknown_command_message(command: &str) -> MessageTemplate {
    mrkdwn_message("command.unknown.v1", format!("I'm afraid I don't know how to {command} yet."))
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("command.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("command.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

fn mention_lines(handles: &[String]) -> String {
    handles.iter().map(|handle| format!("@{handle}")).collect::<Vec<_>>().join("\n")
}
