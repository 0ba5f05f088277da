pub mod help;
pub mod plusplus;
pub mod stats;
pub mod tokens;
pub mod topflop;
pub mod words;

use async_trait::async_trait;
use regex::Regex;
use tracing::error;

use crate::error::MatcherError;
use crate::platform::{escape_code, InboundMessage, OutboundMessage};

/// Usage documentation shown by `/help`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpItem {
    pub command: String,
    pub description: String,
    pub usage: String,
    pub example: String,
}

impl HelpItem {
    pub fn new(command: &str, description: &str) -> Self {
        Self {
            command: command.to_string(),
            description: description.to_string(),
            usage: String::new(),
            example: String::new(),
        }
    }

    pub fn with_usage(mut self, usage: &str, example: &str) -> Self {
        self.usage = usage.to_string();
        self.example = example.to_string();
        self
    }
}

/// Result of `Matcher::process`. Replies and error are independent:
/// a failing matcher may still have produced some replies.
#[derive(Debug, Default)]
pub struct MatcherOutput {
    pub replies: Vec<OutboundMessage>,
    pub error: Option<MatcherError>,
}

impl MatcherOutput {
    pub fn ok(replies: Vec<OutboundMessage>) -> Self {
        Self {
            replies,
            error: None,
        }
    }

    pub fn failed(error: impl Into<MatcherError>) -> Self {
        Self {
            replies: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn partial(replies: Vec<OutboundMessage>, error: Option<MatcherError>) -> Self {
        Self { replies, error }
    }
}

/// A unit of command matching and reply producing behavior.
#[async_trait]
pub trait Matcher: Send + Sync {
    fn identifier(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    fn help(&self) -> Vec<HelpItem> {
        Vec::new()
    }

    /// Pure predicate, no side effects.
    fn matches(&self, message: &InboundMessage) -> bool;

    /// The only place side effects may happen.
    async fn process(&self, message: &InboundMessage) -> MatcherOutput;

    /// Local diagnostics for a failed `process` call. Must not panic.
    fn report_error(&self, message: &InboundMessage, identifier: &str, err: &MatcherError) {
        error!(
            matcher = identifier,
            message_id = message.id,
            "Error in matcher {}: {}",
            identifier,
            err
        );
    }
}

/// Identifier, pattern, help and enabled flag shared by every matcher.
#[derive(Debug, Clone)]
pub struct MatcherBase {
    identifier: &'static str,
    pattern: Regex,
    help: Vec<HelpItem>,
    enabled: bool,
}

impl MatcherBase {
    pub fn new(identifier: &'static str, pattern: Regex, help: Vec<HelpItem>) -> Self {
        Self {
            identifier,
            pattern,
            help,
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn identifier(&self) -> &'static str {
        self.identifier
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn help(&self) -> Vec<HelpItem> {
        self.help.clone()
    }

    pub fn does_match(&self, message: &InboundMessage) -> bool {
        self.pattern.is_match(&message.text)
    }

    /// Capture groups of the first match, without group 0.
    /// Groups that did not participate are empty strings.
    pub fn command_match(&self, message: &InboundMessage) -> Option<Vec<String>> {
        let captures = self.pattern.captures(&message.text)?;
        Some(
            captures
                .iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}

/// Compile a command pattern of the form `^/(cmd)(@botname)?($| )...`
pub(crate) fn command_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid command pattern {pattern:?}: {e}"))
}

/// Code block with one `value | name` line per row, values right-aligned to `width`
pub(crate) fn ranking_block<'a>(
    rows: impl IntoIterator<Item = (i64, &'a str)>,
    width: usize,
) -> String {
    let lines: Vec<String> = rows
        .into_iter()
        .map(|(value, name)| format!("{:>width$} | {}", value, escape_code(name)))
        .collect();
    format!("```\n{}\n```", lines.join("\n"))
}
