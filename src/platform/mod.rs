pub mod telegram;

use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;

/// A chat message delivered by the inbound transport.
/// Read-only for the whole dispatch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub username: String,
    /// Message text, or the caption for media messages
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Number of whitespace separated words in the text
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Plain,
    /// Telegram MarkdownV2; the text must already be escaped
    Markdown,
}

/// A reply produced by a matcher, forwarded unchanged to the outbound transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub reply_to_message_id: Option<i64>,
    pub text: String,
    pub render_mode: RenderMode,
    pub suppress_link_preview: bool,
}

impl OutboundMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            reply_to_message_id: None,
            text: text.into(),
            render_mode: RenderMode::Plain,
            suppress_link_preview: false,
        }
    }

    pub fn markdown(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            render_mode: RenderMode::Markdown,
            ..Self::text(chat_id, text)
        }
    }

    /// Plain reply addressed to `message`
    pub fn reply(message: &InboundMessage, text: impl Into<String>) -> Self {
        Self {
            reply_to_message_id: Some(message.id),
            ..Self::text(message.chat_id, text)
        }
    }

    /// Markdown reply addressed to `message`
    pub fn markdown_reply(message: &InboundMessage, text: impl Into<String>) -> Self {
        Self {
            reply_to_message_id: Some(message.id),
            ..Self::markdown(message.chat_id, text)
        }
    }

    pub fn without_link_preview(mut self) -> Self {
        self.suppress_link_preview = true;
        self
    }
}

/// Carries outbound messages to the chat network. A single best-effort send.
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}

static MARKDOWN_SPECIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_*\[\]()~`>#+\-=|{}.!\\]").expect("valid regex"));

/// Escape every MarkdownV2 special character
pub fn escape_markdown(text: &str) -> String {
    MARKDOWN_SPECIAL.replace_all(text, r"\$0").into_owned()
}

/// Escape text placed inside a ``` pre block
pub fn escape_code(text: &str) -> String {
    text.replace('\\', r"\\").replace('`', r"\`")
}

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use super::{OutboundMessage, OutboundTransport};

    /// Captures every message instead of sending it.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<OutboundMessage>>,
        fail_sends: bool,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// A transport whose every send fails after recording the attempt
        pub fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_sends: true,
            }
        }

        pub fn sent(&self) -> Vec<OutboundMessage> {
            self.sent.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent().into_iter().map(|m| m.text).collect()
        }
    }

    #[async_trait]
    impl OutboundTransport for RecordingTransport {
        async fn send(&self, message: &OutboundMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail_sends {
                bail!("network unreachable");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
pub fn test_message(text: &str) -> InboundMessage {
    InboundMessage {
        id: 42,
        chat_id: -1001,
        user_id: 7,
        username: "alice".to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
    }
}
