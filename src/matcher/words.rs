use async_trait::async_trait;

use super::{command_pattern, ranking_block, HelpItem, Matcher, MatcherBase, MatcherOutput};
use crate::platform::{InboundMessage, OutboundMessage};
use crate::store::stats::{StatsRepo, WordCount};

const IDENTIFIER: &str = "words";

/// `/words`: known users ordered by the number of words they wrote
pub struct WordsMatcher {
    base: MatcherBase,
    repo: StatsRepo,
}

impl WordsMatcher {
    pub fn new(repo: StatsRepo) -> Self {
        Self {
            base: MatcherBase::new(
                IDENTIFIER,
                command_pattern(r"(?i)^/(words)(@\w+)?($| )"),
                vec![HelpItem::new("words", "Shows who wrote how many words.")],
            ),
            repo,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.base = self.base.with_enabled(enabled);
        self
    }
}

fn format_word_counts(counts: &[WordCount]) -> String {
    ranking_block(counts.iter().map(|c| (c.words, c.username.as_str())), 6)
}

#[async_trait]
impl Matcher for WordsMatcher {
    fn identifier(&self) -> &str {
        self.base.identifier()
    }

    fn enabled(&self) -> bool {
        self.base.enabled()
    }

    fn help(&self) -> Vec<HelpItem> {
        self.base.help()
    }

    fn matches(&self, message: &InboundMessage) -> bool {
        self.base.does_match(message)
    }

    async fn process(&self, message: &InboundMessage) -> MatcherOutput {
        match self.repo.word_counts().await {
            Ok(counts) if counts.is_empty() => {
                MatcherOutput::ok(vec![OutboundMessage::reply(message, "No words counted yet.")])
            }
            Ok(counts) => MatcherOutput::ok(vec![OutboundMessage::markdown_reply(
                message,
                format_word_counts(&counts),
            )]),
            Err(e) => MatcherOutput::failed(e),
        }
    }
}
