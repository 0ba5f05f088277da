use std::sync::Arc;

use async_trait::async_trait;

use super::{command_pattern, ranking_block, HelpItem, Matcher, MatcherBase, MatcherOutput};
use crate::platform::{InboundMessage, OutboundMessage};
use crate::store::counters::{Counter, CounterStore};

const IDENTIFIER: &str = "topflop";

/// `/top [n]` and `/flop [n]`: list the highest or lowest counters
pub struct TopFlopMatcher {
    base: MatcherBase,
    counters: Arc<CounterStore>,
    default_limit: usize,
    max_limit: usize,
}

impl TopFlopMatcher {
    pub fn new(counters: Arc<CounterStore>, default_limit: usize, max_limit: usize) -> Self {
        let help = vec![
            HelpItem::new("top", "Shows the most upvoted counters.")
                .with_usage("/top <optional: number of entries>", "/top 10"),
            HelpItem::new("flop", "Shows the most downvoted counters.")
                .with_usage("/flop <optional: number of entries>", "/flop 10"),
        ];

        Self {
            base: MatcherBase::new(
                IDENTIFIER,
                command_pattern(r"(?i)^/(top|flop)(@\w+)?($| )(\d+)?"),
                help,
            ),
            counters,
            default_limit,
            max_limit: max_limit.max(1),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.base = self.base.with_enabled(enabled);
        self
    }

    fn limit(&self, requested: &str) -> usize {
        requested
            .parse::<usize>()
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

fn format_counters(counters: &[Counter]) -> String {
    ranking_block(counters.iter().map(|c| (c.value, c.name.as_str())), 5)
}

#[async_trait]
impl Matcher for TopFlopMatcher {
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
        let Some(groups) = self.base.command_match(message) else {
            return MatcherOutput::failed(anyhow::anyhow!("message does not match"));
        };

        let limit = self.limit(&groups[3]);
        let result = if groups[0].eq_ignore_ascii_case("top") {
            self.counters.tops(limit).await
        } else {
            self.counters.flops(limit).await
        };

        match result {
            Ok(counters) if counters.is_empty() => MatcherOutput::ok(vec![OutboundMessage::reply(
                message,
                "No counters yet.",
            )]),
            Ok(counters) => MatcherOutput::ok(vec![OutboundMessage::markdown_reply(
                message,
                format_counters(&counters),
            )]),
            Err(e) => MatcherOutput::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test_message;
    use crate::store::counters::SqliteCounters;
    use crate::store::Store;

    async fn matcher() -> TopFlopMatcher {
        let store = Store::open_in_memory().unwrap();
        let counters = Arc::new(CounterStore::new(Arc::new(SqliteCounters::new(&store))));
        for (name, delta) in [("coffee", 12), ("tea", -3), ("c`d", 1)] {
            counters.increment(name, delta).await.unwrap();
        }
        TopFlopMatcher::new(counters, 10, 2)
    }

    #[tokio::test]
    async fn test_matches_commands_only() {
        let matcher = matcher().await;
        assert!(matcher.matches(&test_message("/top")));
        assert!(matcher.matches(&test_message("/flop@tallybot 3")));
        assert!(!matcher.matches(&test_message("top 3")));
        assert!(!matcher.matches(&test_message("/topics")));
    }

    #[tokio::test]
    async fn test_top_is_clamped_to_max_limit() {
        let matcher = matcher().await;
        let output = matcher.process(&test_message("/top 25")).await;

        assert!(output.error.is_none());
        assert_eq!(output.replies.len(), 1);
        assert_eq!(output.replies[0].reply_to_message_id, Some(42));
        assert_eq!(output.replies[0].text, "```\n   12 | coffee\n    1 | c\\`d\n```");
    }

    #[tokio::test]
    async fn test_flop_lists_lowest_first() {
        let matcher = matcher().await;
        let output = matcher.process(&test_message("/flop 1")).await;
        assert_eq!(output.replies[0].text, "```\n   -3 | tea\n```");
    }

    #[tokio::test]
    async fn test_empty_store_replies_plainly() {
        let store = Store::open_in_memory().unwrap();
        let counters = Arc::new(CounterStore::new(Arc::new(SqliteCounters::new(&store))));
        let matcher = TopFlopMatcher::new(counters, 10, 50);

        let output = matcher.process(&test_message("/top")).await;
        assert_eq!(output.replies[0].text, "No counters yet.");
    }

    #[test]
    fn test_limit_defaults_and_clamps() {
        let store = Store::open_in_memory().unwrap();
        let counters = Arc::new(CounterStore::new(Arc::new(SqliteCounters::new(&store))));
        let matcher = TopFlopMatcher::new(counters, 10, 50);
        assert_eq!(matcher.limit(""), 10);
        assert_eq!(matcher.limit("3"), 3);
        assert_eq!(matcher.limit("0"), 1);
        assert_eq!(matcher.limit("500"), 50);
    }
}
