use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use super::tokens::{self, Token};
use super::{command_pattern, Matcher, MatcherBase, MatcherOutput};
use crate::error::{MatcherError, StorageError};
use crate::platform::{escape_markdown, InboundMessage, OutboundMessage};
use crate::store::counters::CounterStore;

const IDENTIFIER: &str = "plusplus";

/// Counts `name++`, `name--`, `name+-` and `name—` in any message
pub struct PlusplusMatcher {
    base: MatcherBase,
    counters: Arc<CounterStore>,
}

impl PlusplusMatcher {
    pub fn new(counters: Arc<CounterStore>) -> Self {
        Self {
            // Cheap prefilter; the tokenizer has the final word
            base: MatcherBase::new(
                IDENTIFIER,
                command_pattern(r"(\+\+|--|\+-|-\+|—)[[:punct:]]*(\s|$)"),
                Vec::new(),
            ),
            counters,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.base = self.base.with_enabled(enabled);
        self
    }

    async fn process_token(
        &self,
        message: &InboundMessage,
        token: &Token,
    ) -> Result<OutboundMessage, StorageError> {
        let value = self.counters.increment(&token.name, token.increment).await?;
        Ok(make_reply(message, token, value))
    }
}

fn make_reply(message: &InboundMessage, token: &Token, value: i64) -> OutboundMessage {
    let mode = if token.increment > 0 {
        format!("+{}", token.increment)
    } else {
        token.increment.to_string()
    };

    OutboundMessage::markdown(
        message.chat_id,
        format!(
            "\\[{}\\] *{}* is now at *{}*",
            escape_markdown(&mode),
            escape_markdown(&token.label),
            escape_markdown(&value.to_string())
        ),
    )
}

#[async_trait]
impl Matcher for PlusplusMatcher {
    fn identifier(&self) -> &str {
        self.base.identifier()
    }

    fn enabled(&self) -> bool {
        self.base.enabled()
    }

    fn matches(&self, message: &InboundMessage) -> bool {
        self.base.does_match(message) && !tokens::inline_matches(&message.text).is_empty()
    }

    async fn process(&self, message: &InboundMessage) -> MatcherOutput {
        let matches = tokens::inline_matches(&message.text);
        let tokens = match tokens::parse_tokens(&matches) {
            Ok(tokens) => tokens,
            Err(e) => return MatcherOutput::failed(e),
        };

        // One concurrent increment per token; join_all keeps token order
        let results = join_all(
            tokens
                .iter()
                .map(|token| self.process_token(message, token)),
        )
        .await;

        let mut replies = Vec::with_capacity(results.len());
        let mut first_error: Option<MatcherError> = None;
        for result in results {
            match result {
                Ok(reply) => replies.push(reply),
                Err(e) if first_error.is_none() => first_error = Some(e.into()),
                Err(e) => self.report_error(message, IDENTIFIER, &e.into()),
            }
        }

        MatcherOutput::partial(replies, first_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{test_message, RenderMode};
    use crate::store::counters::testing::UnreachableCounters;
    use crate::store::counters::SqliteCounters;
    use crate::store::Store;

    fn matcher() -> (PlusplusMatcher, Arc<CounterStore>) {
        let store = Store::open_in_memory().unwrap();
        let counters = Arc::new(CounterStore::new(Arc::new(SqliteCounters::new(&store))));
        (PlusplusMatcher::new(counters.clone()), counters)
    }

    #[test]
    fn test_matches() {
        let (matcher, _) = matcher();
        assert!(matcher.matches(&test_message("coffee++")));
        assert!(matcher.matches(&test_message("I like tea— a lot")));
        assert!(matcher.matches(&test_message("c++ is hard")));
        assert!(!matcher.matches(&test_message("c++code is hard")));
        assert!(matcher.matches(&test_message("great coffee++! and tea--.")));
        assert!(matcher.matches(&test_message("foo+-, really")));
        assert!(!matcher.matches(&test_message("/top coffee++")));
        assert!(!matcher.matches(&test_message("---")));
        assert!(!matcher.matches(&test_message("nothing to count")));
    }

    #[tokio::test]
    async fn test_process_replies_in_first_seen_order() {
        let (matcher, counters) = matcher();
        counters.increment("tea", 3).await.unwrap();

        let output = matcher
            .process(&test_message("Tea-- coffee+++ tea--"))
            .await;

        assert!(output.error.is_none());
        let texts: Vec<&str> = output.replies.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                r"\[\-2\] *Tea* is now at *1*",
                r"\[\+2\] *coffee* is now at *2*"
            ]
        );
        assert!(output
            .replies
            .iter()
            .all(|r| r.render_mode == RenderMode::Markdown && r.chat_id == -1001));
    }

    #[tokio::test]
    async fn test_neutral_token_reports_current_value() {
        let (matcher, counters) = matcher();
        counters.increment("foo", 4).await.unwrap();

        let output = matcher.process(&test_message("foo+-")).await;

        assert_eq!(output.replies.len(), 1);
        assert_eq!(output.replies[0].text, r"\[0\] *foo* is now at *4*");
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported_as_error() {
        let counters = Arc::new(CounterStore::new(Arc::new(UnreachableCounters)));
        let matcher = PlusplusMatcher::new(counters);

        let output = matcher.process(&test_message("coffee++ tea--")).await;

        assert!(output.replies.is_empty());
        assert!(matches!(output.error, Some(MatcherError::Storage(_))));
    }
}
