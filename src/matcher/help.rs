use async_trait::async_trait;

use super::{command_pattern, HelpItem, Matcher, MatcherBase, MatcherOutput};
use crate::platform::{escape_markdown, InboundMessage, OutboundMessage};

const IDENTIFIER: &str = "help";

/// `/help`: lists the commands of every other matcher
pub struct HelpMatcher {
    base: MatcherBase,
    items: Vec<HelpItem>,
}

impl HelpMatcher {
    /// `items` are collected from the registry before this matcher is added
    pub fn new(items: Vec<HelpItem>) -> Self {
        Self {
            base: MatcherBase::new(
                IDENTIFIER,
                command_pattern(r"(?i)^/(help)(@\w+)?($| )"),
                Vec::new(),
            ),
            items,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.base = self.base.with_enabled(enabled);
        self
    }

    fn render(&self) -> String {
        let mut text = String::from("*Available commands*\n");
        for item in &self.items {
            text.push_str(&format!(
                "\n/{} \\- {}",
                escape_markdown(&item.command),
                escape_markdown(&item.description)
            ));
            if !item.usage.is_empty() {
                text.push_str(&format!("\n  Usage: `{}`", item.usage.replace('`', "")));
            }
            if !item.example.is_empty() {
                text.push_str(&format!("\n  Example: `{}`", item.example.replace('`', "")));
            }
        }
        text
    }
}

#[async_trait]
impl Matcher for HelpMatcher {
    fn identifier(&self) -> &str {
        self.base.identifier()
    }

    fn enabled(&self) -> bool {
        self.base.enabled()
    }

    fn matches(&self, message: &InboundMessage) -> bool {
        self.base.does_match(message)
    }

    async fn process(&self, message: &InboundMessage) -> MatcherOutput {
        if self.items.is_empty() {
            return MatcherOutput::ok(vec![OutboundMessage::reply(
                message,
                "No commands available.",
            )]);
        }

        MatcherOutput::ok(vec![
            OutboundMessage::markdown_reply(message, self.render()).without_link_preview()
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test_message;

    #[tokio::test]
    async fn test_help_lists_items() {
        let matcher = HelpMatcher::new(vec![
            HelpItem::new("top", "Shows the top counters.").with_usage("/top <n>", "/top 5"),
            HelpItem::new("stats", "Shows who posted how much."),
        ]);
        assert!(matcher.matches(&test_message("/help")));
        assert!(matcher.matches(&test_message("/HELP@tallybot")));

        let output = matcher.process(&test_message("/help")).await;
        let reply = &output.replies[0];
        assert!(reply.suppress_link_preview);
        assert_eq!(
            reply.text,
            "*Available commands*\n\
             \n/top \\- Shows the top counters\\.\n  Usage: `/top <n>`\n  Example: `/top 5`\
             \n/stats \\- Shows who posted how much\\."
        );
    }

    #[tokio::test]
    async fn test_help_without_items() {
        let matcher = HelpMatcher::new(Vec::new());
        let output = matcher.process(&test_message("/help")).await;
        assert_eq!(output.replies[0].text, "No commands available.");
    }
}
