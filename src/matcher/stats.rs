use async_trait::async_trait;

use super::{command_pattern, ranking_block, HelpItem, Matcher, MatcherBase, MatcherOutput};
use crate::platform::{InboundMessage, OutboundMessage};
use crate::store::stats::{StatsRepo, UserStats};

const IDENTIFIER: &str = "stats";

/// `/stats`: known users ordered by number of posts
pub struct StatsMatcher {
    base: MatcherBase,
    repo: StatsRepo,
}

impl StatsMatcher {
    pub fn new(repo: StatsRepo) -> Self {
        Self {
            base: MatcherBase::new(
                IDENTIFIER,
                command_pattern(r"(?i)^/(stats)(@\w+)?($| )"),
                vec![HelpItem::new("stats", "Shows who posted how much.")],
            ),
            repo,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.base = self.base.with_enabled(enabled);
        self
    }
}

fn format_users(users: &[UserStats]) -> String {
    ranking_block(users.iter().map(|u| (u.posts, u.username.as_str())), 6)
}

#[async_trait]
impl Matcher for StatsMatcher {
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
        match self.repo.top_users().await {
            Ok(users) if users.is_empty() => {
                MatcherOutput::ok(vec![OutboundMessage::reply(message, "No stats yet.")])
            }
            Ok(users) => MatcherOutput::ok(vec![OutboundMessage::markdown_reply(
                message,
                format_users(&users),
            )]),
            Err(e) => MatcherOutput::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::platform::test_message;
    use crate::store::Store;

    #[tokio::test]
    async fn test_stats_lists_users_by_posts() {
        let store = Store::open_in_memory().unwrap();
        let repo = StatsRepo::new(&store);
        let now = Utc::now();
        repo.record_post(1, "bob", now).await.unwrap();
        repo.record_post(2, "alice", now).await.unwrap();
        repo.record_post(2, "alice", now).await.unwrap();

        let matcher = StatsMatcher::new(repo);
        assert!(matcher.matches(&test_message("/stats")));
        assert!(!matcher.matches(&test_message("/statistics")));

        let output = matcher.process(&test_message("/stats")).await;
        assert!(output.error.is_none());
        assert_eq!(output.replies[0].text, "```\n     2 | alice\n     1 | bob\n```");
    }

    #[tokio::test]
    async fn test_stats_without_users() {
        let store = Store::open_in_memory().unwrap();
        let matcher = StatsMatcher::new(StatsRepo::new(&store));
        let output = matcher.process(&test_message("/stats")).await;
        assert_eq!(output.replies[0].text, "No stats yet.");
    }
}
