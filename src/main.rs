mod config;
mod dispatcher;
mod error;
mod matcher;
mod platform;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatcher::{Dispatcher, Registry};
use crate::matcher::help::HelpMatcher;
use crate::matcher::plusplus::PlusplusMatcher;
use crate::matcher::stats::StatsMatcher;
use crate::matcher::topflop::TopFlopMatcher;
use crate::matcher::words::WordsMatcher;
use crate::platform::telegram::{self, TelegramTransport};
use crate::store::counters::{CounterStore, SqliteCounters};
use crate::store::stats::{StatsRecorder, StatsRepo};
use crate::store::Store;

/// Register every matcher in dispatch order, honouring the `enabled` flags
fn build_registry(config: &Config, counters: Arc<CounterStore>, stats: StatsRepo) -> Registry {
    let mut registry = Registry::new();

    registry.register(Arc::new(
        PlusplusMatcher::new(counters.clone()).with_enabled(config.matcher_enabled("plusplus")),
    ));
    registry.register(Arc::new(
        TopFlopMatcher::new(
            counters,
            config.topflop.default_limit,
            config.topflop.max_limit,
        )
        .with_enabled(config.matcher_enabled("topflop")),
    ));
    registry.register(Arc::new(
        StatsMatcher::new(stats.clone()).with_enabled(config.matcher_enabled("stats")),
    ));
    registry.register(Arc::new(
        WordsMatcher::new(stats).with_enabled(config.matcher_enabled("words")),
    ));

    // Help lists everything registered so far
    let help = HelpMatcher::new(registry.help_items()).with_enabled(config.matcher_enabled("help"));
    registry.register(Arc::new(help));

    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tallybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Chat: {}", config.telegram.chat_id);
    info!("  Database: {}", config.database.path.display());

    let store = Store::open(&config.database.path)?;
    let counters = Arc::new(CounterStore::new(Arc::new(SqliteCounters::new(&store))));
    let stats = StatsRepo::new(&store);

    let registry = build_registry(&config, counters, stats.clone());
    info!("Registered {} matchers", registry.len());

    let bot = teloxide::Bot::new(&config.telegram.bot_token);
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let dispatcher = Arc::new(
        Dispatcher::new(registry, transport).with_observer(Arc::new(StatsRecorder::new(stats))),
    );

    info!("Bot is starting...");
    telegram::run(dispatcher, config.telegram.chat_id, bot).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_registry_respects_enabled_flags() {
        let config = Config::parse(
            "[telegram]\nbot_token = \"t\"\nchat_id = 1\n\n[matchers.stats]\nenabled = false\n",
        )
        .unwrap();
        let store = Store::open_in_memory().unwrap();
        let counters = Arc::new(CounterStore::new(Arc::new(SqliteCounters::new(&store))));

        let registry = build_registry(&config, counters, StatsRepo::new(&store));

        assert_eq!(registry.len(), 5);
        let commands: Vec<String> = registry
            .help_items()
            .into_iter()
            .map(|h| h.command)
            .collect();
        // Stats is disabled, help contributes no items of its own
        assert_eq!(commands, vec!["top", "flop", "words"]);
    }
}
