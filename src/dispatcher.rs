//! Concurrent fan-out of one inbound message to every registered matcher.
//!
//! A dispatch cycle runs each enabled matcher in its own task: the predicate
//! first, then `process` for the ones that matched. Panics are caught at the
//! branch boundary. Every branch is joined before any reply is sent, then
//! replies go out in branch completion order, followed by the post-dispatch
//! observers.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::MatcherError;
use crate::matcher::{HelpItem, Matcher, MatcherOutput};
use crate::platform::{escape_markdown, InboundMessage, OutboundMessage, OutboundTransport};

/// Side effect run after all matcher branches of a cycle have completed
#[async_trait]
pub trait MessageObserver: Send + Sync {
    async fn observe(&self, message: &InboundMessage) -> Result<()>;
}

/// The set of matchers known to the bot. Filled during start-up,
/// then handed to the dispatcher and never mutated again.
#[derive(Default)]
pub struct Registry {
    matchers: Vec<Arc<dyn Matcher>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, matcher: Arc<dyn Matcher>) {
        debug!(
            "Registering matcher {} (enabled: {})",
            matcher.identifier(),
            matcher.enabled()
        );
        self.matchers.push(matcher);
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// Help items of every enabled matcher, in registration order
    pub fn help_items(&self) -> Vec<HelpItem> {
        self.matchers
            .iter()
            .filter(|m| m.enabled())
            .flat_map(|m| m.help())
            .collect()
    }
}

/// Outcome counts of one dispatch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub matched: usize,
    pub replies: usize,
    pub failures: usize,
    pub send_errors: usize,
}

/// What a single matcher branch produced
struct BranchResult {
    identifier: String,
    matched: bool,
    output: MatcherOutput,
}

pub struct Dispatcher {
    matchers: Arc<[Arc<dyn Matcher>]>,
    transport: Arc<dyn OutboundTransport>,
    observers: Vec<Arc<dyn MessageObserver>>,
}

impl Dispatcher {
    pub fn new(registry: Registry, transport: Arc<dyn OutboundTransport>) -> Self {
        Self {
            matchers: registry.matchers.into(),
            transport,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn MessageObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Run one dispatch cycle for `message`
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchSummary {
        let span = info_span!(
            "dispatch",
            cycle = %Uuid::new_v4(),
            message_id = message.id,
        );
        self.run_cycle(Arc::new(message)).instrument(span).await
    }

    async fn run_cycle(&self, message: Arc<InboundMessage>) -> DispatchSummary {
        debug!(
            "Processing message from {}: {}",
            message.username, message.text
        );

        // Fan-out
        let mut branches = JoinSet::new();
        for matcher in self.matchers.iter().filter(|m| m.enabled()) {
            let matcher = Arc::clone(matcher);
            let message = Arc::clone(&message);
            branches.spawn(run_branch(matcher, message).in_current_span());
        }

        // Fan-in: nothing is sent before every branch has terminated
        let mut summary = DispatchSummary::default();
        let mut outgoing = Vec::new();
        while let Some(joined) = branches.join_next().await {
            let branch = match joined {
                Ok(branch) => branch,
                Err(e) => {
                    // Branches catch their own panics; only cancellation lands here
                    error!("Matcher task did not complete: {}", e);
                    summary.failures += 1;
                    continue;
                }
            };

            if !branch.matched {
                continue;
            }
            summary.matched += 1;

            outgoing.extend(branch.output.replies);
            if let Some(err) = branch.output.error {
                summary.failures += 1;
                outgoing.push(error_reply(&message, &branch.identifier, &err));
            }
        }

        // Emit
        for reply in &outgoing {
            summary.replies += 1;
            if let Err(e) = self.transport.send(reply).await {
                summary.send_errors += 1;
                error!("Error while sending message: {:#}", e);
            }
        }

        for observer in &self.observers {
            if let Err(e) = observer.observe(&message).await {
                warn!("Post-dispatch observer failed: {:#}", e);
            }
        }

        debug!(
            matched = summary.matched,
            replies = summary.replies,
            failures = summary.failures,
            "Dispatch cycle finished"
        );
        summary
    }
}

/// Evaluate one matcher against the message, converting a panic in either
/// the predicate or `process` into an error for that matcher only.
async fn run_branch(matcher: Arc<dyn Matcher>, message: Arc<InboundMessage>) -> BranchResult {
    let identifier = matcher.identifier().to_string();

    let matched = match std::panic::catch_unwind(AssertUnwindSafe(|| matcher.matches(&message))) {
        Ok(matched) => matched,
        Err(panic) => {
            let err = MatcherError::Panic(panic_message(panic.as_ref()));
            matcher.report_error(&message, &identifier, &err);
            return BranchResult {
                identifier,
                matched: true,
                output: MatcherOutput::failed(err),
            };
        }
    };

    if !matched {
        return BranchResult {
            identifier,
            matched: false,
            output: MatcherOutput::default(),
        };
    }

    let output = match AssertUnwindSafe(matcher.process(&message))
        .catch_unwind()
        .await
    {
        Ok(output) => output,
        Err(panic) => MatcherOutput::failed(MatcherError::Panic(panic_message(panic.as_ref()))),
    };

    if let Some(err) = &output.error {
        matcher.report_error(&message, &identifier, err);
    }

    BranchResult {
        identifier,
        matched: true,
        output,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn error_reply(message: &InboundMessage, identifier: &str, err: &MatcherError) -> OutboundMessage {
    OutboundMessage::markdown_reply(
        message,
        format!(
            "⚠️ *Error in matcher \"{}\"*\n\n{}",
            escape_markdown(identifier),
            escape_markdown(&err.to_string())
        ),
    )
}
