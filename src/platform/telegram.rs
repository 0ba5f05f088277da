use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{LinkPreviewOptions, MessageId, ParseMode, ReplyParameters};
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::platform::{InboundMessage, OutboundMessage, OutboundTransport, RenderMode};

/// Sends outbound messages through the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl OutboundTransport for TelegramTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let mut request = self
            .bot
            .send_message(ChatId(message.chat_id), message.text.clone());

        if message.render_mode == RenderMode::Markdown {
            request = request.parse_mode(ParseMode::MarkdownV2);
        }

        if let Some(reply_to) = message.reply_to_message_id {
            let reply_to = i32::try_from(reply_to)
                .with_context(|| format!("Message id out of range: {}", reply_to))?;
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }

        if message.suppress_link_preview {
            request = request.link_preview_options(LinkPreviewOptions {
                is_disabled: true,
                url: None,
                prefer_small_media: false,
                prefer_large_media: false,
                show_above_text: false,
            });
        }

        request
            .await
            .with_context(|| format!("Failed to send message to chat {}", message.chat_id))?;
        Ok(())
    }
}

/// Convert a Telegram message into an inbound message.
/// Returns None for messages without text or caption.
fn to_inbound(msg: &Message) -> Option<InboundMessage> {
    let text = msg.text().or_else(|| msg.caption())?;

    let (user_id, username) = match msg.from.as_ref() {
        Some(user) => (
            i64::try_from(user.id.0).unwrap_or_default(),
            user.username
                .clone()
                .unwrap_or_else(|| user.first_name.clone()),
        ),
        None => (0, String::new()),
    };

    Some(InboundMessage {
        id: i64::from(msg.id.0),
        chat_id: msg.chat.id.0,
        user_id,
        username,
        text: text.to_string(),
        timestamp: msg.date,
    })
}

/// Run the Telegram long-polling loop, dispatching every message
/// from the configured chat.
pub async fn run(dispatcher: Arc<Dispatcher>, chat_id: i64, bot: Bot) -> Result<()> {
    info!("Starting Telegram platform for chat {}...", chat_id);

    let handler = Update::filter_message()
        .filter_map(move |msg: Message| {
            if msg.chat.id.0 == chat_id {
                Some(msg)
            } else {
                debug!(
                    "Ignoring message from chat {} (expected {})",
                    msg.chat.id.0, chat_id
                );
                None
            }
        })
        .endpoint(handle_message);

    teloxide::dispatching::Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        // Every update is independent; don't serialize per chat
        .distribution_function(|_| None::<Infallible>)
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(msg: Message, dispatcher: Arc<Dispatcher>) -> ResponseResult<()> {
    let Some(inbound) = to_inbound(&msg) else {
        debug!("Skipping message {} without text", msg.id.0);
        return Ok(());
    };

    let summary = dispatcher.dispatch(inbound).await;
    if summary.send_errors > 0 {
        warn!(
            "{} of {} replies to message {} could not be sent",
            summary.send_errors, summary.replies, msg.id.0
        );
    }

    Ok(())
}
