//! Telegram adapter (teloxide).
//!
//! This crate implements the `dropwatch-core` MessagingPort and UpdateSource
//! over the Telegram Bot API.

use std::time::Duration;

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{InputFile, ParseMode, Update, UpdateKind},
};
use tracing::debug;

use dropwatch_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::{MessagingPort, UpdateSource},
        types::IncomingUpdate,
    },
    Result,
};

/// Bot whose HTTP client gives up after `timeout`.
///
/// Sends and long polls need different limits, so each gets its own bot.
pub fn build_bot(token: &str, timeout: Duration) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("telegram http client: {e}")))?;
    Ok(Bot::with_client(token, client))
}

fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .bot
            .send_message(tg_chat(chat_id), html.to_string())
            .parse_mode(ParseMode::Html)
            .await
            .map_err(map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo_url: &str,
        caption_html: &str,
    ) -> Result<MessageRef> {
        let url = reqwest::Url::parse(photo_url)
            .map_err(|e| Error::Parse(format!("photo url {photo_url}: {e}")))?;

        let msg = self
            .bot
            .send_photo(tg_chat(chat_id), InputFile::url(url))
            .caption(caption_html.to_string())
            .parse_mode(ParseMode::Html)
            .await
            .map_err(map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}

/// Long-poll reader for `getUpdates`.
#[derive(Clone)]
pub struct TelegramUpdates {
    bot: Bot,
}

impl TelegramUpdates {
    /// `bot` must have an HTTP timeout longer than any `wait` passed to
    /// [`UpdateSource::get_updates`].
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl UpdateSource for TelegramUpdates {
    async fn get_updates(&self, offset: i64, wait: Duration) -> Result<Vec<IncomingUpdate>> {
        let offset = i32::try_from(offset)
            .map_err(|_| Error::Parse(format!("update offset out of range: {offset}")))?;
        let wait_secs = u32::try_from(wait.as_secs()).unwrap_or(u32::MAX);

        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(wait_secs)
            .await
            .map_err(map_err)?;

        debug!(count = updates.len(), offset, "updates received");
        Ok(updates.into_iter().map(incoming).collect())
    }
}

fn incoming(update: Update) -> IncomingUpdate {
    let update_id = i64::from(update.id);
    match update.kind {
        UpdateKind::Message(msg) => IncomingUpdate {
            update_id,
            chat_id: Some(ChatId(msg.chat.id.0)),
            text: msg.text().map(str::to_string),
        },
        _ => IncomingUpdate {
            update_id,
            chat_id: None,
            text: None,
        },
    }
}
