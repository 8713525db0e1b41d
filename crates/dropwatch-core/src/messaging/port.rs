use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::IncomingUpdate,
    Result,
};

/// Outbound half of the messenger: HTML text and photo-with-caption sends.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// `photo_url` is fetched by the messenger itself, not uploaded by us.
    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo_url: &str,
        caption_html: &str,
    ) -> Result<MessageRef>;
}

/// Inbound half: an offset-based update queue (long-poll).
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Updates with id >= `offset`, oldest first, waiting up to `wait` for the
    /// first one to arrive.
    async fn get_updates(&self, offset: i64, wait: Duration) -> Result<Vec<IncomingUpdate>>;
}
