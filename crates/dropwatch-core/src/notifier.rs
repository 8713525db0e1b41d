//! Notification dispatcher: item → caption → photo (or text) send.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::{
    domain::{ChatId, Item},
    formatting::{item_caption, CaptionStyle},
    messaging::{port::MessagingPort, types::Delivery},
};

#[derive(Clone)]
pub struct Notifier {
    messenger: Arc<dyn MessagingPort>,
    price_symbol: String,
}

impl Notifier {
    pub fn new(messenger: Arc<dyn MessagingPort>, price_symbol: impl Into<String>) -> Self {
        Self {
            messenger,
            price_symbol: price_symbol.into(),
        }
    }

    /// Plain HTML message. Never fails past this point; the outcome is returned.
    pub async fn send_text(&self, chat_id: ChatId, html: &str) -> Delivery {
        match self.messenger.send_html(chat_id, html).await {
            Ok(_) => Delivery::Text,
            Err(e) => {
                warn!(chat_id = chat_id.0, error = %e, "message send failed");
                Delivery::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Announce one item. With an image, a photo-with-caption is tried first
    /// and any failure there falls back to the same caption as text.
    pub async fn notify(&self, chat_id: ChatId, item: &Item, style: CaptionStyle) -> Delivery {
        let caption = item_caption(item, &self.price_symbol, style);

        let Some(image) = item.image.as_deref() else {
            return self.send_text(chat_id, &caption).await;
        };

        match self.messenger.send_photo(chat_id, image, &caption).await {
            Ok(_) => Delivery::Photo,
            Err(photo_err) => {
                warn!(handle = %item.handle, error = %photo_err, "photo send failed; sending text");
                match self.send_text(chat_id, &caption).await {
                    Delivery::Failed { reason } => Delivery::Failed { reason },
                    _ => Delivery::TextFallback {
                        photo_error: photo_err.to_string(),
                    },
                }
            }
        }
    }

    /// Announce items in order with a fixed pause between sends.
    pub async fn notify_paced(
        &self,
        chat_id: ChatId,
        items: &[Item],
        style: CaptionStyle,
        pause: Duration,
    ) -> Vec<Delivery> {
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 {
                sleep(pause).await;
            }
            out.push(self.notify(chat_id, item, style).await);
        }
        out
    }
}
