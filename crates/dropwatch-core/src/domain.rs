use chrono::{DateTime, Utc};

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Canonical catalog item, whatever upstream shape it was read from.
///
/// `handle` is the dedup key against the seen-set. It is only unique within a
/// collection, so two collections listing the same handle count as one item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub handle: String,
    pub title: String,
    pub image: Option<String>,
    pub price: Option<String>,
    pub url: String,
    pub collection: String,
    /// ISO-8601 creation time. Always `None` for items scraped from HTML.
    pub created_at: Option<String>,
}

impl Item {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }
}

/// `{base}/collections/{collection}/products/{handle}`
pub fn product_url(base_url: &str, collection: &str, handle: &str) -> String {
    format!(
        "{}/collections/{collection}/products/{handle}",
        base_url.trim_end_matches('/')
    )
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_url_ignores_trailing_slash_on_base() {
        assert_eq!(
            product_url("https://shop.example/", "lgb-limited-man", "coat-1"),
            "https://shop.example/collections/lgb-limited-man/products/coat-1"
        );
    }

    #[test]
    fn timestamps_with_offsets_compare_by_instant() {
        let tokyo = parse_timestamp("2026-01-10T09:00:00+09:00").unwrap();
        let utc = parse_timestamp("2026-01-10T00:30:00Z").unwrap();
        assert!(utc > tokyo);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
