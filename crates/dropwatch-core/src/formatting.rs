//! Telegram HTML for product notifications and bot replies.

use std::time::Duration;

use crate::domain::Item;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Human-readable label for a collection slug. Unknown slugs pass through.
pub fn collection_label(slug: &str) -> &str {
    match slug {
        "ifsixwasnine-beyond-the-time-man" => "IF SIX WAS NINE / BEYOND THE TIME",
        "ifsixwasnine-limited-man" => "IF SIX WAS NINE / LIMITED",
        "lgb-beyond-the-time-man" => "L.G.B. / BEYOND THE TIME",
        "lgb-limited-man" => "L.G.B. / LIMITED",
        other => other,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptionStyle {
    /// A newly detected drop (🆕 marker).
    NewDrop,
    /// A plain listing entry (`/latest`).
    Listing,
}

/// Caption shared by photo and text deliveries.
pub fn item_caption(item: &Item, price_symbol: &str, style: CaptionStyle) -> String {
    let marker = match style {
        CaptionStyle::NewDrop => "🆕 ",
        CaptionStyle::Listing => "",
    };

    let mut out = format!("{marker}<b>{}</b>\n", escape_html(&item.title));
    if let Some(price) = &item.price {
        out.push_str(&format!(
            "💴 {}{}\n",
            escape_html(price_symbol),
            escape_html(price)
        ));
    }
    out.push_str(&format!(
        "📁 {}\n",
        escape_html(collection_label(&item.collection))
    ));
    out.push_str(&format!(
        "\n🔗 <a href=\"{}\">View product</a>",
        escape_html(&item.url)
    ));
    out
}

/// Sent once, after the silent indexing pass.
pub fn first_run_summary(collections: usize, indexed: usize) -> String {
    format!(
        "✅ Bot started! Monitoring {collections} collections.\n\
         📦 Indexed {indexed} existing products.\n\n\
         You'll get notified when something new drops.\n\
         Send /latest to see the most recent products, /day or /week for recent drops."
    )
}

pub fn usage_text(store_name: &str) -> String {
    format!(
        "👋 I monitor new products on {}.\n\n\
         /latest — most recent products\n\
         /day — products added today\n\
         /week — products added this week\n\
         /status — bot info\n\n\
         New drops are sent automatically.",
        escape_html(store_name)
    )
}

pub fn status_text(tracked: usize, collections: usize, interval: Duration) -> String {
    format!(
        "📊 Tracking {tracked} products across {collections} collections.\n\
         Checking every {}.",
        format_interval(interval)
    )
}

fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let mins = secs / 60;
        if mins == 1 {
            return "minute".to_string();
        }
        return format!("{mins} minutes");
    }
    format!("{secs} seconds")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: Option<&str>) -> Item {
        Item {
            handle: "coat".to_string(),
            title: "Coat <Black> & Co".to_string(),
            image: None,
            price: price.map(str::to_string),
            url: "https://shop.example/collections/lgb-limited-man/products/coat".to_string(),
            collection: "lgb-limited-man".to_string(),
            created_at: None,
        }
    }

    #[test]
    fn caption_has_title_price_label_and_link() {
        let caption = item_caption(&item(Some("48,000")), "¥", CaptionStyle::NewDrop);
        assert_eq!(
            caption,
            "🆕 <b>Coat &lt;Black&gt; &amp; Co</b>\n\
             💴 ¥48,000\n\
             📁 L.G.B. / LIMITED\n\
             \n🔗 <a href=\"https://shop.example/collections/lgb-limited-man/products/coat\">View product</a>"
        );
    }

    #[test]
    fn caption_omits_missing_price_and_marker_for_listings() {
        let caption = item_caption(&item(None), "¥", CaptionStyle::Listing);
        assert!(caption.starts_with("<b>"));
        assert!(!caption.contains("💴"));
    }

    #[test]
    fn unknown_collection_label_passes_through() {
        assert_eq!(collection_label("new-arrivals"), "new-arrivals");
        assert_eq!(collection_label("lgb-beyond-the-time-man"), "L.G.B. / BEYOND THE TIME");
    }

    #[test]
    fn status_reports_size_and_interval() {
        let txt = status_text(120, 4, Duration::from_secs(600));
        assert!(txt.contains("Tracking 120 products across 4 collections"));
        assert!(txt.contains("every 10 minutes"));
        assert!(status_text(0, 1, Duration::from_secs(45)).contains("every 45 seconds"));
    }

    #[test]
    fn summary_reports_indexed_count() {
        let txt = first_run_summary(4, 312);
        assert!(txt.contains("Monitoring 4 collections"));
        assert!(txt.contains("Indexed 312 existing products"));
    }
}
