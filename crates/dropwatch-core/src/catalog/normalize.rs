//! Raw upstream records → canonical [`Item`].

use crate::domain::{product_url, Item};

use super::RawProduct;

/// Map one `products.json` record. Missing images / variants / timestamps
/// become `None`; the url is always derived from base + collection + handle.
pub fn normalize(raw: &RawProduct, collection: &str, base_url: &str) -> Item {
    let image = raw
        .images
        .first()
        .and_then(|img| non_blank(&img.src))
        .map(|src| absolute_url(&src));
    let price = raw
        .variants
        .first()
        .and_then(|v| v.price.as_deref())
        .and_then(non_blank);

    Item {
        handle: raw.handle.trim().to_string(),
        title: raw.title.trim().to_string(),
        image,
        price,
        url: product_url(base_url, collection, raw.handle.trim()),
        collection: collection.to_string(),
        created_at: raw.created_at.as_deref().and_then(non_blank),
    }
}

/// Normalize a whole page, dropping records without a handle (they cannot be
/// deduplicated or linked to).
pub fn normalize_all(raw: &[RawProduct], collection: &str, base_url: &str) -> Vec<Item> {
    raw.iter()
        .filter(|p| !p.handle.trim().is_empty())
        .map(|p| normalize(p, collection, base_url))
        .collect()
}

/// Protocol-relative CDN urls (`//cdn...`) get an explicit `https:`.
pub(crate) fn absolute_url(src: &str) -> String {
    if src.starts_with("//") {
        format!("https:{src}")
    } else {
        src.to_string()
    }
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
