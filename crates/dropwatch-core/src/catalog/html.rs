//! Best-effort collection page scraper, used when `products.json` is down.
//!
//! Lossy by nature: the handle and url are reliable, image and price are
//! picked from a bounded lookahead after each product link, and the title is a
//! heuristic (first capitalised text run) that may fall back to the handle.
//! Items parsed here never carry `created_at`.

use std::collections::HashSet;

use regex::Regex;

use crate::{
    domain::{product_url, Item},
    errors::Error,
    Result,
};

use super::normalize::absolute_url;

/// How far past a product link we look for its image and price.
const DETAIL_LOOKAHEAD: usize = 1000;
/// How far past a product link we look for its title.
const TITLE_LOOKAHEAD: usize = 500;
/// Size token every scraped image url is upgraded to.
const IMAGE_SIZE: &str = "_600x600.";

struct Patterns {
    anchor: Regex,
    image: Regex,
    image_size: Regex,
    price: Regex,
    title: Regex,
}

impl Patterns {
    fn new(collection: &str, price_symbol: &str) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Parse(format!("bad listing pattern: {e}")))
        };
        Ok(Self {
            anchor: compile(&format!(
                r#"<a[^>]*href="(/collections/{}/products/([^"]+))""#,
                regex::escape(collection)
            ))?,
            image: compile(r#"<img[^>]*src="((?:https?:)?//[^"]+/cdn/shop/[^"]+)""#)?,
            image_size: compile(r"_\d+x\d+(?:@2x)?\.")?,
            price: compile(&format!(
                r"{}\s*([0-9][0-9,]*(?:\.[0-9]+)?)",
                regex::escape(price_symbol)
            ))?,
            title: compile(r">\s*([A-Z][^<]{3,})<")?,
        })
    }
}

/// Extract product items from a collection page.
///
/// Links are deduplicated by handle (themes usually link each product twice:
/// image and title). `limit` caps the number of distinct items returned.
pub fn parse_listing(
    html: &str,
    collection: &str,
    base_url: &str,
    price_symbol: &str,
    limit: Option<usize>,
) -> Result<Vec<Item>> {
    let patterns = Patterns::new(collection, price_symbol)?;
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for caps in patterns.anchor.captures_iter(html) {
        if limit.is_some_and(|n| items.len() >= n) {
            break;
        }
        let (Some(whole), Some(raw_handle)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let handle = strip_query(raw_handle.as_str());
        if handle.is_empty() || !seen.insert(handle.to_string()) {
            continue;
        }

        let start = whole.end();
        let details = window(html, start, DETAIL_LOOKAHEAD);

        let image = patterns
            .image
            .captures(details)
            .and_then(|c| c.get(1))
            .map(|m| {
                let url = absolute_url(m.as_str());
                patterns.image_size.replace_all(&url, IMAGE_SIZE).into_owned()
            });

        let price = patterns
            .price
            .captures(details)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let title = patterns
            .title
            .captures(window(html, start, TITLE_LOOKAHEAD))
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| handle_to_title(handle));

        items.push(Item {
            handle: handle.to_string(),
            title,
            image,
            price,
            url: product_url(base_url, collection, handle),
            collection: collection.to_string(),
            created_at: None,
        });
    }

    Ok(items)
}

/// `wool-over-coat` → `WOOL OVER COAT`
pub fn handle_to_title(handle: &str) -> String {
    handle.replace('-', " ").to_uppercase()
}

fn strip_query(href_tail: &str) -> &str {
    href_tail
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .trim_end_matches('/')
}

/// `html[start..start + len]`, shortened to the nearest char boundary.
fn window(html: &str, start: usize, len: usize) -> &str {
    let mut end = start.saturating_add(len).min(html.len());
    while end > start && !html.is_char_boundary(end) {
        end -= 1;
    }
    &html[start..end]
}

fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://circusbymaniac.shop";
    const SLUG: &str = "lgb-limited-man";

    fn card(handle: &str, inner: &str) -> String {
        format!(
            r#"<div class="card"><a class="card__link" href="/collections/{SLUG}/products/{handle}">{inner}</a></div>"#
        )
    }

    #[test]
    fn extracts_handle_image_price_and_title() {
        let html = card(
            "leather-jacket",
            r#"<img src="//circusbymaniac.shop/cdn/shop/files/jacket_360x360@2x.jpg?v=1" alt="">
               <span class="title">LEATHER JACKET 01</span><span class="price">¥128,000</span>"#,
        );

        let items = parse_listing(&html, SLUG, BASE, "¥", None).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.handle, "leather-jacket");
        assert_eq!(item.title, "LEATHER JACKET 01");
        assert_eq!(
            item.image.as_deref(),
            Some("https://circusbymaniac.shop/cdn/shop/files/jacket_600x600.jpg?v=1")
        );
        assert_eq!(item.price.as_deref(), Some("128,000"));
        assert_eq!(
            item.url,
            "https://circusbymaniac.shop/collections/lgb-limited-man/products/leather-jacket"
        );
        assert!(item.created_at.is_none());
    }

    #[test]
    fn every_size_token_in_an_image_url_is_rewritten() {
        let html = card(
            "coat",
            r#"<img src="//circusbymaniac.shop/cdn/shop/files/coat_800x800.progressive_400x400.jpg"><span>Coat</span>"#,
        );

        let items = parse_listing(&html, SLUG, BASE, "¥", None).unwrap();
        assert_eq!(
            items[0].image.as_deref(),
            Some("https://circusbymaniac.shop/cdn/shop/files/coat_600x600.progressive_600x600.jpg")
        );
    }

    #[test]
    fn dedupes_repeated_links_and_ignores_other_collections() {
        let html = format!(
            "{}{}{}{}",
            card("a-one", "<span>Alpha One</span>"),
            card("a-one?variant=3", "<span>Alpha One</span>"),
            r#"<a href="/collections/other/products/zzz">Zed Product</a>"#,
            card("b-two", "<span>Beta Two</span>"),
        );
        let items = parse_listing(&html, SLUG, BASE, "¥", None).unwrap();
        let handles: Vec<_> = items.iter().map(|i| i.handle.as_str()).collect();
        assert_eq!(handles, vec!["a-one", "b-two"]);
    }

    #[test]
    fn title_falls_back_to_handle() {
        let html = card("mohair-knit-cardigan", r#"<span class="x">¥ 9,800</span>"#);
        let items = parse_listing(&html, SLUG, BASE, "¥", None).unwrap();
        assert_eq!(items[0].title, "MOHAIR KNIT CARDIGAN");
        assert_eq!(items[0].price.as_deref(), Some("9,800"));
        assert!(items[0].image.is_none());
    }

    #[test]
    fn limit_caps_distinct_items() {
        let html = (0..6)
            .map(|i| card(&format!("item-{i}"), "<span>Thing</span>"))
            .collect::<String>();
        let items = parse_listing(&html, SLUG, BASE, "¥", Some(4)).unwrap();
        assert_eq!(items.len(), 4);
    }

    #[test]
    fn lookahead_window_respects_utf8_boundaries() {
        let filler = "商品".repeat(400);
        let html = format!("{}{filler}", card("kanji", ""));
        let items = parse_listing(&html, SLUG, BASE, "¥", None).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn page_without_links_yields_nothing() {
        let items = parse_listing("<html><body>Closed</body></html>", SLUG, BASE, "¥", None).unwrap();
        assert!(items.is_empty());
    }
}
