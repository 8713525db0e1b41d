//! Paginated catalog reads on top of a [`CatalogSource`].
//!
//! Three read shapes share the source:
//! - [`CatalogFetcher::fetch_all`]: drain every page of one collection (change
//!   detection), with a single HTML fallback when the JSON path is down.
//! - [`CatalogFetcher::recent`]: time-window query across all collections,
//!   newest-first, stopping a collection as soon as it walks out of the window.
//! - [`CatalogFetcher::latest`]: the N most recently created items overall.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration as WindowDuration, Utc};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    config::{Config, Pacing},
    domain::Item,
};

use super::{
    html::parse_listing,
    normalize::{normalize, normalize_all},
    CatalogSource, Page, SortOrder,
};

/// Largest page `products.json` serves.
pub const PAGE_SIZE: usize = 250;
/// Page size for time-window queries (they usually stop on page one).
pub const WINDOW_PAGE_SIZE: usize = 50;
/// Default number of items answered by the "latest" query.
pub const LATEST_COUNT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchSource {
    Json,
    Html,
}

/// Result of reading one collection. Failures are data, not errors: the caller
/// moves on to the next collection either way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchStatus {
    Fetched { via: FetchSource, items: Vec<Item> },
    Failed { reason: String },
}

impl FetchStatus {
    pub fn items(&self) -> &[Item] {
        match self {
            Self::Fetched { items, .. } => items,
            Self::Failed { .. } => &[],
        }
    }
}

/// Items answered by an on-demand query, plus the collections that could not
/// be read at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecentQuery {
    pub items: Vec<Item>,
    pub failed: Vec<String>,
    pub queried: usize,
}

impl RecentQuery {
    /// Every collection failed, so an empty answer means "unknown", not "none".
    pub fn is_unavailable(&self) -> bool {
        self.queried > 0 && self.failed.len() >= self.queried
    }
}

pub struct CatalogFetcher {
    source: Arc<dyn CatalogSource>,
    base_url: String,
    collections: Vec<String>,
    price_symbol: String,
    pacing: Pacing,
}

impl CatalogFetcher {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        base_url: impl Into<String>,
        collections: Vec<String>,
    ) -> Self {
        Self {
            source,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collections,
            price_symbol: "¥".to_string(),
            pacing: Pacing::default(),
        }
    }

    pub fn from_config(source: Arc<dyn CatalogSource>, cfg: &Config) -> Self {
        Self::new(source, cfg.store_base_url.clone(), cfg.collections.clone())
            .with_price_symbol(cfg.price_symbol.clone())
            .with_pacing(cfg.pacing)
    }

    pub fn with_price_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.price_symbol = symbol.into();
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Configured collection slugs, in declared order.
    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Drain every `products.json` page of `collection`.
    ///
    /// Paging continues while pages come back full and stops on a short page,
    /// an empty page or an error. If the very first page fails, the HTML
    /// listing is scraped instead (once); a later page failing keeps what was
    /// read so far.
    pub async fn fetch_all(&self, collection: &str) -> FetchStatus {
        let mut items = Vec::new();
        let mut number = 1u32;

        loop {
            let page = Page {
                number,
                limit: PAGE_SIZE,
                sort: SortOrder::Collection,
            };
            let raw = match self.source.fetch_products(collection, page).await {
                Ok(raw) => raw,
                Err(e) if number == 1 => {
                    warn!(collection, error = %e, "products.json failed; falling back to HTML listing");
                    return self.fetch_listing(collection, None).await;
                }
                Err(e) => {
                    warn!(collection, page = number, error = %e, "products.json page failed; keeping earlier pages");
                    break;
                }
            };

            let full = raw.len() >= PAGE_SIZE;
            items.extend(normalize_all(&raw, collection, &self.base_url));
            if !full {
                break;
            }

            number += 1;
            sleep(self.pacing.catalog_page).await;
        }

        debug!(collection, pages = number, items = items.len(), "catalog drained");
        FetchStatus::Fetched {
            via: FetchSource::Json,
            items,
        }
    }

    async fn fetch_listing(&self, collection: &str, limit: Option<usize>) -> FetchStatus {
        let html = match self.source.fetch_listing(collection).await {
            Ok(html) => html,
            Err(e) => {
                warn!(collection, error = %e, "HTML listing failed");
                return FetchStatus::Failed {
                    reason: e.to_string(),
                };
            }
        };

        match parse_listing(&html, collection, &self.base_url, &self.price_symbol, limit) {
            Ok(items) if items.is_empty() => FetchStatus::Failed {
                reason: "listing page contained no product links".to_string(),
            },
            Ok(items) => FetchStatus::Fetched {
                via: FetchSource::Html,
                items,
            },
            Err(e) => FetchStatus::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Items created within `window` of now, across all collections.
    pub async fn recent(&self, window: WindowDuration) -> RecentQuery {
        self.recent_since(Utc::now() - window).await
    }

    /// Items created at or after `cutoff`, newest first.
    ///
    /// Each collection is walked newest-first and abandoned as soon as a page
    /// contains an item older than the cutoff or comes back short. A handle is
    /// reported once even if several collections list it. Items without a
    /// timestamp cannot be placed in the window and are skipped.
    pub async fn recent_since(&self, cutoff: DateTime<Utc>) -> RecentQuery {
        let mut collected: HashSet<String> = HashSet::new();
        let mut items = Vec::new();
        let mut failed = Vec::new();

        for collection in &self.collections {
            let mut number = 1u32;
            loop {
                let page = Page {
                    number,
                    limit: WINDOW_PAGE_SIZE,
                    sort: SortOrder::Collection,
                };
                let raw = match self.source.fetch_products(collection, page).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(collection = %collection, page = number, error = %e, "window query page failed");
                        if number == 1 {
                            failed.push(collection.clone());
                        }
                        break;
                    }
                };
                if raw.is_empty() {
                    break;
                }

                let mut found_old = false;
                for product in &raw {
                    let handle = product.handle.trim();
                    if handle.is_empty() || collected.contains(handle) {
                        continue;
                    }
                    let item = normalize(product, collection, &self.base_url);
                    let Some(created) = item.created_at_utc() else {
                        continue;
                    };
                    if created < cutoff {
                        found_old = true;
                        continue;
                    }
                    collected.insert(item.handle.clone());
                    items.push(item);
                }

                if found_old || raw.len() < WINDOW_PAGE_SIZE {
                    break;
                }
                number += 1;
                sleep(self.pacing.query_page).await;
            }
        }

        sort_newest_first(&mut items);
        info!(
            items = items.len(),
            failed = failed.len(),
            %cutoff,
            "window query finished"
        );
        RecentQuery {
            items,
            failed,
            queried: self.collections.len(),
        }
    }

    /// The `count` most recently created items across all collections.
    ///
    /// One `created-descending` page per collection; a collection whose JSON
    /// path fails contributes its first `count` HTML listing items instead
    /// (undated, so they sort last).
    pub async fn latest(&self, count: usize) -> RecentQuery {
        let mut items: Vec<Item> = Vec::new();
        let mut failed = Vec::new();

        for (idx, collection) in self.collections.iter().enumerate() {
            if idx > 0 {
                sleep(self.pacing.query_page).await;
            }

            let page = Page {
                number: 1,
                limit: count,
                sort: SortOrder::CreatedDescending,
            };
            match self.source.fetch_products(collection, page).await {
                Ok(raw) => items.extend(normalize_all(&raw, collection, &self.base_url)),
                Err(e) => {
                    warn!(collection = %collection, error = %e, "latest query failed; trying HTML listing");
                    match self.fetch_listing(collection, Some(count)).await {
                        FetchStatus::Fetched { items: scraped, .. } => items.extend(scraped),
                        FetchStatus::Failed { .. } => failed.push(collection.clone()),
                    }
                }
            }
        }

        let mut handles = HashSet::new();
        items.retain(|item| handles.insert(item.handle.clone()));
        sort_newest_first(&mut items);
        items.truncate(count);

        RecentQuery {
            items,
            failed,
            queried: self.collections.len(),
        }
    }
}

/// Newest first by parsed instant; undated items keep their relative order at
/// the end.
fn sort_newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| b.created_at_utc().cmp(&a.created_at_utc()));
}
