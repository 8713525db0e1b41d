//! Storefront adapter (reqwest).
//!
//! Implements the `dropwatch-core` CatalogSource over the public
//! `products.json` endpoint and the collection listing page.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use dropwatch_core::{
    catalog::{CatalogSource, Page, ProductsPage, RawProduct},
    config::Config,
    errors::Error,
    Result,
};

/// Some storefronts reject requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; dropwatch/0.1)";

#[derive(Clone, Debug)]
pub struct ShopifyCatalog {
    base_url: String,
    http: reqwest::Client,
}

impl ShopifyCatalog {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("catalog http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.store_base_url.clone(), cfg.catalog_timeout)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("catalog request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("catalog request failed: {status} {url}")));
        }

        resp.text()
            .await
            .map_err(|e| Error::Transport(format!("catalog body error: {e}")))
    }
}

#[async_trait]
impl CatalogSource for ShopifyCatalog {
    async fn fetch_products(&self, collection: &str, page: Page) -> Result<Vec<RawProduct>> {
        let url = products_url(&self.base_url, collection, page);
        debug!(%url, "fetching products page");
        let body = self.get_text(&url).await?;
        let parsed: ProductsPage = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("products.json for {collection}: {e}")))?;
        Ok(parsed.products)
    }

    async fn fetch_listing(&self, collection: &str) -> Result<String> {
        let url = listing_url(&self.base_url, collection);
        debug!(%url, "fetching listing page");
        self.get_text(&url).await
    }
}

pub fn products_url(base_url: &str, collection: &str, page: Page) -> String {
    let mut url = format!(
        "{base_url}/collections/{collection}/products.json?limit={}&page={}",
        page.limit, page.number
    );
    if let Some(sort) = page.sort.as_query() {
        url.push_str("&sort_by=");
        url.push_str(sort);
    }
    url
}

pub fn listing_url(base_url: &str, collection: &str) -> String {
    format!("{base_url}/collections/{collection}")
}
