//! Storefront catalog: upstream port, record normalization, HTML fallback
//! parsing and the paginated fetch / query algorithms built on top.

pub mod fetcher;
pub mod html;
pub mod normalize;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::Result;

pub use fetcher::{CatalogFetcher, FetchSource, FetchStatus, RecentQuery};

/// Ordering requested from `products.json`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Whatever the collection's configured order is (newest first on the
    /// watched store).
    #[default]
    Collection,
    CreatedDescending,
}

impl SortOrder {
    pub fn as_query(self) -> Option<&'static str> {
        match self {
            Self::Collection => None,
            Self::CreatedDescending => Some("created-descending"),
        }
    }
}

/// One `products.json` page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    /// 1-based.
    pub number: u32,
    pub limit: usize,
    pub sort: SortOrder,
}

/// Body of `GET /collections/{slug}/products.json`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductsPage {
    #[serde(default)]
    pub products: Vec<RawProduct>,
}

/// Upstream product record. Every field is optional on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawProduct {
    #[serde(deserialize_with = "null_as_default")]
    pub handle: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub images: Vec<RawImage>,
    #[serde(deserialize_with = "null_as_default")]
    pub variants: Vec<RawVariant>,
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawImage {
    #[serde(deserialize_with = "null_as_default")]
    pub src: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawVariant {
    #[serde(deserialize_with = "string_or_number")]
    pub price: Option<String>,
}

fn null_as_default<'de, D, T>(de: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

fn string_or_number<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(de)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Hexagonal port for the storefront.
///
/// `fetch_products` is the structured JSON path; `fetch_listing` returns the raw
/// HTML of the collection page for the best-effort fallback parser.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_products(&self, collection: &str, page: Page) -> Result<Vec<RawProduct>>;

    async fn fetch_listing(&self, collection: &str) -> Result<String>;
}
