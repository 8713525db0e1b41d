//! Change detection: fetch every collection, diff against the seen-set.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    catalog::{CatalogFetcher, FetchSource, FetchStatus},
    domain::Item,
    store::{SeenSet, StateStore},
};

/// What happened to one collection during a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectionOutcome {
    Fetched {
        collection: String,
        via: FetchSource,
        fetched: usize,
        new: usize,
    },
    Failed {
        collection: String,
        reason: String,
    },
}

impl CollectionOutcome {
    pub fn collection(&self) -> &str {
        match self {
            Self::Fetched { collection, .. } | Self::Failed { collection, .. } => collection,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Detection {
    /// The seen-set was empty when the pass started.
    pub first_run: bool,
    /// Never-seen items in fetch order (collections in declared order).
    pub new_items: Vec<Item>,
    pub outcomes: Vec<CollectionOutcome>,
    /// Set when the end-of-pass save failed; the in-memory set is still updated.
    pub persist_error: Option<String>,
}

impl Detection {
    /// Collections that contributed nothing this pass, in declared order.
    pub fn failed_collections(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CollectionOutcome::Failed { .. }))
            .map(CollectionOutcome::collection)
            .collect()
    }
}

pub struct ChangeDetector {
    fetcher: Arc<CatalogFetcher>,
    store: Arc<dyn StateStore>,
}

impl ChangeDetector {
    pub fn new(fetcher: Arc<CatalogFetcher>, store: Arc<dyn StateStore>) -> Self {
        Self { fetcher, store }
    }

    pub fn collections(&self) -> &[String] {
        self.fetcher.collections()
    }

    /// One pass over every collection.
    ///
    /// New handles go into `seen` as soon as they are found, and the set is
    /// persisted once at the end. A collection that cannot be read contributes
    /// nothing this pass; the others still run.
    pub async fn detect(&self, seen: &mut SeenSet) -> Detection {
        let first_run = seen.is_empty();
        let mut new_items = Vec::new();
        let mut outcomes = Vec::with_capacity(self.collections().len());

        for collection in self.fetcher.collections() {
            match self.fetcher.fetch_all(collection).await {
                FetchStatus::Fetched { via, items } => {
                    let fetched = items.len();
                    let mut new = 0usize;
                    for item in items {
                        if seen.insert(&item.handle) {
                            new += 1;
                            new_items.push(item);
                        }
                    }
                    info!(collection = %collection, ?via, fetched, new, "collection checked");
                    outcomes.push(CollectionOutcome::Fetched {
                        collection: collection.clone(),
                        via,
                        fetched,
                        new,
                    });
                }
                FetchStatus::Failed { reason } => {
                    warn!(collection = %collection, %reason, "collection skipped this pass");
                    outcomes.push(CollectionOutcome::Failed {
                        collection: collection.clone(),
                        reason,
                    });
                }
            }
        }

        let persist_error = match seen.save(self.store.as_ref()) {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "failed to persist seen-set");
                Some(e.to_string())
            }
        };

        Detection {
            first_run,
            new_items,
            outcomes,
            persist_error,
        }
    }
}
