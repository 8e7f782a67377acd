use super::debounce::Debouncer;
use super::store::FeedStore;
use super::types::GalleryItem;
use super::Presenter;
use crate::config::SearchConfig;
use crate::context::ServiceContext;
use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Query too short; the view is back on the baseline.
    Cleared,
    Matched(usize),
    /// Nothing to show. The view is left as it was.
    NoRecords,
}

/// Debounced title/tag filter over the gallery.
pub struct SearchFilter {
    debouncer: Debouncer<String>,
    min_len: usize,
    reuse_baseline: bool,
    evaluations: u64,
}

impl SearchFilter {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            debouncer: Debouncer::new(config.debounce()),
            min_len: config.min_query_len,
            reuse_baseline: config.reuse_baseline,
            evaluations: 0,
        }
    }

    /// Replace any scheduled evaluation with one for `text`.
    pub fn on_query_change(&mut self, text: impl Into<String>, store: &mut FeedStore) {
        store.set_loading(true);
        self.debouncer.schedule(text.into());
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Resolves with the query once its debounce window has passed.
    pub async fn due(&mut self) -> Option<String> {
        self.debouncer.fired().await
    }

    /// Evaluations run so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub async fn evaluate(
        &mut self,
        query: &str,
        ctx: &ServiceContext,
        store: &mut FeedStore,
        presenter: &mut dyn Presenter,
    ) -> Result<SearchOutcome> {
        self.evaluations += 1;

        if query.chars().count() < self.min_len {
            store.set_loading(false);
            store.set_no_records(false);
            store.restore_baseline();
            presenter.request_layout(store);
            return Ok(SearchOutcome::Cleared);
        }

        let candidates = if self.reuse_baseline {
            store.baseline().to_vec()
        } else {
            let fetched = ctx.data.fetch(ctx.collection(), None).await;
            match fetched {
                Ok(snapshot) => snapshot.newest_first(),
                Err(e) => {
                    store.set_loading(false);
                    return Err(e.context("search query failed"));
                }
            }
        };
        store.set_loading(false);

        let result = filter_items(&candidates, query);
        if result.is_empty() {
            store.set_no_records(true);
            presenter.request_layout(store);
            tracing::debug!(query, "search matched nothing");
            return Ok(SearchOutcome::NoRecords);
        }

        let count = result.len();
        store.set_no_records(false);
        store.publish_view(result);
        presenter.request_layout(store);
        tracing::debug!(query, count, "search view published");
        Ok(SearchOutcome::Matched(count))
    }
}

/// Items whose title or any tag contains `query`, ignoring case.
pub fn filter_items(items: &[GalleryItem], query: &str) -> Vec<GalleryItem> {
    let needle = query.to_lowercase();
    items
        .iter()
        .filter(|item| item.matches(&needle))
        .cloned()
        .collect()
}
