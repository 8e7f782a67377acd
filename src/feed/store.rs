use super::types::GalleryItem;
use std::collections::HashSet;

/// In-memory feed state for one session.
///
/// `items` is the active view (possibly filtered), `baseline` the last full
/// snapshot. Both are newest first. Only the sync engine and the search
/// filter mutate the store; everyone else reads.
#[derive(Debug, Clone, Default)]
pub struct FeedStore {
    cursor: u32,
    items: Vec<GalleryItem>,
    baseline: Vec<GalleryItem>,
    no_records: bool,
    loading: bool,
    /// `items` holds a search result rather than the feed.
    filtered: bool,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages fetched so far.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn items(&self) -> &[GalleryItem] {
        &self.items
    }

    pub fn baseline(&self) -> &[GalleryItem] {
        &self.baseline
    }

    pub fn no_records(&self) -> bool {
        self.no_records
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub(crate) fn set_cursor(&mut self, cursor: u32) {
        self.cursor = cursor;
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub(crate) fn set_no_records(&mut self, no_records: bool) {
        self.no_records = no_records;
    }

    /// Replace both the view and the baseline with a fresh snapshot.
    pub(crate) fn replace(&mut self, fetched: Vec<GalleryItem>) {
        self.items = dedup_by_path(fetched.clone());
        self.baseline = fetched;
        self.filtered = false;
    }

    /// Append the items of `fetched` whose path is not yet in the view, in
    /// fetched order, then make `fetched` the new baseline. Returns the number
    /// of items added.
    ///
    /// While a search result is shown the result stays as it is: the new
    /// records count against the previous baseline and only the baseline
    /// moves, to be shown once the search is cleared.
    pub(crate) fn merge(&mut self, fetched: Vec<GalleryItem>) -> usize {
        if self.filtered {
            let known: HashSet<&str> = self.baseline.iter().map(|i| i.path.as_str()).collect();
            let added = dedup_by_path(fetched.clone())
                .iter()
                .filter(|item| !known.contains(item.path.as_str()))
                .count();
            self.baseline = fetched;
            return added;
        }
        let before = self.items.len();
        let mut combined = std::mem::take(&mut self.items);
        combined.extend(fetched.iter().cloned());
        self.items = dedup_by_path(combined);
        self.baseline = fetched;
        self.items.len().saturating_sub(before)
    }

    /// Show a search result without touching the baseline.
    pub(crate) fn publish_view(&mut self, view: Vec<GalleryItem>) {
        self.items = view;
        self.filtered = true;
    }

    pub(crate) fn restore_baseline(&mut self) {
        self.items = dedup_by_path(self.baseline.clone());
        self.filtered = false;
    }
}

/// Drop later entries whose path was already seen, keeping order.
fn dedup_by_path(items: Vec<GalleryItem>) -> Vec<GalleryItem> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.path.clone()))
        .collect()
}
