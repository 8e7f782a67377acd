use super::store::FeedStore;
use super::types::FeedSnapshot;
use super::Presenter;
use crate::context::ServiceContext;
use crate::service::Subscription;
use anyhow::{Context, Result};

/// How snapshots of a live query are folded into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyMode {
    Replace,
    Merge,
}

struct LiveQuery {
    subscription: Subscription,
    mode: ApplyMode,
    pages: u32,
}

/// Result of folding one snapshot into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Replaced { total: usize },
    Merged { added: usize },
    /// The snapshot had no records; items and cursor were left alone.
    Empty,
}

/// Keeps the feed store in step with the data service. Owns at most one live
/// query; opening a new page unsubscribes the previous one.
#[derive(Default)]
pub struct SyncEngine {
    live: Option<LiveQuery>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// First page: replaces items and baseline with the newest `page_size`
    /// records. Later pushes on the same query replace again.
    pub async fn load_initial(
        &mut self,
        ctx: &ServiceContext,
        store: &mut FeedStore,
        presenter: &mut dyn Presenter,
    ) -> Result<SyncOutcome> {
        store.set_loading(true);
        let (subscription, snapshot) = match open_page(ctx, 1).await {
            Ok(opened) => opened,
            Err(e) => {
                store.set_loading(false);
                return Err(e);
            }
        };
        let live = self.live.insert(LiveQuery {
            subscription,
            mode: ApplyMode::Replace,
            pages: 1,
        });
        let outcome = apply(live, snapshot, store, presenter);
        tracing::info!(outcome = ?outcome, "initial page loaded");
        Ok(outcome)
    }

    /// Next page: asks for one more page worth of records and appends the
    /// ones not already shown. On error nothing changes.
    pub async fn load_more(
        &mut self,
        ctx: &ServiceContext,
        store: &mut FeedStore,
        presenter: &mut dyn Presenter,
    ) -> Result<SyncOutcome> {
        let pages = store.cursor() + 1;
        let (subscription, snapshot) = open_page(ctx, pages).await?;
        let live = self.live.insert(LiveQuery {
            subscription,
            mode: ApplyMode::Merge,
            pages,
        });
        let outcome = apply(live, snapshot, store, presenter);
        tracing::debug!(pages, outcome = ?outcome, "page merged");
        Ok(outcome)
    }

    /// Wait for the live query to push a new snapshot. `None` when there is no
    /// live query or its stream has ended.
    pub async fn next_push(&mut self) -> Option<FeedSnapshot> {
        let live = self.live.as_mut()?;
        let snapshot = live.subscription.next().await;
        if snapshot.is_none() {
            tracing::warn!(pages = live.pages, "live query ended");
            self.live = None;
        }
        snapshot
    }

    /// Fold a pushed snapshot in the mode of the query that produced it.
    pub fn apply_push(
        &mut self,
        snapshot: FeedSnapshot,
        store: &mut FeedStore,
        presenter: &mut dyn Presenter,
    ) -> Option<SyncOutcome> {
        let live = self.live.as_ref()?;
        Some(apply(live, snapshot, store, presenter))
    }

    pub fn close(&mut self) {
        if let Some(live) = self.live.take() {
            live.subscription.unsubscribe();
        }
    }
}

async fn open_page(ctx: &ServiceContext, pages: u32) -> Result<(Subscription, FeedSnapshot)> {
    let limit = pages as usize * ctx.page_size();
    let mut subscription = ctx
        .data
        .subscribe(ctx.collection(), Some(limit))
        .await
        .with_context(|| format!("failed to query last {} records", limit))?;
    let snapshot = subscription
        .first(ctx.config.database.request_timeout())
        .await
        .with_context(|| format!("first page of {} records", limit))?;
    Ok((subscription, snapshot))
}

fn apply(
    live: &LiveQuery,
    snapshot: FeedSnapshot,
    store: &mut FeedStore,
    presenter: &mut dyn Presenter,
) -> SyncOutcome {
    store.set_loading(false);
    if snapshot.is_empty() {
        store.set_no_records(true);
        presenter.request_layout(store);
        return SyncOutcome::Empty;
    }
    store.set_no_records(false);
    store.set_cursor(live.pages);

    let fetched = snapshot.newest_first();
    let outcome = match live.mode {
        ApplyMode::Replace => {
            let total = fetched.len();
            store.replace(fetched);
            SyncOutcome::Replaced { total }
        }
        ApplyMode::Merge => SyncOutcome::Merged {
            added: store.merge(fetched),
        },
    };
    presenter.request_layout(store);
    outcome
}
