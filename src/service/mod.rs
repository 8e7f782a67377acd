pub mod memory;
pub mod rest;
pub mod sse;

use crate::feed::types::{FeedSnapshot, GalleryItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Realtime database the gallery reads from and writes to.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Open a live query on `collection`, optionally limited to the last
    /// `limit_to_last` entries by key. The current snapshot is delivered
    /// first, then a fresh one after every remote change.
    async fn subscribe(&self, collection: &str, limit_to_last: Option<usize>) -> Result<Subscription>;

    /// Append a record and return its server-assigned key.
    async fn post(&self, collection: &str, record: &GalleryItem) -> Result<String>;

    /// How long a caller waits for the first snapshot of a new query.
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// One-shot read: subscribe, take the first snapshot, unsubscribe.
    async fn fetch(&self, collection: &str, limit_to_last: Option<usize>) -> Result<FeedSnapshot> {
        let mut subscription = self.subscribe(collection, limit_to_last).await?;
        let snapshot = subscription
            .first(self.request_timeout())
            .await
            .with_context(|| format!("no snapshot of {}", collection))?;
        subscription.unsubscribe();
        Ok(snapshot)
    }
}

/// Handle to a live query. Dropping it (or calling `unsubscribe`) stops the
/// background reader.
pub struct Subscription {
    rx: mpsc::Receiver<FeedSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<FeedSnapshot>, task: JoinHandle<()>) -> Self {
        Self { rx, task: Some(task) }
    }

    /// Next pushed snapshot, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<FeedSnapshot> {
        self.rx.recv().await
    }

    /// First snapshot of a freshly opened query, bounded by `limit`.
    pub async fn first(&mut self, limit: Duration) -> Result<FeedSnapshot> {
        match tokio::time::timeout(limit, self.rx.recv()).await {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => anyhow::bail!("live query ended before delivering a snapshot"),
            Err(_) => anyhow::bail!("no snapshot within {}ms", limit.as_millis()),
        }
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
