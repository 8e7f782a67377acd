use super::{DataService, Subscription};
use crate::feed::types::{FeedSnapshot, GalleryItem};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};

/// In-process data service with the same push semantics as the remote one.
/// Backs `--offline` runs and the test suite.
#[derive(Clone)]
pub struct MemoryDataService {
    state: Arc<Mutex<MemoryState>>,
    changes: broadcast::Sender<()>,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, FeedSnapshot>,
    seq: u64,
    failing: bool,
    subscribe_calls: usize,
}

impl Default for MemoryDataService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDataService {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            changes,
        }
    }

    /// Seed a collection, oldest item first.
    pub fn with_items(self, collection: &str, items: Vec<GalleryItem>) -> Self {
        for item in items {
            self.insert(collection, item);
        }
        self
    }

    /// Store an item under the next key and notify subscribers.
    pub fn insert(&self, collection: &str, item: GalleryItem) -> String {
        let key = {
            let mut state = self.lock();
            state.seq += 1;
            let key = format!("-{:016}", state.seq);
            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(key.clone(), item);
            key
        };
        // No receivers is fine.
        let _ = self.changes.send(());
        key
    }

    /// Make every subsequent call fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Number of live queries opened so far.
    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }

    /// Live queries whose reader is still running.
    pub fn live_queries(&self) -> usize {
        self.changes.receiver_count()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn window(state: &Mutex<MemoryState>, collection: &str, limit: Option<usize>) -> FeedSnapshot {
        let state = state.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = state.collections.get(collection).cloned().unwrap_or_default();
        match limit {
            Some(n) => snapshot.last(n),
            None => snapshot,
        }
    }
}

#[async_trait]
impl DataService for MemoryDataService {
    async fn subscribe(&self, collection: &str, limit_to_last: Option<usize>) -> Result<Subscription> {
        {
            let mut state = self.lock();
            if state.failing {
                anyhow::bail!("memory data service unavailable");
            }
            state.subscribe_calls += 1;
        }

        // Listen before reading so no change slips in between.
        let mut changes = self.changes.subscribe();
        let first = Self::window(&self.state, collection, limit_to_last);
        let state = self.state.clone();
        let collection = collection.to_string();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            if tx.send(first).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let snapshot = Self::window(&state, &collection, limit_to_last);
                        if tx.send(snapshot).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }

    async fn post(&self, collection: &str, record: &GalleryItem) -> Result<String> {
        if self.lock().failing {
            anyhow::bail!("memory data service unavailable");
        }
        Ok(self.insert(collection, record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str) -> GalleryItem {
        GalleryItem::new(path, &[], path, 0)
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_window_first() {
        let service = MemoryDataService::new()
            .with_items("Gallery", vec![item("a"), item("b"), item("c")]);
        let mut sub = service.subscribe("Gallery", Some(2)).await.unwrap();
        let snapshot = sub.next().await.unwrap();
        let paths: Vec<_> = snapshot.newest_first().into_iter().map(|i| i.path).collect();
        assert_eq!(paths, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_post_pushes_new_snapshot() {
        let service = MemoryDataService::new();
        let mut sub = service.subscribe("Gallery", None).await.unwrap();
        assert!(sub.next().await.unwrap().is_empty());

        service.post("Gallery", &item("new")).await.unwrap();
        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_mode_rejects_calls() {
        let service = MemoryDataService::new();
        service.set_failing(true);
        assert!(service.subscribe("Gallery", None).await.is_err());
        assert!(service.post("Gallery", &item("x")).await.is_err());
        service.set_failing(false);
        assert!(service.fetch("Gallery", None).await.unwrap().is_empty());
    }
}
