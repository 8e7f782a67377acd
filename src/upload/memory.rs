use super::{SelectedFile, Uploader};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Keeps uploaded objects in memory under `{base}/{name}`. Used for offline
/// runs and tests.
#[derive(Clone, Default)]
pub struct MemoryUploader {
    base: String,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryUploader {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stored(&self, location: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Uploader for MemoryUploader {
    async fn upload(&self, file: &SelectedFile, progress: mpsc::UnboundedSender<u8>) -> Result<String> {
        let _ = progress.send(0);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        for percent in [25, 50, 75, 100] {
            tokio::task::yield_now().await;
            let _ = progress.send(percent);
        }
        let location = format!("{}/{}", self.base, file.name);
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.clone(), file.bytes.clone());
        Ok(location)
    }
}
