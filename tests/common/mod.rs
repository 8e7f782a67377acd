#![allow(dead_code)]

use gallery_feed::config::Config;
use gallery_feed::context::ServiceContext;
use gallery_feed::feed::store::FeedStore;
use gallery_feed::feed::types::GalleryItem;
use gallery_feed::feed::Presenter;
use gallery_feed::service::memory::MemoryDataService;
use gallery_feed::upload::memory::MemoryUploader;
use std::sync::Arc;

pub const COLLECTION: &str = "Gallery";

pub fn config(page_size: usize) -> Config {
    Config::parse(&format!(
        r#"
        [database]
        url = "https://example.firebaseio.com"
        collection = "{COLLECTION}"

        [feed]
        page_size = {page_size}

        [storage]
        upload_url = "https://bucket.example.com"
        public_url = "https://cdn.example.com"
        folder = "gallery/"
        "#
    ))
    .unwrap()
}

pub fn context(data: &MemoryDataService, uploader: &MemoryUploader, page_size: usize) -> ServiceContext {
    ServiceContext::new(Arc::new(data.clone()), Arc::new(uploader.clone()), config(page_size))
}

/// `n` items oldest first, paths `img-0 .. img-{n-1}`.
pub fn items(n: usize) -> Vec<GalleryItem> {
    (0..n)
        .map(|i| GalleryItem::new(&format!("Image {}", i), &[], &format!("img-{}", i), i as i64))
        .collect()
}

pub fn paths(items: &[GalleryItem]) -> Vec<String> {
    items.iter().map(|i| i.path.clone()).collect()
}

pub fn assert_unique_paths(items: &[GalleryItem]) {
    let mut seen = std::collections::HashSet::new();
    for item in items {
        assert!(seen.insert(item.path.clone()), "duplicate path {}", item.path);
    }
}

/// Records every layout request and progress tick.
#[derive(Default)]
pub struct RecordingPresenter {
    pub layouts: usize,
    pub last_items: Vec<String>,
    pub progress: Vec<u8>,
}

impl Presenter for RecordingPresenter {
    fn request_layout(&mut self, store: &FeedStore) {
        self.layouts += 1;
        self.last_items = paths(store.items());
    }

    fn upload_progress(&mut self, percent: u8) {
        self.progress.push(percent);
    }
}
