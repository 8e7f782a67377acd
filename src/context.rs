use crate::config::Config;
use crate::service::DataService;
use crate::upload::Uploader;
use std::sync::Arc;

/// Service handles shared by the sync engine, the search filter and the
/// upload pipeline. Built once per session and passed by reference.
#[derive(Clone)]
pub struct ServiceContext {
    pub data: Arc<dyn DataService>,
    pub uploader: Arc<dyn Uploader>,
    pub config: Config,
}

impl ServiceContext {
    pub fn new(data: Arc<dyn DataService>, uploader: Arc<dyn Uploader>, config: Config) -> Self {
        Self { data, uploader, config }
    }

    pub fn collection(&self) -> &str {
        &self.config.database.collection
    }

    pub fn page_size(&self) -> usize {
        self.config.feed.page_size
    }
}
