use crate::context::ServiceContext;
use crate::error::GalleryError;
use crate::feed::search::{SearchFilter, SearchOutcome};
use crate::feed::store::FeedStore;
use crate::feed::sync::{SyncEngine, SyncOutcome};
use crate::feed::types::GalleryItem;
use crate::feed::Presenter;
use crate::upload::form::UploadForm;
use crate::upload::{self, SelectedFile};
use anyhow::Result;
use tokio::sync::mpsc;

/// Everything the presentation layer can ask of a session.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// The user scrolled close to the end of the feed.
    NearScrollEnd,
    QueryChanged(String),
    Upload(UploadRequest),
    Quit,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: SelectedFile,
    pub title: String,
    pub tags: Vec<String>,
}

/// One gallery view: the store, the components that mutate it and the
/// presenter that shows it. Runs on a single task; the store is never shared.
pub struct GallerySession<P: Presenter> {
    ctx: ServiceContext,
    store: FeedStore,
    engine: SyncEngine,
    search: SearchFilter,
    form: UploadForm,
    presenter: P,
}

impl<P: Presenter> GallerySession<P> {
    pub fn new(ctx: ServiceContext, presenter: P) -> Self {
        let search = SearchFilter::new(&ctx.config.search);
        let form = UploadForm::new(&ctx.config.storage);
        Self {
            ctx,
            store: FeedStore::new(),
            engine: SyncEngine::new(),
            search,
            form,
            presenter,
        }
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn form(&self) -> &UploadForm {
        &self.form
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn search(&self) -> &SearchFilter {
        &self.search
    }

    /// Load the first page. Failures are logged; the session stays usable.
    pub async fn start(&mut self) -> Option<SyncOutcome> {
        match self
            .engine
            .load_initial(&self.ctx, &mut self.store, &mut self.presenter)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!("initial load failed: {:#}", e);
                None
            }
        }
    }

    pub async fn load_more(&mut self) -> Option<SyncOutcome> {
        match self
            .engine
            .load_more(&self.ctx, &mut self.store, &mut self.presenter)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(cursor = self.store.cursor(), "load more failed: {:#}", e);
                None
            }
        }
    }

    pub fn query_changed(&mut self, text: impl Into<String>) {
        self.search.on_query_change(text, &mut self.store);
    }

    /// Run the evaluation whose debounce window has just passed.
    pub async fn run_search(&mut self, query: &str) -> Option<SearchOutcome> {
        match self
            .search
            .evaluate(query, &self.ctx, &mut self.store, &mut self.presenter)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(query, "search failed: {:#}", e);
                None
            }
        }
    }

    pub async fn upload(&mut self, request: UploadRequest) -> Result<GalleryItem, GalleryError> {
        self.form.open();
        self.form.title = request.title;
        for tag in request.tags {
            self.form.current_tag = tag;
            self.form.add_hashtag();
        }
        self.form.select_file(request.file)?;
        upload::submit(&mut self.form, &self.ctx, &mut self.presenter).await
    }

    /// Drive the session from `events` until `Quit` or the sender goes away.
    pub async fn run(mut self, mut events: mpsc::Receiver<UiEvent>) -> Result<()> {
        self.start().await;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    None | Some(UiEvent::Quit) => break,
                    Some(UiEvent::NearScrollEnd) => {
                        self.load_more().await;
                    }
                    Some(UiEvent::QueryChanged(text)) => self.query_changed(text),
                    Some(UiEvent::Upload(request)) => {
                        if let Err(e) = self.upload(request).await {
                            tracing::warn!("upload rejected: {}", e);
                        }
                    }
                },
                Some(query) = self.search.due(), if self.search.is_pending() => {
                    self.run_search(&query).await;
                }
                Some(snapshot) = self.engine.next_push(), if self.engine.is_live() => {
                    self.engine.apply_push(snapshot, &mut self.store, &mut self.presenter);
                }
            }
        }

        self.engine.close();
        tracing::info!("session closed");
        Ok(())
    }
}
