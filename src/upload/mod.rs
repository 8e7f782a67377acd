pub mod form;
pub mod http;
pub mod memory;

use crate::context::ServiceContext;
use crate::error::GalleryError;
use crate::feed::types::GalleryItem;
use crate::feed::Presenter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use form::UploadForm;
use std::path::Path;
use tokio::sync::mpsc;

/// Object storage the images go to.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Store `file` and return its public URI. Progress is reported on
    /// `progress` in percent, 0 through 100.
    async fn upload(&self, file: &SelectedFile, progress: mpsc::UnboundedSender<u8>) -> Result<String>;
}

/// An image picked by the user, held in memory until it is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: &str, mime: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            mime: mime.to_string(),
            bytes,
        }
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image file: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("not a file path: {}", path.display()))?;
        Ok(Self::new(&name, mime_for(path), bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Content type from the file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Validate the form, upload its image, then save the record. On success the
/// saved record is returned and the form is cleared; on failure the matching
/// flag is raised and the form keeps its input.
pub async fn submit(
    form: &mut UploadForm,
    ctx: &ServiceContext,
    presenter: &mut dyn Presenter,
) -> Result<GalleryItem, GalleryError> {
    form.validate()?;
    form.set_progress(0);

    let (uploaded, last_percent) = {
        let file = form
            .selected()
            .ok_or(GalleryError::Validation { field: "path" })?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let upload = ctx.uploader.upload(file, tx);
        tokio::pin!(upload);

        let mut last_percent = 0u8;
        let uploaded = loop {
            tokio::select! {
                result = &mut upload => break result,
                Some(percent) = rx.recv() => {
                    last_percent = percent;
                    presenter.upload_progress(percent);
                }
            }
        };
        while let Ok(percent) = rx.try_recv() {
            last_percent = percent;
            presenter.upload_progress(percent);
        }
        (uploaded, last_percent)
    };
    form.set_progress(last_percent);

    let path = match uploaded {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("image upload failed: {:#}", e);
            form.flag_upload_error();
            return Err(GalleryError::Upload(format!("{:#}", e)));
        }
    };

    let record = GalleryItem {
        title: form.title.trim().to_string(),
        tags: form.tags().to_vec(),
        path,
        date: chrono::Utc::now().timestamp_millis(),
    };

    match ctx.data.post(ctx.collection(), &record).await {
        Ok(key) => {
            tracing::info!(key = %key, path = %record.path, "gallery record saved");
            form.reset();
            Ok(record)
        }
        Err(e) => {
            // No rollback: the object stays in storage without a record.
            tracing::warn!(path = %record.path, "record save failed, uploaded object is orphaned: {:#}", e);
            form.flag_save_error();
            Err(GalleryError::Save(format!("{:#}", e)))
        }
    }
}
