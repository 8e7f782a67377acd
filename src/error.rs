use thiserror::Error;

/// User-facing failures of the upload form. Each one maps to a form flag and
/// is recovered locally: the user fixes the input and tries again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GalleryError {
    #[error("{field} is required")]
    Validation { field: &'static str },

    /// File too large, or the storage call failed.
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("unsupported image type: {0}")]
    ImageType(String),

    /// The object was stored but its record was not. The object is orphaned.
    #[error("failed to save record: {0}")]
    Save(String),
}
