use super::SelectedFile;
use crate::config::StorageConfig;
use crate::error::GalleryError;

/// Error flags shown next to the form fields.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormFlags {
    pub tag_error: bool,
    pub title_error: bool,
    pub path_error: bool,
    pub save_error: bool,
    pub upload_error: bool,
    pub image_type_error: bool,
}

/// State of the "add image" form: title, hashtags, the chosen file and the
/// flags raised while filling it in.
#[derive(Debug)]
pub struct UploadForm {
    pub title: String,
    pub current_tag: String,
    tags: Vec<String>,
    selected: Option<SelectedFile>,
    preview: Option<String>,
    progress: Option<u8>,
    flags: FormFlags,
    max_file_bytes: u64,
    allowed_types: Vec<String>,
}

impl UploadForm {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            title: String::new(),
            current_tag: String::new(),
            tags: Vec::new(),
            selected: None,
            preview: None,
            progress: None,
            flags: FormFlags::default(),
            max_file_bytes: config.max_file_bytes,
            allowed_types: config.allowed_types.clone(),
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    /// `data:` URL of the selected image, for previews.
    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    pub fn flags(&self) -> &FormFlags {
        &self.flags
    }

    /// Move `current_tag` into the tag list. Blank input is ignored; a tag
    /// already in the list raises `tag_error` and stays in the input.
    pub fn add_hashtag(&mut self) -> bool {
        let tag = self.current_tag.trim().to_string();
        if tag.is_empty() {
            return false;
        }
        if self.tags.contains(&tag) {
            self.flags.tag_error = true;
            return false;
        }
        self.tags.push(tag);
        self.current_tag.clear();
        self.flags.tag_error = false;
        true
    }

    pub fn remove_hashtag(&mut self, tag: &str) {
        if let Some(index) = self.tags.iter().position(|t| t == tag) {
            self.tags.remove(index);
        }
    }

    /// Size is checked before type, matching the order the flags are shown in.
    pub fn select_file(&mut self, file: SelectedFile) -> Result<(), GalleryError> {
        if file.size() > self.max_file_bytes {
            self.flags.upload_error = true;
            return Err(GalleryError::Upload(format!(
                "{} is {} bytes, limit is {}",
                file.name,
                file.size(),
                self.max_file_bytes
            )));
        }
        self.flags.upload_error = false;

        if !self.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(&file.mime)) {
            self.flags.image_type_error = true;
            return Err(GalleryError::ImageType(file.mime));
        }
        self.flags.image_type_error = false;
        self.flags.path_error = false;

        self.preview = Some(file.data_url());
        self.selected = Some(file);
        Ok(())
    }

    pub fn remove_image(&mut self) {
        self.selected = None;
        self.preview = None;
    }

    /// Required fields: an image and a non-blank title.
    pub fn validate(&mut self) -> Result<(), GalleryError> {
        self.flags.path_error = self.selected.is_none();
        self.flags.title_error = self.title.trim().is_empty();
        if self.flags.path_error {
            return Err(GalleryError::Validation { field: "path" });
        }
        if self.flags.title_error {
            return Err(GalleryError::Validation { field: "title" });
        }
        Ok(())
    }

    /// Fresh form for a new image: clears every field and every flag.
    pub fn open(&mut self) {
        self.clear_fields();
        self.progress = None;
        self.flags = FormFlags::default();
    }

    /// Dismiss the form. Only the title flag is reset.
    pub fn close(&mut self) {
        self.clear_fields();
        self.flags.title_error = false;
    }

    pub(crate) fn set_progress(&mut self, percent: u8) {
        self.progress = Some(percent.min(100));
    }

    pub(crate) fn flag_upload_error(&mut self) {
        self.flags.upload_error = true;
    }

    pub(crate) fn flag_save_error(&mut self) {
        self.flags.save_error = true;
    }

    /// After a successful save.
    pub(crate) fn reset(&mut self) {
        self.clear_fields();
    }

    fn clear_fields(&mut self) {
        self.title.clear();
        self.current_tag.clear();
        self.tags.clear();
        self.selected = None;
        self.preview = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> UploadForm {
        UploadForm::new(&StorageConfig {
            max_file_bytes: 10,
            ..StorageConfig::default()
        })
    }

    fn png(len: usize) -> SelectedFile {
        SelectedFile::new("cat.png", "image/png", vec![0u8; len])
    }

    #[test]
    fn test_add_hashtag_trims_and_rejects_duplicates() {
        let mut form = form();
        form.current_tag = "  cute ".to_string();
        assert!(form.add_hashtag());
        assert_eq!(form.tags(), ["cute".to_string()]);
        assert!(form.current_tag.is_empty());

        form.current_tag = "cute".to_string();
        assert!(!form.add_hashtag());
        assert!(form.flags().tag_error);
        assert_eq!(form.current_tag, "cute");

        form.current_tag = "fluffy".to_string();
        assert!(form.add_hashtag());
        assert!(!form.flags().tag_error);
    }

    #[test]
    fn test_blank_hashtag_ignored() {
        let mut form = form();
        form.current_tag = "   ".to_string();
        assert!(!form.add_hashtag());
        assert!(form.tags().is_empty());
        assert!(!form.flags().tag_error);
    }

    #[test]
    fn test_remove_hashtag() {
        let mut form = form();
        for tag in ["a", "b"] {
            form.current_tag = tag.to_string();
            form.add_hashtag();
        }
        form.remove_hashtag("a");
        form.remove_hashtag("missing");
        assert_eq!(form.tags(), ["b".to_string()]);
    }

    #[test]
    fn test_oversized_file_sets_upload_error() {
        let mut form = form();
        let err = form.select_file(png(11)).unwrap_err();
        assert!(matches!(err, GalleryError::Upload(_)));
        assert!(form.flags().upload_error);
        assert!(form.selected().is_none());
    }

    #[test]
    fn test_wrong_type_sets_image_type_error() {
        let mut form = form();
        let err = form
            .select_file(SelectedFile::new("doc.gif", "image/gif", vec![1]))
            .unwrap_err();
        assert_eq!(err, GalleryError::ImageType("image/gif".to_string()));
        assert!(form.flags().image_type_error);
    }

    #[test]
    fn test_valid_file_clears_flags_and_builds_preview() {
        let mut form = form();
        form.validate().unwrap_err();
        assert!(form.flags().path_error);

        form.select_file(png(3)).unwrap();
        assert!(!form.flags().path_error);
        assert_eq!(form.preview(), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_validate_requires_title() {
        let mut form = form();
        form.select_file(png(1)).unwrap();
        form.title = "  ".to_string();
        assert_eq!(form.validate(), Err(GalleryError::Validation { field: "title" }));
        assert!(form.flags().title_error);
        form.title = "Cat".to_string();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_open_resets_all_flags_close_only_title() {
        let mut form = form();
        form.validate().unwrap_err();
        form.flag_save_error();
        form.close();
        assert!(!form.flags().title_error);
        assert!(form.flags().path_error);
        assert!(form.flags().save_error);

        form.open();
        assert_eq!(form.flags(), &FormFlags::default());
    }
}
