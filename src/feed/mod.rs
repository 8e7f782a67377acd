pub mod debounce;
pub mod search;
pub mod store;
pub mod sync;
pub mod types;

use store::FeedStore;

/// Whatever renders the feed. Told to lay out again after every change to
/// the active view.
pub trait Presenter: Send {
    fn request_layout(&mut self, store: &FeedStore);

    /// Upload progress in percent, 0 through 100.
    fn upload_progress(&mut self, _percent: u8) {}
}
