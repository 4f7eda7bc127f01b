//! Narrow interfaces to the I/O the pipeline depends on.
//!
//! The worker pool never talks to a messaging service or spawns a tool
//! directly; it goes through these traits so the binary can plug in real
//! wrappers and tests can plug in fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// Opaque error from a collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Future type returned by fallible collaborator calls.
pub type CallFuture<'a, T> = BoxFuture<'a, Result<T, BoxError>>;

/// A fetched resource on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub path: PathBuf,
    pub size: u64,
}

/// Media properties reported by a probe. Every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<u32>,
    /// One of 0, 90, 180 or 270 when present.
    pub rotation: Option<u16>,
}

impl MediaInfo {
    /// Dimensions as displayed: quarter turns swap width and height.
    pub fn oriented(self) -> Self {
        match (self.rotation, self.width, self.height) {
            (Some(90 | 270), Some(w), Some(h)) => Self {
                width: Some(h),
                height: Some(w),
                ..self
            },
            _ => self,
        }
    }
}

/// A media file ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMedia {
    pub path: PathBuf,
    pub info: MediaInfo,
    pub caption: Option<String>,
}

/// Messaging transport used to reach the requester.
pub trait Transport: Send + Sync + 'static {
    fn send_text<'a>(
        &'a self,
        chat_id: i64,
        text: &'a str,
        reply_to: Option<i64>,
    ) -> CallFuture<'a, ()>;

    fn send_media<'a>(
        &'a self,
        chat_id: i64,
        media: &'a OutgoingMedia,
        reply_to: Option<i64>,
    ) -> CallFuture<'a, ()>;

    /// Show an in-progress indicator in the chat.
    fn send_progress_signal(&self, chat_id: i64) -> CallFuture<'_, ()>;
}

/// Downloads a resource into a working directory.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch<'a>(&'a self, url: &'a str, work_dir: &'a Path) -> CallFuture<'a, Fetched>;
}

/// Container post-processing.
///
/// Infallible: on any failure the original path is returned unchanged.
pub trait Remuxer: Send + Sync + 'static {
    fn remux<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, PathBuf>;
}

/// Metadata probe. Failure yields an empty [`MediaInfo`].
pub trait Prober: Send + Sync + 'static {
    fn probe<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, MediaInfo>;
}

/// The full set of collaborators one pool shares.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub fetcher: Arc<dyn Fetcher>,
    pub remuxer: Arc<dyn Remuxer>,
    pub prober: Arc<dyn Prober>,
}

impl Collaborators {
    pub fn new(
        transport: Arc<dyn Transport>,
        fetcher: Arc<dyn Fetcher>,
        remuxer: Arc<dyn Remuxer>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self {
            transport,
            fetcher,
            remuxer,
            prober,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::MediaInfo;

    #[test]
    fn quarter_turns_swap_dimensions() {
        let info = MediaInfo {
            width: Some(1920),
            height: Some(1080),
            duration_secs: Some(12),
            rotation: Some(90),
        };
        let oriented = info.oriented();
        assert_eq!(oriented.width, Some(1080));
        assert_eq!(oriented.height, Some(1920));
        assert_eq!(oriented.duration_secs, Some(12));

        let upside_down = MediaInfo {
            rotation: Some(180),
            ..info
        };
        assert_eq!(upside_down.oriented(), upside_down);
    }

    #[test]
    fn missing_dimensions_are_left_alone() {
        let info = MediaInfo {
            width: Some(640),
            height: None,
            duration_secs: None,
            rotation: Some(270),
        };
        assert_eq!(info.oriented(), info);
    }
}
