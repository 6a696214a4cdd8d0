/// Media upload collaborator
///
/// Registration and profile updates receive media as local temp files. An
/// uploader moves such a file to durable storage and hands back a stable URL.

pub mod disk;

pub use disk::DiskMediaUploader;

use crate::error::HubResult;
use async_trait::async_trait;
use std::path::Path;

/// Media upload backend trait
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Upload a local file and return its public URL
    ///
    /// Returns `Ok(None)` when the file is missing or the upload failed. The
    /// local file is removed in every case.
    async fn upload(&self, local_path: &Path) -> HubResult<Option<String>>;
}
