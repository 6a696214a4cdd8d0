/// Disk-based media upload backend
use crate::{
    error::{HubError, HubResult},
    media::MediaUploader,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Disk upload backend
///
/// Stores files content-addressed by SHA-256, with directory sharding on the
/// first two hex characters to keep directories small.
#[derive(Clone)]
pub struct DiskMediaUploader {
    base_path: PathBuf,
    public_base_url: String,
}

impl DiskMediaUploader {
    /// Create a new disk upload backend
    pub fn new(base_path: PathBuf, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Stored file name: `{sha256}` plus the source extension if it is sane
    fn stored_name(digest: &str, local_path: &Path) -> String {
        let extension = local_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));

        match extension {
            Some(ext) => format!("{}.{}", digest, ext),
            None => digest.to_string(),
        }
    }

    async fn store(&self, local_path: &Path) -> HubResult<String> {
        let data = fs::read(local_path).await?;
        let digest = hex::encode(Sha256::digest(&data));

        let shard = &digest[0..2];
        let name = Self::stored_name(&digest, local_path);
        let dir = self.base_path.join(shard);
        fs::create_dir_all(&dir).await.map_err(|e| {
            HubError::Internal(format!("Failed to create media directory: {}", e))
        })?;

        let target = dir.join(&name);
        // Same content already stored under the same name
        if !fs::try_exists(&target).await.unwrap_or(false) {
            fs::write(&target, &data).await?;
        }

        Ok(format!("{}/{}/{}", self.public_base_url, shard, name))
    }

    async fn remove_local(local_path: &Path) {
        if let Err(e) = fs::remove_file(local_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to delete local upload {:?}: {}", local_path, e);
            }
        }
    }
}

#[async_trait]
impl MediaUploader for DiskMediaUploader {
    async fn upload(&self, local_path: &Path) -> HubResult<Option<String>> {
        if !fs::try_exists(local_path).await.unwrap_or(false) {
            tracing::warn!("Upload source does not exist: {:?}", local_path);
            return Ok(None);
        }

        let result = self.store(local_path).await;
        Self::remove_local(local_path).await;

        match result {
            Ok(url) => {
                tracing::debug!("Uploaded {:?} to {}", local_path, url);
                Ok(Some(url))
            }
            Err(e) => {
                tracing::error!("Upload of {:?} failed: {}", local_path, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_stores_file_and_removes_source() {
        let storage = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let uploader = DiskMediaUploader::new(storage.path().to_path_buf(), "http://cdn/media/");

        let source = scratch.path().join("avatar.PNG");
        fs::write(&source, b"fake png bytes").await.unwrap();

        let url = uploader.upload(&source).await.unwrap().unwrap();
        let digest = hex::encode(Sha256::digest(b"fake png bytes"));

        assert_eq!(url, format!("http://cdn/media/{}/{}.png", &digest[0..2], digest));
        assert!(!source.exists());

        let stored = storage.path().join(&digest[0..2]).join(format!("{}.png", digest));
        assert_eq!(fs::read(stored).await.unwrap(), b"fake png bytes");
    }

    #[tokio::test]
    async fn test_identical_content_shares_url() {
        let storage = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let uploader = DiskMediaUploader::new(storage.path().to_path_buf(), "http://cdn");

        let first = scratch.path().join("a.jpg");
        let second = scratch.path().join("b.jpg");
        fs::write(&first, b"same").await.unwrap();
        fs::write(&second, b"same").await.unwrap();

        let url_a = uploader.upload(&first).await.unwrap();
        let url_b = uploader.upload(&second).await.unwrap();
        assert!(url_a.is_some());
        assert_eq!(url_a, url_b);
    }

    #[tokio::test]
    async fn test_missing_source_yields_none() {
        let storage = tempdir().unwrap();
        let uploader = DiskMediaUploader::new(storage.path().to_path_buf(), "http://cdn");

        let result = uploader
            .upload(&storage.path().join("does-not-exist.png"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_stored_name_drops_odd_extensions() {
        assert_eq!(DiskMediaUploader::stored_name("abc", Path::new("x.webm")), "abc.webm");
        assert_eq!(DiskMediaUploader::stored_name("abc", Path::new("x")), "abc");
        assert_eq!(DiskMediaUploader::stored_name("abc", Path::new("x.p/ng")), "abc");
        assert_eq!(DiskMediaUploader::stored_name("abc", Path::new("x.$$")), "abc");
    }
}
