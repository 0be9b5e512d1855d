//!
//! src/sink.rs  Oct 18th, 2025
//!
//! Cover image storage on local disk. Blobs are written atomically into a
//! single root directory and addressed by their file name; any name that
//! could leave the root is refused.
//!

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::ServiceError;

pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub bytes: Vec<u8>,
    pub content_type: String
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `bytes` under `name`, returning the reference to load it by
    async fn store(&self, bytes: &[u8], name: &str) -> Result<String, ServiceError>;

    async fn load(&self, reference: &str) -> Result<StoredFile, ServiceError>;
}

pub struct LocalCoverStore {
    root: PathBuf
}

impl LocalCoverStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(ServiceError::Config("cover storage location cannot be empty".into()));
        }
        std::fs::create_dir_all(root).map_err(|e| ServiceError::Storage(
            format!("create dir {}: {e}", root.display())
        ))?;
        info!(root = %root.display(), "storage.init");
        Ok( Self { root: root.to_path_buf() } )
    }

    /// A single plain file name: no separators, no dot segments
    fn checked_name(name: &str) -> Result<&str, ServiceError> {
        let safe = !name.is_empty()
            && !name.contains("..")
            && !name.starts_with('.')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !safe {
            warn!(name = %name, "storage.rejected");
            return Err(ServiceError::Storage(
                format!("refusing to use {name:?} outside the storage directory")
            ));
        }
        Ok(name)
    }

    fn write_atomic(root: &Path, path: &Path, bytes: &[u8]) -> Result<(), ServiceError> {
        use std::io::Write;

        let mut temp = tempfile::NamedTempFile::new_in(root)
            .map_err(|e| ServiceError::Storage(format!("tempfile in {}: {e}", root.display())))?;
        temp.write_all(bytes)
            .map_err(|e| ServiceError::Storage(format!("write {}: {e}", path.display())))?;
        temp.persist(path)
            .map_err(|e| ServiceError::Storage(format!("persist {}: {e}", path.display())))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalCoverStore {
    async fn store(&self, bytes: &[u8], name: &str) -> Result<String, ServiceError> {
        let name = Self::checked_name(name)?.to_string();
        let root = self.root.clone();
        let path = root.join(&name);
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || Self::write_atomic(&root, &path, &bytes))
            .await
            .map_err(|e| ServiceError::Storage(format!("store task: {e}")))??;

        debug!(name = %name, "storage.stored");
        Ok(name)
    }

    async fn load(&self, reference: &str) -> Result<StoredFile, ServiceError> {
        let name = Self::checked_name(reference)
            .map_err(|_| ServiceError::NotFound(format!("Cover image not found: {reference}")))?;
        let path = self.root.join(name);

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            warn!(path = %path.display(), error = %e, "storage.unreadable");
            ServiceError::NotFound(format!("Cover image not found: {reference}"))
        })?;
        let content_type = detect_content_type(&bytes, &path).to_string();
        Ok(StoredFile { bytes, content_type })
    }
}

/// Magic bytes first, then the extension
pub fn detect_content_type(bytes: &[u8], path: &Path) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => return "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => return "image/png",
        [b'G', b'I', b'F', b'8', ..] => return "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => return "image/webp",
        _ => {}
    }
    match path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => OCTET_STREAM
    }
}
