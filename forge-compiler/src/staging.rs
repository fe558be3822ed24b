//! Input Staging (§4.C): the local side of uploading binary inputs to a
//! worker node. Grounded on `original_source/app/services/storage.py`
//! (the object-store abstraction) and `comfy_prepare_prompt.py`'s upload
//! naming convention (`f"{key}{ext}"`).
//!
//! The actual network upload is a Worker Client concern (`forge-core`); this
//! module only owns the narrow `FileStore` abstraction the compiler's mask
//! coupling step needs to read/write bytes, plus the deterministic naming
//! rule shared with the worker client.

use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::StagingError;

/// Narrow object-store abstraction. A production deployment's actual backend
/// (S3, GCS, ...) is an external collaborator per `spec.md` §1; this trait is
/// the seam `forge-core` plugs a concrete implementation into.
pub trait FileStore: Send + Sync {
    fn read(&self, path: &str) -> Result<Bytes, StagingError>;
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StagingError>;
}

/// Development/test implementation rooted at `STORAGE_ROOT`.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl FileStore for LocalFileStore {
    fn read(&self, path: &str) -> Result<Bytes, StagingError> {
        std::fs::read(self.resolve(path))
            .map(Bytes::from)
            .map_err(|e| StagingError::FileNotFound(format!("{path}: {e}")))
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StagingError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StagingError::BackendUnavailable(e.to_string()))?;
        }
        std::fs::write(full, bytes).map_err(|e| StagingError::BackendUnavailable(e.to_string()))
    }
}

/// Deterministic remote upload name for a staged input: the Spec input key
/// plus the local file's extension, matching
/// `comfy_prepare_prompt.py::_upload_name`.
pub fn upload_name(key: &str, local_path: &str) -> String {
    let ext = Path::new(local_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png");
    format!("{key}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_name_uses_key_and_source_extension() {
        assert_eq!(upload_name("image_204", "/tmp/uploads/foo.jpg"), "image_204.jpg");
        assert_eq!(upload_name("mask_204", "foo"), "mask_204.png");
    }

    #[test]
    fn local_file_store_round_trips() {
        let dir = std::env::temp_dir().join(format!("forge-staging-test-{}", std::process::id()));
        let store = LocalFileStore::new(&dir);
        store.write("a/b.bin", b"hello").unwrap();
        assert_eq!(store.read("a/b.bin").unwrap(), Bytes::from_static(b"hello"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
