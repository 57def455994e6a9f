use anyhow::{Context, Result, ensure};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// A bucketed blob store that documents are ingested from.
pub trait BlobStore: Send + Sync {
    fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;
}

/// Blob store backed by a local directory tree, one subdirectory per
/// bucket.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write a blob, creating the bucket directory as needed. Used by the
    /// ingestion CLI to stage local files before processing.
    #[inline]
    pub fn store(&self, bucket: &str, path: &str, content: &[u8]) -> Result<()> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(&target, content)
            .with_context(|| format!("Failed to write blob {}", target.display()))?;
        debug!("Stored blob at {}", target.display());
        Ok(())
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        ensure!(!bucket.is_empty(), "Bucket name must not be empty");
        ensure!(!path.is_empty(), "Blob path must not be empty");
        ensure!(
            is_clean_relative(Path::new(bucket)) && is_clean_relative(Path::new(path)),
            "Blob path must be relative and must not contain '..'"
        );
        Ok(self.root.join(bucket).join(path))
    }
}

fn is_clean_relative(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_)))
}

impl BlobStore for LocalBlobStore {
    #[inline]
    fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(bucket, path)?;
        fs::read(&target).with_context(|| {
            if target.exists() {
                format!("Failed to read blob {}", target.display())
            } else {
                format!("Blob not found: {bucket}/{path}")
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::TempDir;

    fn store_in_tempdir() -> (TempDir, LocalBlobStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn round_trips_a_blob_through_a_bucket() {
        let (_dir, store) = store_in_tempdir();
        store
            .store("documents", "reports/q3.pdf", b"%PDF-1.4")
            .expect("store should succeed");

        let content = store
            .download("documents", "reports/q3.pdf")
            .expect("download should succeed");
        assert_eq!(content, b"%PDF-1.4");
    }

    #[test]
    fn missing_blob_is_an_error() {
        let (_dir, store) = store_in_tempdir();
        let error = store
            .download("documents", "missing.pdf")
            .expect_err("missing blob should error");
        assert!(error.to_string().contains("missing.pdf"));
    }

    #[test]
    fn path_traversal_is_rejected() {
        let (_dir, store) = store_in_tempdir();
        assert!(store.download("documents", "../outside.pdf").is_err());
        assert!(store.download("..", "file.pdf").is_err());
        assert!(store.download("documents", "/etc/passwd").is_err());
    }

    #[test]
    fn empty_names_are_rejected() {
        let (_dir, store) = store_in_tempdir();
        assert!(store.download("", "file.pdf").is_err());
        assert!(store.download("documents", "").is_err());
    }

    #[test]
    fn read_errors_keep_the_io_source() {
        let (_dir, store) = store_in_tempdir();
        let error = store.download("bucket", "nope").expect_err("should fail");
        assert!(error.downcast_ref::<io::Error>().is_some());
    }
}
