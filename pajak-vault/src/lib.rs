#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::path::Path;
use std::path::PathBuf;

use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault directory not writable: {0}")]
    NotWritable(String),
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Io(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

/// On-disk store of uploaded artifacts. Each batch owns one directory under
/// the vault root; files are written once and never mutated while the batch
/// lives.
#[derive(Debug, Clone)]
pub struct FileVault {
    root: PathBuf,
}

impl FileVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory and probes it with a throwaway write.
    /// The startup contract refuses to boot when this fails.
    pub async fn ensure_writable(&self) -> VaultResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| VaultError::NotWritable(format!("{}: {err}", self.root.display())))?;
        let probe = self.root.join(".write_probe");
        tokio::fs::write(&probe, b"probe")
            .await
            .map_err(|err| VaultError::NotWritable(format!("{}: {err}", self.root.display())))?;
        tokio::fs::remove_file(&probe).await?;
        Ok(())
    }

    #[must_use]
    pub fn batch_dir(&self, batch_id: &str) -> PathBuf {
        self.root.join(batch_id)
    }

    /// Persists one uploaded blob as `{batch_id}/{NNN_sanitized_name}` and
    /// returns its path plus content hash.
    pub async fn store(
        &self,
        batch_id: &str,
        file_index: usize,
        sanitized_name: &str,
        payload: &[u8],
    ) -> VaultResult<StoredArtifact> {
        if batch_id.trim().is_empty() {
            return Err(VaultError::Validation("batch id cannot be empty".into()));
        }
        if sanitized_name.trim().is_empty() {
            return Err(VaultError::Validation("file name cannot be empty".into()));
        }

        let dir = self.batch_dir(batch_id);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{file_index:03}_{sanitized_name}"));
        tokio::fs::write(&path, payload).await?;

        Ok(StoredArtifact {
            path,
            sha256: sha256_hex(payload),
            size_bytes: payload.len() as u64,
        })
    }

    pub async fn read(&self, path: &Path) -> VaultResult<Vec<u8>> {
        if !path.starts_with(&self.root) {
            return Err(VaultError::Validation(format!(
                "{} is outside the vault",
                path.display()
            )));
        }
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(VaultError::NotFound(path.display().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Removes a batch directory and everything in it. Used when a batch is
    /// purged, never while its background task is running.
    pub async fn purge_batch(&self, batch_id: &str) -> VaultResult<()> {
        let dir = self.batch_dir(batch_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub fn sha256_hex(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn stores_with_indexed_names() {
        let dir = TempDir::new().expect("temp dir");
        let vault = FileVault::new(dir.path());
        vault.ensure_writable().await.expect("writable");

        let stored = vault
            .store("batch-1", 2, "faktur.pdf", b"%PDF-1.4 test")
            .await
            .expect("store");

        assert!(stored.path.ends_with("batch-1/002_faktur.pdf"));
        assert_eq!(stored.size_bytes, 13);

        let bytes = vault.read(&stored.path).await.expect("read");
        assert_eq!(bytes, b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn hash_is_stable_per_content() {
        let dir = TempDir::new().expect("temp dir");
        let vault = FileVault::new(dir.path());

        let first = vault
            .store("batch-1", 0, "a.png", b"payload")
            .await
            .expect("store");
        let second = vault
            .store("batch-2", 0, "b.png", b"payload")
            .await
            .expect("store");

        assert_eq!(first.sha256, second.sha256);
    }

    #[tokio::test]
    async fn read_rejects_paths_outside_root() {
        let dir = TempDir::new().expect("temp dir");
        let vault = FileVault::new(dir.path().join("vault"));
        vault.ensure_writable().await.expect("writable");

        let err = vault.read(Path::new("/etc/hosts")).await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[tokio::test]
    async fn purge_removes_batch_directory() {
        let dir = TempDir::new().expect("temp dir");
        let vault = FileVault::new(dir.path());
        let stored = vault
            .store("batch-1", 0, "a.pdf", b"data")
            .await
            .expect("store");

        vault.purge_batch("batch-1").await.expect("purge");
        let err = vault.read(&stored.path).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));

        // Purging twice is a no-op.
        vault.purge_batch("batch-1").await.expect("purge again");
    }
}
