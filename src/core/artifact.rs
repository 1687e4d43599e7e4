use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

/// Staged copy of the current artifact that the surrounding system can
/// resolve to a download. Revoking deletes the staged file.
#[derive(Debug)]
struct DownloadHandle {
    path: PathBuf,
    revoked: bool,
}

impl DownloadHandle {
    async fn revoke(&mut self) {
        if self.revoked {
            return;
        }
        self.revoked = true;
        // Already-gone files are fine, revocation is idempotent.
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove staged artifact");
            }
        }
    }
}

#[derive(Debug)]
struct StoredArtifact {
    payload: Bytes,
    filename: String,
    handle: Option<DownloadHandle>,
}

/// Owns the single live optimization result. The slot enforces
/// revoke-before-replace: the previous handle is always revoked before a new
/// artifact is recorded, so two live handles never coexist.
#[derive(Debug)]
pub struct ArtifactSlot {
    staging_dir: PathBuf,
    current: Option<StoredArtifact>,
}

impl ArtifactSlot {
    pub fn new(staging_dir: PathBuf) -> Self {
        Self { staging_dir, current: None }
    }

    pub fn has_artifact(&self) -> bool {
        self.current.is_some()
    }

    pub fn filename(&self) -> Option<&str> {
        self.current.as_ref().map(|a| a.filename.as_str())
    }

    pub fn payload_len(&self) -> Option<u64> {
        self.current.as_ref().map(|a| a.payload.len() as u64)
    }

    /// Record a new artifact, revoking the previous handle first.
    pub async fn store(&mut self, payload: Bytes, filename: String) {
        self.release().await;
        self.current = Some(StoredArtifact { payload, filename, handle: None });
    }

    /// Path of the staged download file for the current artifact. Created
    /// lazily on first call; later calls return the same path.
    pub async fn handle(&mut self) -> anyhow::Result<PathBuf> {
        let staging_dir = self.staging_dir.clone();
        let art = self.current.as_mut().context("no artifact held")?;

        if let Some(h) = &art.handle {
            return Ok(h.path.clone());
        }

        tokio::fs::create_dir_all(&staging_dir)
            .await
            .with_context(|| format!("create staging dir {}", staging_dir.display()))?;

        let path = staging_dir.join(format!("{}-{}", Uuid::new_v4(), art.filename));
        tokio::fs::write(&path, &art.payload)
            .await
            .with_context(|| format!("stage artifact {}", path.display()))?;

        art.handle = Some(DownloadHandle { path: path.clone(), revoked: false });
        Ok(path)
    }

    /// Copy the current artifact into `dir` under its suggested filename.
    /// Downloading never revokes, so this can be repeated for one result.
    pub async fn download_to(&mut self, dir: &Path) -> anyhow::Result<PathBuf> {
        let staged = self.handle().await?;
        let filename = self
            .filename()
            .map(|s| s.to_string())
            .context("no artifact held")?;

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create out dir {}", dir.display()))?;
        let dest = dir.join(filename);
        tokio::fs::copy(&staged, &dest)
            .await
            .with_context(|| format!("save artifact to {}", dest.display()))?;
        Ok(dest)
    }

    /// Revoke the current handle (if any) and drop the payload. Safe to call
    /// any number of times.
    pub async fn release(&mut self) {
        if let Some(mut art) = self.current.take() {
            if let Some(h) = art.handle.as_mut() {
                h.revoke().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_is_lazy_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut slot = ArtifactSlot::new(dir.path().join("staging"));

        slot.store(Bytes::from_static(b"payload"), "a.zip".to_string()).await;
        assert!(slot.has_artifact());
        // Nothing staged until a handle is requested.
        assert!(!dir.path().join("staging").exists());

        let p1 = slot.handle().await.unwrap();
        let p2 = slot.handle().await.unwrap();
        assert_eq!(p1, p2);
        assert_eq!(tokio::fs::read(&p1).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn store_revokes_previous_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut slot = ArtifactSlot::new(dir.path().to_path_buf());

        slot.store(Bytes::from_static(b"one"), "one.zip".to_string()).await;
        let old = slot.handle().await.unwrap();
        assert!(old.exists());

        slot.store(Bytes::from_static(b"two"), "two.zip".to_string()).await;
        assert!(!old.exists(), "old handle must be revoked before replacement");

        let new = slot.handle().await.unwrap();
        assert_ne!(old, new);
        assert_eq!(tokio::fs::read(&new).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut slot = ArtifactSlot::new(dir.path().to_path_buf());

        slot.store(Bytes::from_static(b"x"), "x.zip".to_string()).await;
        let staged = slot.handle().await.unwrap();

        slot.release().await;
        assert!(!slot.has_artifact());
        assert!(!staged.exists());

        // A second release (and a release with nothing held) is a no-op.
        slot.release().await;
        assert!(!slot.has_artifact());
    }

    #[tokio::test]
    async fn download_does_not_revoke() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut slot = ArtifactSlot::new(dir.path().to_path_buf());

        slot.store(Bytes::from_static(b"abc"), "r.zip".to_string()).await;
        let first = slot.download_to(out.path()).await.unwrap();
        let second = slot.download_to(out.path()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(tokio::fs::read(&first).await.unwrap(), b"abc");
        assert!(slot.has_artifact());
    }
}
