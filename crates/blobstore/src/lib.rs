//! Content-addressed blob store.
//!
//! One file per SHA-256 digest under `blobs/sha256/`, filename = lowercase
//! hex. Writes are write-if-absent: bytes land in a temp file in the store
//! directory and are renamed into place, so concurrent writers of the same
//! content converge and a torn write is never visible. The store is
//! append-only; deletion and garbage collection live outside the core.

use std::path::{Path, PathBuf};

use hsd_domain::ContentHash;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(ContentHash),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BlobError>;

/// Filesystem blob store rooted at `<data_dir>/blobs/sha256`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open (and create if missing) the store under `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let root = data_dir.join("blobs").join("sha256");
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!(path = %root.display(), "blob store ready");
        Ok(Self { root })
    }

    /// Store `bytes`, returning their canonical hash.
    ///
    /// If a blob with the same hash already exists the write is skipped; on
    /// a rename race the freshly written temp file simply loses to the
    /// existing one (identical content either way).
    pub async fn put(&self, bytes: &[u8]) -> Result<ContentHash> {
        let hash = ContentHash::of_bytes(bytes);
        let target = self.path_for(&hash);

        if tokio::fs::try_exists(&target).await? {
            return Ok(hash);
        }

        // Temp file in the store directory so the rename stays on one
        // filesystem.
        let root = self.root.clone();
        let bytes = bytes.to_vec();
        let target_clone = target.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&root)?;
            std::io::Write::write_all(&mut tmp, &bytes)?;
            tmp.as_file().sync_all()?;
            match tmp.persist_noclobber(&target_clone) {
                Ok(_) => Ok(()),
                // Lost the race: the winner wrote identical bytes.
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
                Err(e) => Err(e.error),
            }
        })
        .await
        .map_err(|e| std::io::Error::other(format!("blob write task: {e}")))??;

        Ok(hash)
    }

    /// Read a blob's bytes.
    pub async fn read(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        match tokio::fs::read(self.path_for(hash)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(hash.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, hash: &ContentHash) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(hash)).await?)
    }

    /// Filesystem path a blob lives at (whether or not it exists yet).
    pub fn path_for(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.hex())
    }
}
