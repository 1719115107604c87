//! Bounded-capacity directory of opaque encrypted files.
//!
//! Names are 64 hex characters of fresh randomness; files are owner-only.
//! The live byte count is guarded by a mutex, file I/O is not.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, ServerError};

/// Random name length in bytes; hex-encoded to 64 characters.
const NAME_BYTES: usize = 32;
/// Attempts before giving up on a name collision.
const CREATE_RETRIES: usize = 10;

#[derive(Clone)]
pub struct BlobStore {
    dir: PathBuf,
    capacity: u64,
    used: Arc<Mutex<u64>>,
}

impl BlobStore {
    pub fn new(dir: PathBuf, capacity: u64) -> Self {
        Self {
            dir,
            capacity,
            used: Arc::new(Mutex::new(0)),
        }
    }

    /// Scan the directory and set the live byte count to the sum of existing
    /// file sizes. The only cross-run reconciliation.
    pub async fn initialize(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| ServerError::Io(format!("blob dir scan: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ServerError::Io(format!("blob dir entry: {e}")))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| ServerError::Io(format!("blob stat: {e}")))?;
            if meta.is_file() {
                total += meta.len();
            }
        }
        *self.used.lock().expect("blob counter poisoned") = total;
        if total > self.capacity {
            tracing::warn!(used = total, capacity = self.capacity, "blob store over capacity");
        }
        Ok(total)
    }

    /// Current live byte count.
    pub fn used(&self) -> u64 {
        *self.used.lock().expect("blob counter poisoned")
    }

    /// Reserve `delta` bytes against the capacity.
    pub fn reserve(&self, delta: u64) -> Result<()> {
        let mut used = self.used.lock().expect("blob counter poisoned");
        if *used + delta > self.capacity {
            return Err(ServerError::StorageFull);
        }
        *used += delta;
        Ok(())
    }

    /// Return `delta` previously reserved bytes.
    pub fn release(&self, delta: u64) {
        let mut used = self.used.lock().expect("blob counter poisoned");
        *used = used.saturating_sub(delta);
    }

    /// Create a fresh blob file under a random 64-hex-character name.
    ///
    /// The returned writer reserves capacity as bytes are written and cleans
    /// up after itself unless [`BlobWriter::commit`] is called.
    pub async fn create(&self) -> Result<BlobWriter> {
        for _ in 0..CREATE_RETRIES {
            let mut name_bytes = [0u8; NAME_BYTES];
            getrandom::getrandom(&mut name_bytes)
                .map_err(|e| ServerError::Internal(format!("blob name entropy: {e}")))?;
            let name = hex::encode(name_bytes);
            let path = self.dir.join(&name);

            let mut options = fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            options.mode(0o600);

            match options.open(&path).await {
                Ok(file) => {
                    return Ok(BlobWriter {
                        store: self.clone(),
                        file: Some(file),
                        path,
                        written: 0,
                        committed: false,
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(ServerError::Io(format!("blob create: {e}"))),
            }
        }
        Err(ServerError::BlobCreateFailed(format!(
            "no free name after {CREATE_RETRIES} attempts"
        )))
    }

    /// Unlink a blob and release its bytes. A missing file is not an error:
    /// the reaper may race a manual cleanup or an earlier crash.
    pub async fn delete(&self, path: &Path) -> Result<u64> {
        let size = match fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "blob already gone");
                return Ok(0);
            }
            Err(e) => return Err(ServerError::Io(format!("blob stat: {e}"))),
        };
        fs::remove_file(path)
            .await
            .map_err(|e| ServerError::Io(format!("blob delete: {e}")))?;
        self.release(size);
        Ok(size)
    }
}

/// Write handle for a blob under construction.
///
/// Capacity is reserved chunk-by-chunk before each write, so the store never
/// holds more bytes than were admitted. Dropping an uncommitted writer
/// removes the partial file and returns the reservation.
pub struct BlobWriter {
    store: BlobStore,
    file: Option<fs::File>,
    path: PathBuf,
    written: u64,
    committed: bool,
}

impl BlobWriter {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Reserve capacity for `buf` and append it to the file.
    pub async fn write_chunk(&mut self, buf: &[u8]) -> Result<()> {
        self.store.reserve(buf.len() as u64)?;
        self.written += buf.len() as u64;
        let file = self.file.as_mut().expect("write after finish");
        file.write_all(buf)
            .await
            .map_err(|e| ServerError::Io(format!("blob write: {e}")))?;
        Ok(())
    }

    /// Flush and keep the file; the reservation stays with the store.
    pub async fn commit(mut self) -> Result<PathBuf> {
        let mut file = self.file.take().expect("double commit");
        file.flush()
            .await
            .map_err(|e| ServerError::Io(format!("blob flush: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| ServerError::Io(format!("blob sync: {e}")))?;
        self.committed = true;
        Ok(self.path.clone())
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(path = %self.path.display(), error = %e, "partial blob cleanup failed");
            }
        }
        self.store.release(self.written);
    }
}
