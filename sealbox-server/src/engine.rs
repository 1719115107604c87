//! The item lifecycle engine: ties crypto, repository, and blob store into
//! the two atomic operations of the service, encrypt-and-save and
//! read-decrypt-decrement.

use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use sealbox_core::crypto::seal;
use sealbox_core::crypto::stream::FileCipher;
use sealbox_core::password;

use crate::blob::BlobStore;
use crate::db::items::{ItemRow, NewItem, Store};
use crate::error::{Result, ServerError};
use crate::reaper::DeleteHint;

/// Streaming chunk size for file encryption and decryption.
const CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on waiting for a slow download consumer. The read
/// transaction pins the single-writer lock, so a stalled client must not
/// hold it indefinitely.
const STREAM_SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Shown to the uploader in place of a password they chose themselves.
pub const PASSWORD_MASK: &str = "********";

/// Decrypted file metadata, stored encrypted as a small JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

/// Which aspects a read touches.
#[derive(Debug, Clone, Copy)]
pub struct Aspects {
    pub text: bool,
    pub meta: bool,
    pub file: bool,
}

impl Aspects {
    /// Text retrieval: the note plus the file metadata, never file bytes.
    pub const TEXT_META: Self = Self { text: true, meta: true, file: false };
    /// File retrieval: metadata for the response headers, then the bytes.
    pub const META_FILE: Self = Self { text: false, meta: true, file: true };
}

/// Counter deltas for one read, decided against the row before decryption.
#[derive(Debug, Clone, Copy)]
struct ReadPlan {
    d_text: i64,
    d_meta: i64,
    d_file: i64,
}

impl ReadPlan {
    fn any(&self) -> bool {
        self.d_text + self.d_meta + self.d_file > 0
    }
}

/// Validate budgets and compute deltas.
///
/// An aspect is consumed when it is requested and the item actually carries
/// it; absent aspects are skipped rather than failed, so a text request
/// against a file-only item still serves the metadata. The metadata budget
/// is spent whenever text or file is consumed, which keeps metadata
/// readable exactly as long as either payload aspect is.
fn plan_read(row: &ItemRow, aspects: Aspects) -> Result<ReadPlan> {
    let consume_text = aspects.text && row.has_text();
    let consume_file = aspects.file && row.has_file();
    let d_meta = i64::from(consume_text || consume_file);

    if consume_text && row.count_text < 1 {
        return Err(ServerError::NoAttempts);
    }
    if consume_file && row.count_file < 1 {
        return Err(ServerError::NoAttempts);
    }
    if row.count_meta < d_meta {
        return Err(ServerError::NoAttempts);
    }
    if aspects.meta && row.has_meta() && row.count_meta < 1 {
        return Err(ServerError::NoAttempts);
    }

    Ok(ReadPlan {
        d_text: i64::from(consume_text),
        d_meta,
        d_file: i64::from(consume_file),
    })
}

/// A file arriving with an upload.
pub struct FileUpload<'a> {
    pub name: String,
    pub content_type: String,
    pub reader: &'a mut (dyn AsyncRead + Unpin + Send),
}

/// Upload parameters after HTTP-level validation.
pub struct CreateRequest<'a> {
    pub text: Option<String>,
    pub file: Option<FileUpload<'a>>,
    pub ttl_seconds: i64,
    pub times: i64,
    pub password: Option<String>,
}

/// Result of a successful create.
#[derive(Debug, Clone)]
pub struct CreatedItem {
    pub key: Uuid,
    /// The generated password when it was auto-generated, a mask otherwise.
    pub password_to_show: String,
    pub auto_password: bool,
}

/// Result of a text read.
#[derive(Debug, Clone)]
pub struct TextOutcome {
    pub text: String,
    pub meta: Option<FileMeta>,
}

#[derive(Clone)]
pub struct Engine {
    store: Store,
    blobs: BlobStore,
    reaper: mpsc::Sender<DeleteHint>,
    /// `settings.salt`, appended to every password before key derivation.
    secret_salt: String,
    password_length: usize,
    max_file_bytes: u64,
}

impl Engine {
    pub fn new(
        store: Store,
        blobs: BlobStore,
        reaper: mpsc::Sender<DeleteHint>,
        secret_salt: String,
        password_length: usize,
        max_file_bytes: u64,
    ) -> Self {
        Self {
            store,
            blobs,
            reaper,
            secret_salt,
            password_length,
            max_file_bytes,
        }
    }

    fn secret(&self, password: &str) -> String {
        format!("{password}{}", self.secret_salt)
    }

    /// Encrypt-and-save.
    ///
    /// Aspect isolation: text, metadata, and file each get a fresh salt and
    /// an independently derived key. The blob is written before the row so
    /// a crash can only leave an orphan file (cleaned by drop or unlink),
    /// never a row pointing at nothing.
    pub async fn create(&self, req: CreateRequest<'_>) -> Result<CreatedItem> {
        let text = req.text.unwrap_or_default();
        if text.is_empty() && req.file.is_none() {
            return Err(ServerError::EmptyBody);
        }

        let (password, auto_password) = match req.password {
            Some(p) if !p.is_empty() => (p, false),
            _ => (password::generate(self.password_length)?, true),
        };
        let secret = self.secret(&password);

        let key = Uuid::new_v4();
        let now = Utc::now();
        let mut item = NewItem {
            key: key.to_string(),
            count_meta: req.times,
            created: now,
            expired: now + ChronoDuration::seconds(req.ttl_seconds),
            ..NewItem::default()
        };

        if !text.is_empty() {
            let sealed = seal::seal_text(&secret, &text)?;
            item.text = sealed.value;
            item.hash_text = sealed.hash;
            item.salt_text = sealed.salt;
            item.count_text = req.times;
        }

        let mut blob_path = None;
        if let Some(mut file) = req.file {
            let file_key = seal::seal_file_key(&secret)?;
            let mut writer = self.blobs.create().await?;
            let mut cipher = FileCipher::new(&file_key.key);
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = file
                    .reader
                    .read(&mut buf)
                    .await
                    .map_err(|e| ServerError::Io(format!("upload read: {e}")))?;
                if n == 0 {
                    break;
                }
                if writer.written() + n as u64 > self.max_file_bytes {
                    return Err(ServerError::FileTooLarge);
                }
                cipher.apply(&mut buf[..n]);
                writer.write_chunk(&buf[..n]).await?;
            }

            let meta = FileMeta {
                name: file.name,
                size: writer.written(),
                content_type: file.content_type,
            };
            let meta_json = serde_json::to_string(&meta)
                .map_err(|e| ServerError::Internal(format!("meta encode: {e}")))?;
            let sealed_meta = seal::seal_text(&secret, &meta_json)?;
            item.file_meta = sealed_meta.value;
            item.hash_meta = sealed_meta.hash;
            item.salt_meta = sealed_meta.salt;
            item.hash_file = file_key.hash;
            item.salt_file = file_key.salt;
            item.count_file = req.times;
            item.file_path = writer.path().display().to_string();

            blob_path = Some(writer.commit().await?);
        }

        let saved = async {
            let mut tx = self.store.begin_write().await?;
            self.store.save(tx.conn(), &item).await?;
            tx.commit().await
        }
        .await;

        if let Err(e) = saved {
            if let Some(path) = &blob_path {
                if let Err(cleanup) = self.blobs.delete(path).await {
                    tracing::error!(error = %cleanup, "orphan blob cleanup after failed insert");
                }
            }
            return Err(e);
        }

        tracing::info!(key = %key, has_file = blob_path.is_some(), "item created");
        Ok(CreatedItem {
            key,
            password_to_show: if auto_password {
                password
            } else {
                PASSWORD_MASK.to_string()
            },
            auto_password,
        })
    }

    /// Read-decrypt-decrement for the text flow: note plus file metadata.
    pub async fn read_text(&self, key: &Uuid, password: &str) -> Result<TextOutcome> {
        let secret = self.secret(password);

        let mut tx = self.store.begin_write().await?;
        let row = self
            .store
            .read_locked(tx.conn(), &key.to_string())
            .await?
            .ok_or(ServerError::NotFound)?;
        let plan = plan_read(&row, Aspects::TEXT_META)?;

        let text = if row.has_text() {
            seal::open_text(
                &secret,
                &seal::Sealed {
                    value: row.text.clone(),
                    salt: row.salt_text.clone(),
                    hash: row.hash_text.clone(),
                },
            )?
        } else {
            String::new()
        };
        let meta = self.open_meta(&secret, &row)?;

        if plan.any() {
            self.store
                .decrement(tx.conn(), row.id, plan.d_text, plan.d_meta, plan.d_file)
                .await?;
        }
        tx.commit().await?;

        self.hint_if_exhausted(&row, plan);
        Ok(TextOutcome { text, meta })
    }

    /// Read-decrypt-decrement for the file flow.
    ///
    /// Metadata goes out through `meta_tx` before any payload bytes so the
    /// HTTP layer can write headers; decrypted chunks stream through
    /// `body_tx`. Any failure, including mid-stream, returns before the
    /// decrement: the client may have partial bytes, the budget is intact.
    pub async fn read_file(
        &self,
        key: &Uuid,
        password: &str,
        meta_tx: oneshot::Sender<FileMeta>,
        body_tx: mpsc::Sender<Bytes>,
    ) -> Result<()> {
        let secret = self.secret(password);

        let mut tx = self.store.begin_write().await?;
        let row = self
            .store
            .read_locked(tx.conn(), &key.to_string())
            .await?
            .ok_or(ServerError::NotFound)?;
        if !row.has_file() {
            return Err(ServerError::NoFile);
        }
        let plan = plan_read(&row, Aspects::META_FILE)?;

        let meta = self
            .open_meta(&secret, &row)?
            .ok_or_else(|| ServerError::Internal("file item without metadata".to_string()))?;
        let file_key = seal::open_key(&secret, &row.salt_file, &row.hash_file)?;

        let mut blob = match tokio::fs::File::open(&row.file_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServerError::BlobMissing)
            }
            Err(e) => return Err(ServerError::Io(format!("blob open: {e}"))),
        };

        if meta_tx.send(meta).is_err() {
            return Err(ServerError::Io("client went away before headers".to_string()));
        }

        let mut cipher = FileCipher::new(&file_key);
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = blob
                .read(&mut buf)
                .await
                .map_err(|e| ServerError::Io(format!("blob read: {e}")))?;
            if n == 0 {
                break;
            }
            let mut chunk = buf[..n].to_vec();
            cipher.apply(&mut chunk);
            match tokio::time::timeout(STREAM_SEND_TIMEOUT, body_tx.send(Bytes::from(chunk))).await
            {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    return Err(ServerError::Io("client went away mid-stream".to_string()))
                }
                Err(_) => return Err(ServerError::Io("download consumer stalled".to_string())),
            }
        }

        self.store
            .decrement(tx.conn(), row.id, plan.d_text, plan.d_meta, plan.d_file)
            .await?;
        tx.commit().await?;

        self.hint_if_exhausted(&row, plan);
        Ok(())
    }

    fn open_meta(&self, secret: &str, row: &ItemRow) -> Result<Option<FileMeta>> {
        if !row.has_meta() {
            return Ok(None);
        }
        let meta_json = seal::open_text(
            secret,
            &seal::Sealed {
                value: row.file_meta.clone(),
                salt: row.salt_meta.clone(),
                hash: row.hash_meta.clone(),
            },
        )?;
        let meta = serde_json::from_str(&meta_json)
            .map_err(|e| ServerError::Internal(format!("meta decode: {e}")))?;
        Ok(Some(meta))
    }

    /// Post-commit deletion hint. Never blocks: a full queue just leaves
    /// the item to the next reaper tick.
    fn hint_if_exhausted(&self, row: &ItemRow, plan: ReadPlan) {
        let text_left = row.count_text - plan.d_text;
        let file_left = row.count_file - plan.d_file;
        if text_left <= 0 && file_left <= 0 {
            let hint = DeleteHint {
                id: row.id,
                file_path: row.file_path.clone(),
            };
            if self.reaper.try_send(hint).is_err() {
                tracing::debug!(id = row.id, "reaper queue full, leaving item to the sweep");
            }
        }
    }
}
