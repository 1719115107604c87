//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use sealbox_server::blob::BlobStore;
use sealbox_server::db::items::Store;
use sealbox_server::db::pool;
use sealbox_server::engine::{CreateRequest, CreatedItem, Engine, FileMeta, FileUpload};
use sealbox_server::error::ServerError;
use sealbox_server::pages::Pages;
use sealbox_server::reaper::DeleteHint;
use sealbox_server::state::AppState;

pub const TEST_SALT: &str = "test-pepper";

pub struct TestStack {
    pub store: Store,
    pub blobs: BlobStore,
    pub engine: Engine,
    pub hints: mpsc::Receiver<DeleteHint>,
    _dir: tempfile::TempDir,
}

pub async fn stack() -> TestStack {
    stack_with(1 << 20, 1 << 20).await
}

pub async fn stack_with(capacity: u64, max_file: u64) -> TestStack {
    let dir = tempfile::tempdir().unwrap();
    let db_file = dir.path().join("sealbox.db");
    let db_pool = pool::create_pool_with(db_file.to_str().unwrap(), Duration::from_secs(5), 5)
        .await
        .unwrap();
    pool::run_migrations(&db_pool).await.unwrap();
    let store = Store::new(db_pool);

    let blob_dir = dir.path().join("blobs");
    std::fs::create_dir(&blob_dir).unwrap();
    let blobs = BlobStore::new(blob_dir, capacity);
    blobs.initialize().await.unwrap();

    let (hint_tx, hints) = mpsc::channel(16);
    let engine = Engine::new(
        store.clone(),
        blobs.clone(),
        hint_tx,
        TEST_SALT.to_string(),
        12,
        max_file,
    );

    TestStack {
        store,
        blobs,
        engine,
        hints,
        _dir: dir,
    }
}

pub fn app_state(stack: &TestStack) -> Arc<AppState> {
    Arc::new(AppState {
        engine: stack.engine.clone(),
        store: stack.store.clone(),
        pages: Pages::load(None).unwrap(),
        ttl_max: 86_400,
        times_max: 10,
        max_file_megabytes: 10,
        secure: false,
        static_dir: None,
        request_timeout: Duration::from_secs(30),
    })
}

pub async fn create_text(
    engine: &Engine,
    text: &str,
    times: i64,
    password: Option<&str>,
) -> Result<CreatedItem, ServerError> {
    engine
        .create(CreateRequest {
            text: Some(text.to_string()),
            file: None,
            ttl_seconds: 600,
            times,
            password: password.map(str::to_string),
        })
        .await
}

pub async fn create_with_file(
    engine: &Engine,
    text: Option<&str>,
    name: &str,
    data: &[u8],
    times: i64,
    password: &str,
) -> Result<CreatedItem, ServerError> {
    let mut reader = data;
    engine
        .create(CreateRequest {
            text: text.map(str::to_string),
            file: Some(FileUpload {
                name: name.to_string(),
                content_type: "application/octet-stream".to_string(),
                reader: &mut reader,
            }),
            ttl_seconds: 600,
            times,
            password: Some(password.to_string()),
        })
        .await
}

/// Drive a full file read, gathering the streamed bytes.
pub async fn read_file_bytes(
    engine: &Engine,
    key: &Uuid,
    password: &str,
) -> Result<(FileMeta, Vec<u8>), ServerError> {
    let (meta_tx, meta_rx) = oneshot::channel();
    let (body_tx, mut body_rx) = mpsc::channel::<Bytes>(8);

    let engine = engine.clone();
    let key = *key;
    let password = password.to_string();
    let task =
        tokio::spawn(async move { engine.read_file(&key, &password, meta_tx, body_tx).await });

    let meta = match meta_rx.await {
        Ok(meta) => meta,
        Err(_) => {
            let err = task
                .await
                .expect("read task panicked")
                .expect_err("no metadata but no error");
            return Err(err);
        }
    };

    let mut bytes = Vec::new();
    while let Some(chunk) = body_rx.recv().await {
        bytes.extend_from_slice(&chunk);
    }
    task.await.expect("read task panicked")?;
    Ok((meta, bytes))
}
