//! End-to-end reaper behavior against a live engine.

mod common;

use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, watch};

use common::{create_with_file, read_file_bytes, stack};
use sealbox_server::db::items::NewItem;
use sealbox_server::reaper;

const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(20);

#[tokio::test]
async fn test_exhausted_item_reaped_before_next_tick() {
    let mut s = stack().await;

    // wire the engine's hint channel into a reaper whose periodic sweep is
    // far away, so only the prompt path can do the work
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let hints = std::mem::replace(&mut s.hints, mpsc::channel(1).1);
    let handle = reaper::spawn(
        s.store.clone(),
        s.blobs.clone(),
        Duration::from_secs(3600),
        hints,
        shutdown_rx,
    );

    let data = vec![9u8; 256];
    let created = create_with_file(&s.engine, None, "f.bin", &data, 1, "pw")
        .await
        .unwrap();
    let (_, bytes) = read_file_bytes(&s.engine, &created.key, "pw").await.unwrap();
    assert_eq!(bytes, data);

    let key = created.key.to_string();
    let deadline = Instant::now() + WAIT;
    loop {
        if s.store.exists(&key).await.unwrap().is_none() && s.blobs.used() == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "exhausted item was not reaped");
        tokio::time::sleep(POLL).await;
    }

    let _ = shutdown_tx.send(true);
    let _ = handle.await;
}

#[tokio::test]
async fn test_expired_item_swept_within_gc_period() {
    let s = stack().await;

    // a blob on disk belonging to an already expired row
    let mut writer = s.blobs.create().await.unwrap();
    writer.write_chunk(&[0u8; 32]).await.unwrap();
    let blob_path = writer.commit().await.unwrap();

    let now = Utc::now();
    let item = NewItem {
        key: "expired-under-test".to_string(),
        text: "aa".to_string(),
        file_path: blob_path.display().to_string(),
        count_text: 1,
        count_meta: 1,
        created: now,
        expired: now - ChronoDuration::seconds(5),
        ..NewItem::default()
    };
    let mut tx = s.store.begin_write().await.unwrap();
    s.store.save(tx.conn(), &item).await.unwrap();
    tx.commit().await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_hint_tx, hint_rx) = mpsc::channel(1);
    let handle = reaper::spawn(
        s.store.clone(),
        s.blobs.clone(),
        Duration::from_millis(50),
        hint_rx,
        shutdown_rx,
    );

    let deadline = Instant::now() + WAIT;
    loop {
        if !blob_path.exists() && s.blobs.used() == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "expired item was not swept");
        tokio::time::sleep(POLL).await;
    }
    assert!(s.store.exists("expired-under-test").await.unwrap().is_none());

    let _ = shutdown_tx.send(true);
    let _ = handle.await;
}
