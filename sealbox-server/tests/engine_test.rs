//! Lifecycle tests for the item engine: budgets, atomicity, and the
//! deletion hint.

mod common;

use common::{create_text, create_with_file, read_file_bytes, stack, stack_with};
use sealbox_server::engine::PASSWORD_MASK;
use sealbox_server::error::ServerError;

#[tokio::test]
async fn test_text_roundtrip_until_exhausted() {
    let mut s = stack().await;

    let created = create_text(&s.engine, "hello", 2, Some("pw")).await.unwrap();
    assert!(!created.auto_password);
    assert_eq!(created.password_to_show, PASSWORD_MASK);

    for _ in 0..2 {
        let outcome = s.engine.read_text(&created.key, "pw").await.unwrap();
        assert_eq!(outcome.text, "hello");
        assert!(outcome.meta.is_none());
    }

    // budget spent: the item is gone for every caller
    let result = s.engine.read_text(&created.key, "pw").await;
    assert!(matches!(result, Err(ServerError::NotFound)));

    // exhaustion was hinted to the reaper
    let hint = s.hints.recv().await.unwrap();
    assert!(hint.file_path.is_empty());
}

#[tokio::test]
async fn test_auto_password_is_returned() {
    let s = stack().await;
    let created = create_text(&s.engine, "note", 1, None).await.unwrap();
    assert!(created.auto_password);
    assert_eq!(created.password_to_show.len(), 12);

    let outcome = s
        .engine
        .read_text(&created.key, &created.password_to_show)
        .await
        .unwrap();
    assert_eq!(outcome.text, "note");
}

#[tokio::test]
async fn test_empty_body_rejected() {
    let s = stack().await;
    let result = create_text(&s.engine, "", 1, Some("pw")).await;
    assert!(matches!(result, Err(ServerError::EmptyBody)));
}

#[tokio::test]
async fn test_file_roundtrip_with_free_meta_peek() {
    let mut s = stack().await;
    let data = vec![0xA7u8; 1024];

    let created = create_with_file(&s.engine, None, "a.bin", &data, 1, "pw")
        .await
        .unwrap();

    // the text flow on a file-only item serves the metadata without
    // consuming anything
    let outcome = s.engine.read_text(&created.key, "pw").await.unwrap();
    assert_eq!(outcome.text, "");
    let meta = outcome.meta.unwrap();
    assert_eq!(meta.name, "a.bin");
    assert_eq!(meta.size, 1024);
    assert_eq!(meta.content_type, "application/octet-stream");

    // the single file read still works afterwards
    let (meta, bytes) = read_file_bytes(&s.engine, &created.key, "pw").await.unwrap();
    assert_eq!(meta.size, 1024);
    assert_eq!(bytes, data);

    // and the follow-up does not
    let result = read_file_bytes(&s.engine, &created.key, "pw").await;
    assert!(matches!(result, Err(ServerError::NotFound)));

    let hint = s.hints.recv().await.unwrap();
    assert!(!hint.file_path.is_empty());
}

#[tokio::test]
async fn test_file_read_consumes_shared_meta_budget() {
    let s = stack().await;
    let data = b"0123456789".to_vec();

    let created = create_with_file(&s.engine, Some("t"), "t.bin", &data, 1, "pw")
        .await
        .unwrap();

    let (_, bytes) = read_file_bytes(&s.engine, &created.key, "pw").await.unwrap();
    assert_eq!(bytes, data);

    // the file read spent the metadata budget; the text read cannot proceed
    let result = s.engine.read_text(&created.key, "pw").await;
    assert!(matches!(result, Err(ServerError::NoAttempts)));
}

#[tokio::test]
async fn test_wrong_password_is_non_consuming() {
    let s = stack().await;
    let created = create_text(&s.engine, "secret", 1, Some("pw")).await.unwrap();

    for _ in 0..3 {
        let result = s.engine.read_text(&created.key, "wrong").await;
        assert!(matches!(result, Err(ServerError::WrongSecret)));
    }

    // the budget was not touched
    let outcome = s.engine.read_text(&created.key, "pw").await.unwrap();
    assert_eq!(outcome.text, "secret");
}

#[tokio::test]
async fn test_wrong_password_on_file_leaves_blob_budget() {
    let s = stack().await;
    let data = vec![1u8; 64];
    let created = create_with_file(&s.engine, None, "f", &data, 1, "pw")
        .await
        .unwrap();

    let result = read_file_bytes(&s.engine, &created.key, "wrong").await;
    assert!(matches!(result, Err(ServerError::WrongSecret)));
    assert_eq!(s.blobs.used(), 64);

    let (_, bytes) = read_file_bytes(&s.engine, &created.key, "pw").await.unwrap();
    assert_eq!(bytes, data);
}

#[tokio::test]
async fn test_read_file_without_file_is_no_content() {
    let s = stack().await;
    let created = create_text(&s.engine, "only text", 1, Some("pw")).await.unwrap();
    let result = read_file_bytes(&s.engine, &created.key, "pw").await;
    assert!(matches!(result, Err(ServerError::NoFile)));
}

#[tokio::test]
async fn test_missing_key_not_found() {
    let s = stack().await;
    let result = s.engine.read_text(&uuid::Uuid::new_v4(), "pw").await;
    assert!(matches!(result, Err(ServerError::NotFound)));
}

#[tokio::test]
async fn test_at_most_n_reads_under_concurrency() {
    let s = stack().await;
    let times = 2;
    let created = create_text(&s.engine, "contested", times, Some("pw"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..(2 * times) {
        let engine = s.engine.clone();
        let key = created.key;
        tasks.push(tokio::spawn(
            async move { engine.read_text(&key, "pw").await },
        ));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(outcome) => {
                assert_eq!(outcome.text, "contested");
                successes += 1;
            }
            Err(ServerError::NotFound) | Err(ServerError::NoAttempts) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, times);
}

#[tokio::test]
async fn test_storage_full_when_capacity_exceeded() {
    let s = stack_with(1000, 1 << 20).await;
    let data = vec![0u8; 700];

    let a = create_with_file(&s.engine, None, "a", &data, 1, "pw").await;
    let b = create_with_file(&s.engine, None, "b", &data, 1, "pw").await;

    let oks = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(oks, 1);
    assert!(matches!(
        [a, b].into_iter().find(|r| r.is_err()).unwrap(),
        Err(ServerError::StorageFull)
    ));

    // the failed upload released its partial reservation
    assert_eq!(s.blobs.used(), 700);
}

#[tokio::test]
async fn test_failed_upload_leaves_no_blob() {
    let s = stack_with(1 << 20, 100).await;
    let too_big = vec![0u8; 200];

    let result = create_with_file(&s.engine, None, "big", &too_big, 1, "pw").await;
    assert!(matches!(result, Err(ServerError::FileTooLarge)));
    assert_eq!(s.blobs.used(), 0);
}

#[tokio::test]
async fn test_blob_count_matches_files_on_disk() {
    let s = stack().await;
    for i in 0..3 {
        let data = vec![i as u8; 100 * (i + 1)];
        create_with_file(&s.engine, None, "f", &data, 1, "pw")
            .await
            .unwrap();
    }
    assert_eq!(s.blobs.used(), 100 + 200 + 300);
}
