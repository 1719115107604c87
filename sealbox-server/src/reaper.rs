//! Background eviction of expired and exhausted items.

use std::path::Path;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::blob::BlobStore;
use crate::db::items::Store;
use crate::error::Result;

/// Buffer of the deletion channel. Producers use `try_send`; anything that
/// does not fit waits for the next periodic sweep.
pub const QUEUE_CAPACITY: usize = 16;

/// An item the engine observed to be exhausted, queued for prompt removal.
#[derive(Debug, Clone)]
pub struct DeleteHint {
    pub id: i64,
    pub file_path: String,
}

/// Spawn the reaper task.
///
/// It drains the deletion channel, sweeps on every `gc_period` tick, and
/// stops when the shutdown signal flips. Rows go first, then blobs, so a
/// crash between the two leaves only an orphan file for the next start.
pub fn spawn(
    store: Store,
    blobs: BlobStore,
    gc_period: Duration,
    mut hints: mpsc::Receiver<DeleteHint>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(gc_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately; skip it
        ticker.tick().await;
        tracing::info!(period = ?gc_period, "reaper running");

        loop {
            tokio::select! {
                Some(hint) = hints.recv() => {
                    if let Err(e) = delete_one(&store, &blobs, &hint).await {
                        tracing::error!(id = hint.id, error = %e, "on-demand delete failed");
                    } else {
                        tracing::info!(id = hint.id, "deleted exhausted item");
                    }
                }
                _ = ticker.tick() => {
                    match sweep(&store, &blobs).await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(count = n, "swept expired items"),
                        Err(e) => tracing::error!(error = %e, "sweep failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("reaper stopped");
    })
}

/// Remove one item on the engine's hint.
async fn delete_one(store: &Store, blobs: &BlobStore, hint: &DeleteHint) -> Result<()> {
    let mut tx = store.begin_write().await?;
    // affected-row count is ignored: the sweep may have won the race
    store.delete_by_ids(tx.conn(), &[hint.id]).await?;
    tx.commit().await?;

    if !hint.file_path.is_empty() {
        blobs.delete(Path::new(&hint.file_path)).await?;
    }
    Ok(())
}

/// One periodic sweep: collect expired or exhausted rows, delete them, then
/// unlink their blobs and release the reserved bytes.
async fn sweep(store: &Store, blobs: &BlobStore) -> Result<u64> {
    let mut tx = store.begin_write().await?;
    let doomed = store.expired_or_exhausted(tx.conn()).await?;
    if doomed.is_empty() {
        tx.commit().await?;
        return Ok(0);
    }
    let ids: Vec<i64> = doomed.iter().map(|(id, _)| *id).collect();
    let removed = store.delete_by_ids(tx.conn(), &ids).await?;
    tx.commit().await?;

    for (id, file_path) in &doomed {
        if file_path.is_empty() {
            continue;
        }
        if let Err(e) = blobs.delete(Path::new(file_path)).await {
            tracing::error!(id, error = %e, "blob delete during sweep failed");
        }
    }
    Ok(removed)
}
