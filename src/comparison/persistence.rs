use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::selection::Selection;
use crate::identifiers::ProductId;
use crate::storage::StorageClient;

/// Name of the persisted selection inside a session's storage prefix.
pub const STORAGE_KEY: &str = "comparisonProducts";

pub fn storage_key(session_id: Uuid) -> String {
    format!("sessions/{session_id}/{STORAGE_KEY}")
}

enum WriteOp {
    Write(Vec<ProductId>),
    Flush(oneshot::Sender<()>),
}

/// Mirrors a session's selection into durable storage.
///
/// Writes go through a single writer task in the order they were issued,
/// so the stored value always converges to the latest selection. Nothing
/// is written before [`PersistenceAdapter::mark_hydrated`], so an empty
/// selection seen during start-up can't clobber what is stored.
pub struct PersistenceAdapter {
    storage: Arc<dyn StorageClient>,
    key: String,
    hydrated: AtomicBool,
    closed: AtomicBool,
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl PersistenceAdapter {
    /// Must be called inside a tokio runtime; spawns the writer task.
    pub fn new(storage: Arc<dyn StorageClient>, key: String) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(storage.clone(), key.clone(), rx));
        Self {
            storage,
            key,
            hydrated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            tx,
        }
    }

    /// Reads the stored selection. Invalid entries are dropped and the
    /// result capped; an unreadable or corrupt value is cleared and yields
    /// an empty selection.
    pub async fn hydrate(&self) -> Selection {
        match self.read().await {
            Ok(selection) => selection,
            Err(e) => {
                warn!(error = %format!("{e:#}"), key = %self.key, "resetting persisted selection");
                if let Err(e) = self.storage.delete_object(&self.key).await {
                    error!(error = %e, key = %self.key, "failed to clear persisted selection");
                }
                Selection::new()
            }
        }
    }

    async fn read(&self) -> anyhow::Result<Selection> {
        let Some(body) = self
            .storage
            .get_object(&self.key)
            .await
            .context("read persisted selection")?
        else {
            return Ok(Selection::new());
        };
        // non-string entries are dropped one by one; only a non-array
        // document counts as corrupt
        let raw: Vec<serde_json::Value> =
            serde_json::from_slice(&body).context("parse persisted selection")?;
        let selection = Selection::seeded(
            raw.iter()
                .filter_map(|v| v.as_str().and_then(ProductId::parse)),
        );
        if selection.len() < raw.len() {
            debug!(stored = raw.len(), kept = selection.len(), "dropped invalid persisted entries");
        }
        Ok(selection)
    }

    /// Enables writes from here on.
    pub fn mark_hydrated(&self) {
        self.hydrated.store(true, Ordering::SeqCst);
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::SeqCst)
    }

    /// Queues a write of `selection`. Returns immediately; ignored before
    /// hydration and after close.
    pub fn sync(&self, selection: &Selection) {
        if !self.is_hydrated() || self.closed.load(Ordering::SeqCst) {
            return;
        }
        if self.tx.send(WriteOp::Write(selection.ids().to_vec())).is_err() {
            warn!(key = %self.key, "persistence writer gone; write dropped");
        }
    }

    /// Waits until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Flushes pending writes and refuses later ones.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.flush().await;
    }
}

async fn run_writer(
    storage: Arc<dyn StorageClient>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Write(ids) => {
                let body = match serde_json::to_vec(&ids) {
                    Ok(body) => body,
                    Err(e) => {
                        error!(error = %e, "serialize selection");
                        continue;
                    }
                };
                match storage
                    .put_object(&key, Bytes::from(body), "application/json")
                    .await
                {
                    Ok(()) => debug!(%key, count = ids.len(), "persisted selection"),
                    Err(e) => warn!(error = %e, %key, "persist selection failed"),
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const IDS: [&str; 3] = [
        "0f8fad5b-d9cb-469f-a165-70867728950e",
        "7c9e6679-7425-40de-944b-e07fc1f90ae7",
        "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
    ];

    fn adapter(storage: &MemoryStorage) -> PersistenceAdapter {
        PersistenceAdapter::new(Arc::new(storage.clone()), storage_key(Uuid::nil()))
    }

    async fn stored(storage: &MemoryStorage) -> Option<serde_json::Value> {
        storage
            .get_object(&storage_key(Uuid::nil()))
            .await
            .unwrap()
            .map(|b| serde_json::from_slice(&b).unwrap())
    }

    #[test]
    fn key_is_namespaced_per_session() {
        assert_eq!(
            storage_key(Uuid::nil()),
            "sessions/00000000-0000-0000-0000-000000000000/comparisonProducts"
        );
    }

    #[tokio::test]
    async fn selection_survives_restart() {
        let storage = MemoryStorage::new();
        let first = adapter(&storage);
        assert!(first.hydrate().await.is_empty());
        first.mark_hydrated();
        let selection = Selection::new().add_many(&IDS.join(","));
        first.sync(&selection);
        first.close().await;

        let second = adapter(&storage);
        let restored = second.hydrate().await;
        assert_eq!(restored, selection);
        assert_eq!(restored.len(), 3);
    }

    #[tokio::test]
    async fn corrupt_value_is_cleared() {
        let storage = MemoryStorage::new();
        storage
            .put_object(&storage_key(Uuid::nil()), Bytes::from_static(b"{not json"), "application/json")
            .await
            .unwrap();

        let persistence = adapter(&storage);
        assert!(persistence.hydrate().await.is_empty());
        assert!(!storage.contains(&storage_key(Uuid::nil())));
    }

    #[tokio::test]
    async fn invalid_entries_are_dropped_and_capped() {
        let storage = MemoryStorage::new();
        let raw = serde_json::json!([
            IDS[0],
            "nope",
            IDS[1],
            IDS[0],
            IDS[2],
            "6fa459ea-ee8a-3ca4-894e-db77e160355e",
            "886313e1-3b8a-5372-9b90-0c9aee199e5d"
        ]);
        storage
            .put_object(
                &storage_key(Uuid::nil()),
                Bytes::from(raw.to_string()),
                "application/json",
            )
            .await
            .unwrap();

        let selection = adapter(&storage).hydrate().await;
        let got: Vec<String> = selection.ids().iter().map(ToString::to_string).collect();
        assert_eq!(
            got,
            vec![IDS[0], IDS[1], IDS[2], "6fa459ea-ee8a-3ca4-894e-db77e160355e"]
        );
    }

    #[tokio::test]
    async fn non_string_entries_are_dropped_individually() {
        let storage = MemoryStorage::new();
        let raw = serde_json::json!([123, IDS[0], null, {"id": IDS[1]}, IDS[1]]);
        storage
            .put_object(
                &storage_key(Uuid::nil()),
                Bytes::from(raw.to_string()),
                "application/json",
            )
            .await
            .unwrap();

        let selection = adapter(&storage).hydrate().await;
        let got: Vec<String> = selection.ids().iter().map(ToString::to_string).collect();
        assert_eq!(got, vec![IDS[0], IDS[1]]);
        assert!(storage.contains(&storage_key(Uuid::nil())));
    }

    #[tokio::test]
    async fn non_array_document_is_cleared() {
        let storage = MemoryStorage::new();
        storage
            .put_object(
                &storage_key(Uuid::nil()),
                Bytes::from_static(br#"{"ids": []}"#),
                "application/json",
            )
            .await
            .unwrap();

        assert!(adapter(&storage).hydrate().await.is_empty());
        assert!(!storage.contains(&storage_key(Uuid::nil())));
    }

    #[tokio::test]
    async fn no_writes_before_hydration() {
        let storage = MemoryStorage::new();
        let persistence = adapter(&storage);
        persistence.sync(&Selection::new());
        persistence.flush().await;
        assert!(stored(&storage).await.is_none());
    }

    #[tokio::test]
    async fn writes_land_in_issue_order() {
        let storage = MemoryStorage::new();
        let persistence = adapter(&storage);
        persistence.mark_hydrated();

        let mut selection = Selection::new();
        for id in IDS {
            selection = selection.add_many(id);
            persistence.sync(&selection);
        }
        persistence.sync(&selection.clear());
        persistence.flush().await;
        assert_eq!(stored(&storage).await, Some(serde_json::json!([])));
    }

    #[tokio::test]
    async fn closed_adapter_ignores_writes() {
        let storage = MemoryStorage::new();
        let persistence = adapter(&storage);
        persistence.mark_hydrated();
        persistence.close().await;
        persistence.sync(&Selection::new().add_many(IDS[0]));
        persistence.flush().await;
        assert!(stored(&storage).await.is_none());
    }
}
