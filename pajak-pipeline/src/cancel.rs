use std::collections::HashSet;

use tokio::sync::RwLock;

/// Process-wide table of batches with a pending cancellation request.
/// Cancellation is cooperative: the owning task consults the flag between
/// files and never interrupts an in-flight provider call.
#[derive(Default)]
pub struct CancellationRegistry {
    requested: RwLock<HashSet<String>>,
}

impl CancellationRegistry {
    pub async fn request(&self, batch_id: &str) {
        self.requested.write().await.insert(batch_id.to_string());
    }

    pub async fn is_requested(&self, batch_id: &str) -> bool {
        self.requested.read().await.contains(batch_id)
    }

    pub async fn clear(&self, batch_id: &str) {
        self.requested.write().await.remove(batch_id);
    }
}

/// Tracks which batch ids currently have a background task. A second task
/// for the same batch must never start; the store would otherwise see
/// interleaved writes to the same rows.
#[derive(Default)]
pub struct BatchOwnership {
    active: RwLock<HashSet<String>>,
}

impl BatchOwnership {
    /// Returns false when another task already owns the batch.
    pub async fn acquire(&self, batch_id: &str) -> bool {
        self.active.write().await.insert(batch_id.to_string())
    }

    pub async fn release(&self, batch_id: &str) {
        self.active.write().await.remove(batch_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ownership_is_exclusive_until_released() {
        let ownership = BatchOwnership::default();
        assert!(ownership.acquire("batch-1").await);
        assert!(!ownership.acquire("batch-1").await);
        assert!(ownership.acquire("batch-2").await);

        ownership.release("batch-1").await;
        assert!(ownership.acquire("batch-1").await);
    }

    #[tokio::test]
    async fn request_and_clear_round_trip() {
        let registry = CancellationRegistry::default();
        assert!(!registry.is_requested("batch-1").await);

        registry.request("batch-1").await;
        assert!(registry.is_requested("batch-1").await);
        assert!(!registry.is_requested("batch-2").await);

        registry.clear("batch-1").await;
        assert!(!registry.is_requested("batch-1").await);
    }
}
