//! TTL Cleanup Task
//!
//! Background task that periodically purges expired slots from the
//! in-process backend. Reads already evict lazily; this bounds the memory
//! held by keys nobody reads again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::MemoryBackend;

/// Spawns a background task that periodically purges expired slots.
///
/// # Arguments
/// * `backend` - Handle sharing the keyspace to clean
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let backend = MemoryBackend::new();
/// let cleanup_handle = spawn_cleanup_task(backend.clone(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(backend: MemoryBackend, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = backend.purge_expired().await;

            if removed > 0 {
                info!("TTL cleanup: removed {} expired keys", removed);
            } else {
                debug!("TTL cleanup: no expired keys found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_keys() {
        let backend = MemoryBackend::new();
        backend
            .set_with_expiry("expire_soon", 1, b"value".to_vec())
            .await
            .unwrap();

        let handle = spawn_cleanup_task(backend.clone(), 1);

        // Wait for the key to expire and a cleanup run to pass
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(backend.len().await, 0, "Expired key should have been purged");

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_live_keys() {
        let backend = MemoryBackend::new();
        backend
            .set_with_expiry("long_lived", 3600, b"value".to_vec())
            .await
            .unwrap();
        backend
            .set_add("entity:user:1", &["cache:f:abc".to_string()])
            .await
            .unwrap();

        let handle = spawn_cleanup_task(backend.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(backend.len().await, 2);
        assert_eq!(
            backend.get("long_lived").await.unwrap(),
            Some(b"value".to_vec())
        );

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let handle = spawn_cleanup_task(MemoryBackend::new(), 1);

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
