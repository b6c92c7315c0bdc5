use std::future::Future;

use tokio::sync::OnceCell;

use crate::error::StorageResult;

/// Lazily established connection state owned by a driver.
///
/// The first caller runs the initializer; callers arriving meanwhile wait on
/// that attempt instead of starting their own. A failed attempt leaves the
/// cell empty so a later call can retry.
#[derive(Debug)]
pub struct ReadyState<T> {
    cell: OnceCell<T>,
}

impl<T> ReadyState<T> {
    pub fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> StorageResult<&T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        self.cell.get_or_try_init(init).await
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }
}

impl<T> Default for ReadyState<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_attempt() {
        let state = Arc::new(ReadyState::<u32>::new());
        let attempts = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let state = state.clone();
                let attempts = attempts.clone();
                tokio::spawn(async move {
                    let value = state
                        .get_or_try_init(|| async {
                            attempts.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(7)
                        })
                        .await
                        .unwrap();
                    *value
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_failed_attempt_can_be_retried() {
        let state = ReadyState::<u32>::new();

        let first = state
            .get_or_try_init(|| async { Err(StorageError::Connection("down".into())) })
            .await;
        assert!(first.is_err());
        assert!(!state.is_ready());

        let second = state.get_or_try_init(|| async { Ok(1) }).await.unwrap();
        assert_eq!(*second, 1);

        let cached = state
            .get_or_try_init(|| async { Err(StorageError::Connection("unused".into())) })
            .await
            .unwrap();
        assert_eq!(*cached, 1);
    }
}
