//! Per-pass deadline for store calls.

use std::future::Future;

use tokio::time::{Instant, timeout_at};

use crate::error::StoreError;

/// Runs `call` unless `deadline` passes first.
///
/// `operation` names the call in the resulting [`StoreError::DeadlineExceeded`].
pub async fn with_deadline<T, F>(deadline: Instant, operation: &'static str, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match timeout_at(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::DeadlineExceeded(operation)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_cancels_call() {
        let deadline = Instant::now() + Duration::from_secs(1);
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        };

        let err = with_deadline(deadline, "list pods", slow).await.unwrap_err();
        assert!(matches!(err, StoreError::DeadlineExceeded("list pods")));
    }

    #[tokio::test]
    async fn test_call_within_deadline_passes_result_through() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let value = with_deadline(deadline, "get service", async { Ok::<_, StoreError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
