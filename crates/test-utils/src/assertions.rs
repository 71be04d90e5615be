//! Polling assertions for asynchronous conditions.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Polls `condition` until it returns true or `timeout` elapses.
///
/// # Panics
///
/// Panics with `message` if the condition does not become true in time.
pub async fn assert_eventually<F, Fut>(timeout: Duration, message: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        if Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}: {message}");
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_eventually_passes_once_condition_holds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        assert_eventually(Duration::from_secs(2), "counter reaches 3", move || {
            let calls = Arc::clone(&calls_clone);
            async move { calls.fetch_add(1, Ordering::SeqCst) >= 2 }
        })
        .await;
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    #[should_panic(expected = "never true")]
    async fn test_eventually_panics_on_timeout() {
        assert_eventually(Duration::from_millis(150), "never true", || async { false }).await;
    }
}
