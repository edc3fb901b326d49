//! Coalesced refetching.
//!
//! Event handlers only bump a version counter. One task per view waits for a
//! bump, lets the settle window pass, and refetches once for every mark seen
//! in that window.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, broadcast::error::RecvError, watch};

use crate::realtime::ChangeEvent;

#[derive(Debug, Clone)]
pub struct DirtyFlag {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for DirtyFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtyFlag {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn mark(&self) {
        self.tx.send_modify(|version| *version = version.wrapping_add(1));
    }

    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }

    /// A receiver that has already seen the current version.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

/// Runs `refetch` once per settled burst of marks. Returns when every
/// [`DirtyFlag`] clone has been dropped.
pub async fn coalesce<F, Fut>(mut rx: watch::Receiver<u64>, settle: Duration, mut refetch: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while rx.changed().await.is_ok() {
        tokio::time::sleep(settle).await;
        let version = *rx.borrow_and_update();
        tracing::debug!(version, "refetching after settle window");
        refetch().await;
    }
}

/// Feeds change events to `on_event` until the feed closes, with a coalescing
/// refetch task running alongside. A lagged feed counts as a dirty mark.
pub async fn drive<H, F, Fut>(
    mut rx: broadcast::Receiver<ChangeEvent>,
    dirty: &DirtyFlag,
    settle: Duration,
    mut on_event: H,
    refetch: F,
) where
    H: FnMut(&ChangeEvent),
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(coalesce(dirty.subscribe(), settle, refetch));
    loop {
        match rx.recv().await {
            Ok(event) => on_event(&event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "change feed lagged, scheduling refetch");
                dirty.mark();
            }
            Err(RecvError::Closed) => break,
        }
    }
    task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn burst_of_marks_refetches_once() {
        let dirty = DirtyFlag::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let task = tokio::spawn(coalesce(
            dirty.subscribe(),
            Duration::from_millis(500),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        for _ in 0..5 {
            dirty.mark();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        dirty.mark();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(dirty.version(), 6);

        drop(dirty);
        task.await.unwrap();
    }
}
