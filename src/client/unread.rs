use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, broadcast::error::RecvError};
use uuid::Uuid;

use crate::client::Backend;
use crate::realtime::{ChangeEvent, ChangeKind, Table};

fn is_read(row: &JsonValue) -> bool {
    row.get("is_read").and_then(JsonValue::as_bool).unwrap_or(false)
}

/// Badge count of unread messages addressed to the signed-in profile.
#[derive(Clone)]
pub struct UnreadCounter {
    backend: Arc<dyn Backend>,
    me: Uuid,
    count: Arc<AtomicI64>,
}

impl UnreadCounter {
    pub fn new(backend: Arc<dyn Backend>, me: Uuid) -> Self {
        Self {
            backend,
            me,
            count: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    pub async fn refetch(&self) {
        match self.backend.unread_count().await {
            Ok(count) => self.count.store(count.max(0), Ordering::SeqCst),
            Err(e) => tracing::error!(error = %e, "failed to load unread count"),
        }
    }

    pub fn handle_event(&self, event: &ChangeEvent) {
        if event.table != Table::Messages || !event.mentions(self.me, &["receiver_id"]) {
            return;
        }
        match event.kind {
            ChangeKind::Insert if !is_read(&event.new) => {
                self.count.fetch_add(1, Ordering::SeqCst);
            }
            ChangeKind::Update => {
                let was_unread = event.old.as_ref().map_or(true, |old| !is_read(old));
                if was_unread && is_read(&event.new) {
                    // Floor at zero.
                    let _ = self
                        .count
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some((n - 1).max(0)));
                }
            }
            _ => {}
        }
    }

    pub async fn run(self, mut rx: broadcast::Receiver<ChangeEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) if event.is_resync() && event.table == Table::Messages => {
                    self.refetch().await;
                }
                Ok(event) => self.handle_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "unread feed lagged, refetching count");
                    self.refetch().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
