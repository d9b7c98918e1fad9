use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

pub const SAVED_VISIBLE_FOR: Duration = Duration::from_secs(2);
pub const ERROR_VISIBLE_FOR: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatusKind {
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncStatus {
    pub kind: SyncStatusKind,
    pub message: String,
}

/// Transient status pill. `saved` and `error` clear themselves; a newer
/// status cancels the pending clear of an older one.
#[derive(Debug, Clone)]
pub struct SyncStatusSignal {
    sender: Arc<watch::Sender<Option<SyncStatus>>>,
    generation: Arc<AtomicU64>,
}

impl Default for SyncStatusSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatusSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SyncStatus>> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> Option<SyncStatus> {
        self.sender.borrow().clone()
    }

    pub fn saving(&self, message: &str) {
        self.publish(SyncStatusKind::Saving, message);
    }

    pub fn saved(&self, message: &str) {
        self.publish(SyncStatusKind::Saved, message);
    }

    pub fn error(&self, message: &str) {
        self.publish(SyncStatusKind::Error, message);
    }

    pub fn publish(&self, kind: SyncStatusKind, message: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.sender.send_replace(Some(SyncStatus {
            kind,
            message: message.to_string(),
        }));

        let visible_for = match kind {
            SyncStatusKind::Saving => return,
            SyncStatusKind::Saved => SAVED_VISIBLE_FOR,
            SyncStatusKind::Error => ERROR_VISIBLE_FOR,
        };
        // Outside a runtime the status simply stays until replaced.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let sender = Arc::clone(&self.sender);
        let latest = Arc::clone(&self.generation);
        handle.spawn(async move {
            tokio::time::sleep(visible_for).await;
            sender.send_if_modified(|status| {
                if latest.load(Ordering::SeqCst) != generation || status.is_none() {
                    return false;
                }
                *status = None;
                true
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_stays_without_runtime() {
        let signal = SyncStatusSignal::new();
        signal.saved("Saved");
        assert_eq!(
            signal.current(),
            Some(SyncStatus {
                kind: SyncStatusKind::Saved,
                message: "Saved".to_string(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn saved_clears_after_two_seconds() {
        let signal = SyncStatusSignal::new();
        let receiver = signal.subscribe();

        signal.saved("Moved");
        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert_eq!(
            receiver.borrow().as_ref().map(|status| status.kind),
            Some(SyncStatusKind::Saved)
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(*receiver.borrow(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn error_lingers_longer_than_saved() {
        let signal = SyncStatusSignal::new();
        signal.error("Move failed");

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(
            signal.current().map(|status| status.message),
            Some("Move failed".to_string())
        );

        tokio::time::sleep(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert_eq!(signal.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_status_cancels_pending_clear() {
        let signal = SyncStatusSignal::new();
        signal.saved("Saved");
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        signal.saving("Updating...");

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        tokio::task::yield_now().await;
        assert_eq!(
            signal.current().map(|status| status.kind),
            Some(SyncStatusKind::Saving)
        );
    }
}
