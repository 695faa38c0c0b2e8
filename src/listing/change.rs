//! List change notifications and their delivery.
//!
//! Changes are pushed onto an unbounded queue drained by a single dedicated task,
//! which forwards every batch to each current observer's own unbounded queue.
//! Producers on any worker thread therefore feed one total order, and a slow
//! observer never loses batches. Observers that subscribe late miss earlier
//! batches; there is no replay.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// What happened to a run of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Inserted,
    Changed,
    Removed,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Inserted => write!(f, "inserted"),
            ChangeKind::Changed => write!(f, "changed"),
            ChangeKind::Removed => write!(f, "removed"),
        }
    }
}

/// A contiguous run of affected positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChange {
    pub kind: ChangeKind,
    pub start: usize,
    pub count: usize,
}

impl ListChange {
    pub fn new(kind: ChangeKind, start: usize, count: usize) -> Self {
        Self { kind, start, count }
    }

    pub fn inserted(start: usize, count: usize) -> Self {
        Self::new(ChangeKind::Inserted, start, count)
    }

    pub fn changed(start: usize, count: usize) -> Self {
        Self::new(ChangeKind::Changed, start, count)
    }

    pub fn removed(start: usize, count: usize) -> Self {
        Self::new(ChangeKind::Removed, start, count)
    }

    /// Changes needed to turn a list of `old_size` rows into `new_size` rows when
    /// the first `stable` rows are untouched.
    ///
    /// Rows in `stable..min(old_size, new_size)` are reported as changed, growth as
    /// inserted at the old end, shrinkage as removed from the new end.
    pub fn resize(stable: usize, old_size: usize, new_size: usize) -> Vec<ListChange> {
        let mut changes = Vec::new();
        let common = old_size.min(new_size);
        if common > stable {
            changes.push(ListChange::changed(stable, common - stable));
        }
        if new_size > old_size {
            changes.push(ListChange::inserted(old_size, new_size - old_size));
        } else if old_size > new_size {
            changes.push(ListChange::removed(new_size, old_size - new_size));
        }
        changes
    }
}

/// Stream of change batches handed to an observer.
pub type ChangeStream = Pin<Box<dyn Stream<Item = Vec<ListChange>> + Send>>;

type Observers = Arc<Mutex<Vec<mpsc::UnboundedSender<Vec<ListChange>>>>>;

fn lock(observers: &Observers) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<Vec<ListChange>>>> {
    observers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serialized fan-out of change batches.
pub struct ChangeNotifier {
    queue: mpsc::UnboundedSender<Vec<ListChange>>,
    observers: Observers,
}

impl ChangeNotifier {
    /// Create a notifier and spawn its delivery task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let observers: Observers = Arc::default();
        let (queue, mut rx) = mpsc::unbounded_channel::<Vec<ListChange>>();

        let out = Arc::clone(&observers);
        tokio::spawn(async move {
            while let Some(changes) = rx.recv().await {
                // Observers whose stream was dropped are pruned here.
                lock(&out).retain(|observer| observer.send(changes.clone()).is_ok());
            }
            debug!("Change delivery queue closed");
        });

        Self { queue, observers }
    }

    /// Enqueue a batch for delivery. Empty batches are dropped.
    pub fn notify(&self, changes: Vec<ListChange>) {
        if changes.is_empty() {
            return;
        }
        if self.queue.send(changes).is_err() {
            warn!("Change delivery task is gone, dropping notification");
        }
    }

    /// Subscribe to every batch delivered from now on.
    ///
    /// The stream ends once the notifier is dropped and pending batches are out.
    pub fn subscribe(&self) -> ChangeStream {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.observers).push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    /// Number of observers currently subscribed.
    pub fn observer_count(&self) -> usize {
        let mut observers = lock(&self.observers);
        observers.retain(|observer| !observer.is_closed());
        observers.len()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;

    #[test]
    fn test_resize_growth_replaces_placeholder() {
        // 51 rows (50 loaded + placeholder) grow to 60 rows, last page final.
        let changes = ListChange::resize(50, 51, 60);
        assert_eq!(
            changes,
            vec![ListChange::changed(50, 1), ListChange::inserted(51, 9)]
        );
    }

    #[test]
    fn test_resize_shrink_drops_placeholder() {
        let changes = ListChange::resize(50, 51, 50);
        assert_eq!(changes, vec![ListChange::removed(50, 1)]);
    }

    #[test]
    fn test_resize_from_empty() {
        assert_eq!(ListChange::resize(0, 0, 26), vec![ListChange::inserted(0, 26)]);
        assert!(ListChange::resize(10, 10, 10).is_empty());
    }

    #[test]
    fn test_change_serializes_lowercase_kind() {
        let json = serde_json::to_string(&ListChange::inserted(3, 4)).unwrap();
        assert_eq!(json, r#"{"kind":"inserted","start":3,"count":4}"#);
    }

    #[tokio::test]
    async fn test_broadcast_to_all_observers_in_order() {
        let notifier = ChangeNotifier::new();
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();
        assert_eq!(notifier.observer_count(), 2);

        notifier.notify(vec![ListChange::inserted(0, 25)]);
        notifier.notify(vec![]);
        notifier.notify(vec![ListChange::changed(25, 1), ListChange::inserted(26, 5)]);

        for stream in [&mut first, &mut second] {
            assert_eq!(stream.next().await, Some(vec![ListChange::inserted(0, 25)]));
            assert_eq!(
                stream.next().await,
                Some(vec![ListChange::changed(25, 1), ListChange::inserted(26, 5)])
            );
        }
    }

    #[tokio::test]
    async fn test_stream_ends_when_notifier_dropped() {
        let notifier = ChangeNotifier::new();
        let mut stream = notifier.subscribe();
        notifier.notify(vec![ListChange::removed(0, 2)]);
        drop(notifier);

        assert_eq!(stream.next().await, Some(vec![ListChange::removed(0, 2)]));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_slow_observer_keeps_every_batch() {
        let notifier = ChangeNotifier::new();
        let mut stream = notifier.subscribe();

        for start in 0..500 {
            notifier.notify(vec![ListChange::inserted(start, 1)]);
        }
        drop(notifier);

        let mut starts = Vec::new();
        while let Some(batch) = stream.next().await {
            starts.extend(batch.iter().map(|change| change.start));
        }
        assert_eq!(starts, (0..500).collect::<Vec<usize>>());
    }

    #[tokio::test]
    async fn test_dropped_observer_is_pruned() {
        let notifier = ChangeNotifier::new();
        let kept = notifier.subscribe();
        let dropped = notifier.subscribe();
        assert_eq!(notifier.observer_count(), 2);

        drop(dropped);
        assert_eq!(notifier.observer_count(), 1);
        drop(kept);
        assert_eq!(notifier.observer_count(), 0);
    }
}
