//! Events published by the controllers and the subscriber registry that
//! delivers them.

use crate::git::FileStatus;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Operation a [`ChangeEvent`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitOperation {
    Stage,
    Unstage,
    Commit,
    Discard,
    MergeRestart,
    AbortRebase,
    ContinueRebase,
    AbortMerge,
}

/// A completed change to the index or working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub operation: GitOperation,
    pub affected_paths: BTreeSet<String>,
    pub affected_files: Vec<FileStatus>,
}

impl ChangeEvent {
    /// Event for an operation on specific files.
    pub fn for_files(operation: GitOperation, files: &[FileStatus]) -> Self {
        Self {
            operation,
            affected_paths: files.iter().map(|f| f.path.clone()).collect(),
            affected_files: files.to_vec(),
        }
    }

    /// Event that concerns the whole repository rather than listed files.
    pub fn repository_wide(operation: GitOperation) -> Self {
        Self {
            operation,
            affected_paths: BTreeSet::new(),
            affected_files: Vec::new(),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.affected_paths.iter().cloned().collect()
    }
}

/// Phase of a push or pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Started,
    Finished,
}

/// Progress of a push or pull, with the text to show for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPullEvent {
    pub status: ActionStatus,
    pub message: String,
}

impl PushPullEvent {
    pub fn started(message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Started,
            message: message.into(),
        }
    }

    pub fn finished(message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Finished,
            message: message.into(),
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback<E>)>,
}

/// Multi-subscriber event registry.
///
/// Delivery is synchronous on the emitting thread, in subscription order.
/// Callbacks run outside the registry lock, so a callback may subscribe or
/// emit without deadlocking.
pub struct EventBus<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        let mut registry = self.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(sub, _)| *sub != id);
        registry.subscribers.len() != before
    }

    pub fn emit(&self, event: &E) {
        let subscribers: Vec<Callback<E>> = self
            .lock()
            .subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in subscribers {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry<E>> {
        // a panicking subscriber must not take the registry down with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::ChangeType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_every_subscriber_receives_event() {
        let bus: EventBus<PushPullEvent> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["staged", "unstaged", "status-bar"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |e: &PushPullEvent| {
                seen.lock().unwrap().push(format!("{}:{}", name, e.message));
            });
        }

        bus.emit(&PushPullEvent::started("Push in progress"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "staged:Push in progress",
                "unstaged:Push in progress",
                "status-bar:Push in progress",
            ]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus: EventBus<ChangeEvent> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&ChangeEvent::repository_wide(GitOperation::Commit));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&ChangeEvent::repository_wide(GitOperation::Commit));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_emit_reentrantly() {
        let bus: EventBus<u32> = EventBus::new();
        let total = Arc::new(AtomicUsize::new(0));

        let inner_bus = bus.clone();
        let sum = Arc::clone(&total);
        bus.subscribe(move |n: &u32| {
            sum.fetch_add(*n as usize, Ordering::SeqCst);
            if *n > 0 {
                inner_bus.emit(&(n - 1));
            }
        });

        bus.emit(&3);
        assert_eq!(total.load(Ordering::SeqCst), 3 + 2 + 1);
    }

    #[test]
    fn test_change_event_collects_paths() {
        let files = vec![
            FileStatus::new(ChangeType::Modify, "b.txt"),
            FileStatus::new(ChangeType::Add, "a.txt"),
        ];
        let event = ChangeEvent::for_files(GitOperation::Stage, &files);
        assert_eq!(event.paths(), vec!["a.txt", "b.txt"]);
        assert_eq!(event.affected_files.len(), 2);
    }
}
