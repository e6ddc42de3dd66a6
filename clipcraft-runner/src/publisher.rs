//! Status publisher
//!
//! Delivers run events to observers. Observers are either synchronous
//! callbacks or unbounded channels for async consumers. Delivery is
//! serialized, so every observer sees events in the order they were
//! published; state is in memory only.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use clipcraft_core::domain::event::RunEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Callback invoked for every published event
pub type EventCallback = Arc<dyn Fn(&RunEvent) + Send + Sync>;

/// Identifies a subscription for [`StatusPublisher::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

#[derive(Clone)]
enum Subscriber {
    Callback(EventCallback),
    Channel(mpsc::UnboundedSender<RunEvent>),
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, Subscriber>>,
    delivery: Mutex<()>,
    /// Thread currently delivering, if any
    owner: Mutex<Option<ThreadId>>,
    /// Events published from inside a callback, delivered next
    pending: Mutex<VecDeque<RunEvent>>,
}

/// Fan-out of run events to subscribers
///
/// Cheap to clone; clones share the same subscriber set.
#[derive(Clone, Default)]
pub struct StatusPublisher {
    inner: Arc<Inner>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for every subsequent event
    ///
    /// Callbacks run on the publishing thread and must not block. A callback
    /// may publish: its events are queued and delivered to everyone once
    /// the event being delivered has reached all subscribers.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        self.insert(Subscriber::Callback(Arc::new(callback)))
    }

    /// Registers a channel receiving every subsequent event
    ///
    /// Dropping the receiver ends the subscription on the next publish.
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.insert(Subscriber::Channel(tx)), rx)
    }

    /// Stops delivery to a subscription
    ///
    /// Returns `false` if the handle was not (or no longer) subscribed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = lock(&self.inner.subscribers).remove(&handle.0).is_some();
        if removed {
            debug!("Subscription {} removed", handle.0);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    /// Delivers one event to every current subscriber
    pub fn publish(&self, event: &RunEvent) {
        self.publish_all(std::slice::from_ref(event));
    }

    /// Delivers a batch of events, keeping their order
    pub fn publish_all(&self, events: &[RunEvent]) {
        if events.is_empty() {
            return;
        }
        if self.delivering_here() {
            lock(&self.inner.pending).extend(events.iter().cloned());
            return;
        }

        let _delivery = lock(&self.inner.delivery);
        let _owner = DeliveryOwner::claim(&self.inner.owner);
        for event in events {
            self.deliver(event);
            self.deliver_pending();
        }
    }

    fn delivering_here(&self) -> bool {
        *lock(&self.inner.owner) == Some(thread::current().id())
    }

    fn deliver_pending(&self) {
        loop {
            let next = lock(&self.inner.pending).pop_front();
            let Some(event) = next else { break };
            self.deliver(&event);
        }
    }

    fn deliver(&self, event: &RunEvent) {
        // Snapshot so callbacks may unsubscribe without deadlocking
        let snapshot: Vec<(u64, Subscriber)> = lock(&self.inner.subscribers)
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, subscriber) in snapshot {
            match subscriber {
                Subscriber::Callback(callback) => callback(event),
                Subscriber::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        closed.push(id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = lock(&self.inner.subscribers);
            for id in closed {
                debug!("Subscription {} closed by receiver", id);
                subscribers.remove(&id);
            }
        }
    }

    fn insert(&self, subscriber: Subscriber) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.subscribers).insert(id, subscriber);
        debug!("Subscription {} added", id);
        SubscriptionHandle(id)
    }
}

impl std::fmt::Debug for StatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPublisher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Marks the current thread as delivering until dropped
struct DeliveryOwner<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> DeliveryOwner<'a> {
    fn claim(owner: &'a Mutex<Option<ThreadId>>) -> Self {
        *lock(owner) = Some(thread::current().id());
        Self(owner)
    }
}

impl Drop for DeliveryOwner<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipcraft_core::domain::event::RunEventKind;
    use clipcraft_core::domain::run::RunStatus;
    use uuid::Uuid;

    fn event(sequence: u64) -> RunEvent {
        RunEvent {
            run_id: Uuid::nil(),
            sequence,
            stage_index: 0,
            percent: 0,
            status: RunStatus::Running,
            kind: RunEventKind::Started,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_callback_receives_events_in_order() {
        let publisher = StatusPublisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        publisher.subscribe(move |e| sink.lock().unwrap().push(e.sequence));

        publisher.publish_all(&[event(0), event(1), event(2)]);
        publisher.publish(&event(3));

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let publisher = StatusPublisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let handle = publisher.subscribe(move |e| sink.lock().unwrap().push(e.sequence));

        publisher.publish(&event(0));
        assert!(publisher.unsubscribe(handle));
        publisher.publish(&event(1));

        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert!(!publisher.unsubscribe(handle));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let publisher = StatusPublisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle_slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        let slot = Arc::clone(&handle_slot);
        let inner = publisher.clone();
        let handle = publisher.subscribe(move |e| {
            sink.lock().unwrap().push(e.sequence);
            if let Some(handle) = *slot.lock().unwrap() {
                inner.unsubscribe(handle);
            }
        });
        *handle_slot.lock().unwrap() = Some(handle);

        publisher.publish_all(&[event(0), event(1)]);

        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let publisher = StatusPublisher::new();
        let (_handle, mut rx) = publisher.subscribe_channel();

        publisher.publish_all(&[event(7), event(8)]);

        assert_eq!(rx.recv().await.unwrap().sequence, 7);
        assert_eq!(rx.recv().await.unwrap().sequence, 8);
    }

    #[test]
    fn test_dropped_channel_is_pruned() {
        let publisher = StatusPublisher::new();
        let (_handle, rx) = publisher.subscribe_channel();
        assert_eq!(publisher.subscriber_count(), 1);

        drop(rx);
        publisher.publish(&event(0));

        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_from_inside_callback() {
        let publisher = StatusPublisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = publisher.clone();
        publisher.subscribe(move |e| {
            if e.sequence == 0 {
                inner.publish(&event(10));
            }
        });
        let sink = Arc::clone(&seen);
        publisher.subscribe(move |e| sink.lock().unwrap().push(e.sequence));

        publisher.publish_all(&[event(0), event(1)]);

        // The nested event follows the one that triggered it
        assert_eq!(*seen.lock().unwrap(), vec![0, 10, 1]);
    }
}
