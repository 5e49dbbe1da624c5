//! Thread-safe push queue between delivery threads and the tick thread.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::id::{SubscriptionId, UserToken};

/// A delivery waiting to be dispatched on the tick thread.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry<T> {
    /// Subscription id the delivery was made for.
    pub id: SubscriptionId,
    /// The delivered payload.
    pub payload: T,
    /// Token the backend handed back with the delivery.
    pub token: UserToken,
    /// When the delivery was queued.
    pub enqueued_at: Instant,
}

/// FIFO of pending entries.
///
/// The lock is held only to append or to swap the whole queue out; handlers
/// never run under it.
pub(crate) struct PushQueue<T> {
    entries: Mutex<Vec<PendingEntry<T>>>,
}

impl<T> PushQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, entry: PendingEntry<T>) {
        self.entries.lock().push(entry);
    }

    /// Removes and returns everything queued so far.
    pub(crate) fn take(&self) -> Vec<PendingEntry<T>> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drops every queued entry and returns how many there were.
    pub(crate) fn clear(&self) -> usize {
        self.take().len()
    }
}

/// Cloneable handle for queueing deliveries from any thread.
///
/// Pushing never blocks on the tick and never runs application code.
///
/// # Example
///
/// ```
/// use stream_bridge::dispatch::Pusher;
/// use stream_bridge::{CommandBinding, Dispatcher, MockBackend, UserToken};
/// use std::sync::Arc;
///
/// let dispatcher = Dispatcher::new(CommandBinding::new(Arc::new(MockBackend::new())));
/// let pusher = dispatcher.pusher();
///
/// let handle = std::thread::spawn(move || {
///     let result = stream_bridge::CommandResult::new("jump", "high");
///     pusher.push(result.id.clone(), result, UserToken::default());
/// });
/// handle.join().unwrap();
/// assert_eq!(dispatcher.pending_len(), 1);
/// ```
pub struct Pusher<T> {
    queue: Arc<PushQueue<T>>,
}

impl<T> Pusher<T> {
    pub(crate) fn new(queue: Arc<PushQueue<T>>) -> Self {
        Self { queue }
    }

    /// Queues a delivery for the next drain.
    pub fn push(&self, id: SubscriptionId, payload: T, token: UserToken) {
        self.queue.push(PendingEntry {
            id,
            payload,
            token,
            enqueued_at: Instant::now(),
        });
    }
}

impl<T> Clone for Pusher<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> std::fmt::Debug for Pusher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pusher")
            .field("pending", &self.queue.len())
            .finish()
    }
}
