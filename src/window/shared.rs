//! Reference-counted multicast over a side-effecting stream.
//!
//! A [`SharedStream`] owns a factory for its upstream. The upstream is started
//! when the first registered [`Subscription`] is polled, every item is cloned
//! to all registered subscriptions, and the upstream is dropped as soon as the
//! last subscription goes away. Subscribing again afterwards starts a fresh
//! upstream from the factory.

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Factory<T> = Box<dyn FnMut() -> BoxStream<'static, T> + Send>;

struct Hub<T> {
    factory: Factory<T>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<T>)>,
    pump: Option<JoinHandle<()>>,
    next_id: u64,
    connection: u64,
}

fn lock<T>(hub: &Mutex<Hub<T>>) -> MutexGuard<'_, Hub<T>> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publish/subscribe hub with subscriber-count-gated lifecycle.
pub struct SharedStream<T> {
    hub: Arc<Mutex<Hub<T>>>,
}

impl<T> Clone for SharedStream<T> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<T> fmt::Debug for SharedStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hub = lock(&self.hub);
        f.debug_struct("SharedStream")
            .field("subscribers", &hub.subscribers.len())
            .field("connected", &hub.pump.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> SharedStream<T> {
    /// Share the streams produced by `factory`, one per connection.
    pub fn new<F, S>(mut factory: F) -> Self
    where
        F: FnMut() -> S + Send + 'static,
        S: Stream<Item = T> + Send + 'static,
    {
        Self {
            hub: Arc::new(Mutex::new(Hub {
                factory: Box::new(move || factory().boxed()),
                subscribers: Vec::new(),
                pump: None,
                next_id: 0,
                connection: 0,
            })),
        }
    }

    /// Share a single stream. Connections after the first see an empty stream.
    pub fn from_stream<S>(source: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let mut source = Some(source.boxed());
        Self::new(move || source.take().unwrap_or_else(|| stream::empty().boxed()))
    }

    /// Register a new subscription.
    ///
    /// A subscription registered while the upstream is running joins it
    /// mid-stream. Otherwise the upstream starts on the first poll of any
    /// registered subscription, so subscriptions created together see the
    /// same items from the beginning.
    ///
    /// Subscriptions must be polled inside a tokio runtime.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut hub = lock(&self.hub);
        let id = hub.next_id;
        hub.next_id += 1;
        hub.subscribers.push((id, tx));
        Subscription {
            id,
            rx,
            hub: Arc::clone(&self.hub),
            connected: false,
        }
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.hub).subscribers.len()
    }

    /// Returns `true` while an upstream is running.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.hub).pump.is_some()
    }
}

fn connect<T: Clone + Send + 'static>(hub: &Arc<Mutex<Hub<T>>>, id: u64) {
    let mut guard = lock(hub);
    if guard.pump.is_some() || !guard.subscribers.iter().any(|(sub, _)| *sub == id) {
        return;
    }
    guard.connection += 1;
    let upstream = (guard.factory)();
    tracing::trace!(connection = guard.connection, "Starting shared upstream");
    guard.pump = Some(tokio::spawn(pump(
        upstream,
        Arc::downgrade(hub),
        guard.connection,
    )));
}

async fn pump<T: Clone + Send + 'static>(
    mut upstream: BoxStream<'static, T>,
    hub: Weak<Mutex<Hub<T>>>,
    connection: u64,
) {
    while let Some(item) = upstream.next().await {
        let Some(hub) = hub.upgrade() else {
            return;
        };
        let mut guard = lock(&hub);
        // An abort only lands at the next yield, and a ready upstream may
        // never yield. Stop as soon as this connection has been retired.
        if guard.connection != connection {
            tracing::trace!(connection, "Retired upstream stopped");
            return;
        }
        guard
            .subscribers
            .retain(|(_, tx)| tx.send(item.clone()).is_ok());
    }

    // Upstream finished: end every subscription of this connection.
    if let Some(hub) = hub.upgrade() {
        let mut guard = lock(&hub);
        if guard.connection == connection {
            tracing::trace!(connection, "Shared upstream completed");
            guard.subscribers.clear();
            guard.pump = None;
        }
    }
}

/// One consumer of a [`SharedStream`]. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    hub: Arc<Mutex<Hub<T>>>,
    connected: bool,
}

impl<T: Clone + Send + 'static> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.connected {
            self.connected = true;
            connect(&self.hub, self.id);
        }
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let mut hub = lock(&self.hub);
        hub.subscribers.retain(|(sub, _)| *sub != self.id);
        if hub.subscribers.is_empty() {
            if let Some(pump) = hub.pump.take() {
                tracing::trace!(connection = hub.connection, "Last subscriber left, stopping upstream");
                hub.connection += 1;
                pump.abort();
            }
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}
