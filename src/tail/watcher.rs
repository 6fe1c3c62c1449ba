//! Per-file change notifications.
//!
//! [`ChangeWatcher`] is the seam between tailing and the OS notification
//! layer. [`NotifyWatcher`] is backed by `notify` (optionally debounced);
//! [`ChannelWatcher`] is driven by hand, for callers that already have their
//! own change source.
//!
//! Both keep a registry keyed by file path: a path is registered on its first
//! subscription and removed again when the last subscription is dropped.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use notify_debouncer_full::{
    new_debouncer,
    notify::{self, EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult,
};
use tokio::sync::mpsc;

use super::error::TailError;

/// A "this file changed" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// The watched path the change applies to.
    pub path: PathBuf,
}

/// Item delivered on a change subscription.
pub type ChangeResult = Result<FileChange, TailError>;

/// Source of per-file change notifications.
///
/// Notifications are at-least-once per modification but may be spurious or
/// missing entirely; consumers poll as a fallback.
pub trait ChangeWatcher: Send + Sync {
    /// Subscribe to changes of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying watch cannot be registered.
    fn subscribe(&self, path: &Path) -> Result<ChangeSubscription, TailError>;
}

/// One subscription to a file's change notifications.
///
/// Dropping the subscription unsubscribes.
pub struct ChangeSubscription {
    rx: mpsc::UnboundedReceiver<ChangeResult>,
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ChangeSubscription {
    /// Build a subscription from a receiver and a cleanup hook run on drop.
    pub fn new(
        rx: mpsc::UnboundedReceiver<ChangeResult>,
        unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            rx,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Wait for the next notification. `None` once the watcher is gone.
    pub async fn recv(&mut self) -> Option<ChangeResult> {
        self.rx.recv().await
    }
}

impl Stream for ChangeSubscription {
    type Item = ChangeResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription").finish_non_exhaustive()
    }
}

/// OS watch kept alive for a registered path; never read, only dropped.
type WatchHandle = Box<dyn Any + Send>;

struct WatchEntry {
    listeners: Vec<(u64, mpsc::UnboundedSender<ChangeResult>)>,
    _handle: Option<WatchHandle>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<PathBuf, WatchEntry>,
    next_id: u64,
}

impl Registry {
    fn add_listener(&mut self, key: &Path, tx: mpsc::UnboundedSender<ChangeResult>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.listeners.push((id, tx));
        }
        id
    }

    /// Remove one listener; the whole entry goes once it has none left.
    fn remove_listener(&mut self, key: &Path, id: u64) -> Option<WatchEntry> {
        let entry = self.entries.get_mut(key)?;
        entry.listeners.retain(|(listener, _)| *listener != id);
        if entry.listeners.is_empty() {
            tracing::debug!(path = %key.display(), "Unregistered file watch");
            self.entries.remove(key)
        } else {
            None
        }
    }

    fn dispatch(&mut self, key: &Path, item: &ChangeResult) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.listeners.retain(|(_, tx)| tx.send(item.clone()).is_ok());
        }
    }
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry key for a path: canonical when the file exists.
fn watch_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Register a new listener for `key`, building the entry with `make_handle`
/// on first use.
fn register(
    registry: &SharedRegistry,
    key: PathBuf,
    make_handle: impl FnOnce() -> Result<Option<WatchHandle>, TailError>,
) -> Result<ChangeSubscription, TailError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = {
        let mut guard = lock(registry);
        if !guard.entries.contains_key(&key) {
            let handle = make_handle()?;
            tracing::debug!(path = %key.display(), "Registered file watch");
            guard.entries.insert(
                key.clone(),
                WatchEntry {
                    listeners: Vec::new(),
                    _handle: handle,
                },
            );
        }
        guard.add_listener(&key, tx)
    };

    let weak = Arc::downgrade(registry);
    Ok(ChangeSubscription::new(rx, move || {
        if let Some(registry) = weak.upgrade() {
            // Drop the OS watch outside the lock; its event thread may be
            // waiting on it.
            let removed = lock(&registry).remove_listener(&key, id);
            drop(removed);
        }
    }))
}

fn paths_of(registry: &SharedRegistry) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = lock(registry).entries.keys().cloned().collect();
    paths.sort();
    paths
}

/// Change watcher backed by the platform's file notification API.
///
/// Each registered file gets its own watch on its parent directory; events
/// for other entries of that directory are ignored.
#[derive(Clone)]
pub struct NotifyWatcher {
    registry: SharedRegistry,
    debounce: Option<Duration>,
}

impl NotifyWatcher {
    /// Create a watcher. `debounce` of `None` delivers raw events.
    #[must_use]
    pub fn new(debounce: Option<Duration>) -> Self {
        Self {
            registry: SharedRegistry::default(),
            debounce,
        }
    }

    /// Paths with at least one live subscription.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        paths_of(&self.registry)
    }

    fn create_handle(&self, key: &Path) -> Result<WatchHandle, TailError> {
        let parent = key
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let weak = Arc::downgrade(&self.registry);
        let target = key.to_path_buf();

        if let Some(timeout) = self.debounce {
            let mut debouncer =
                new_debouncer(timeout, None, move |result: DebounceEventResult| {
                    let items: Vec<ChangeResult> = match result {
                        Ok(events) => events
                            .iter()
                            .filter(|event| affects(&event.kind, &event.paths, &target))
                            .take(1)
                            .map(|_| Ok(FileChange { path: target.clone() }))
                            .collect(),
                        Err(errors) => errors.into_iter().map(|e| Err(e.into())).collect(),
                    };
                    deliver(&weak, &target, &items);
                })?;
            debouncer.watch(&parent, RecursiveMode::NonRecursive)?;
            Ok(Box::new(debouncer))
        } else {
            let mut watcher =
                notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                    let item = match result {
                        Ok(event) if affects(&event.kind, &event.paths, &target) => {
                            Ok(FileChange { path: target.clone() })
                        }
                        Ok(_) => return,
                        Err(e) => Err(e.into()),
                    };
                    deliver(&weak, &target, std::slice::from_ref(&item));
                })?;
            watcher.watch(&parent, RecursiveMode::NonRecursive)?;
            Ok(Box::new(watcher))
        }
    }
}

impl Default for NotifyWatcher {
    fn default() -> Self {
        Self::new(Some(Duration::from_millis(100)))
    }
}

impl ChangeWatcher for NotifyWatcher {
    fn subscribe(&self, path: &Path) -> Result<ChangeSubscription, TailError> {
        let key = watch_key(path);
        register(&self.registry, key.clone(), || {
            self.create_handle(&key).map(Some)
        })
    }
}

fn affects(kind: &EventKind, paths: &[PathBuf], target: &Path) -> bool {
    !matches!(kind, EventKind::Access(_)) && paths.iter().any(|p| p == target)
}

fn deliver(registry: &Weak<Mutex<Registry>>, key: &Path, items: &[ChangeResult]) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let mut guard = lock(&registry);
    for item in items {
        if let Err(e) = item {
            tracing::warn!(path = %key.display(), error = %e, "File watcher error");
        }
        guard.dispatch(key, item);
    }
}

/// Change watcher driven by explicit calls instead of OS events.
#[derive(Clone, Default)]
pub struct ChannelWatcher {
    registry: SharedRegistry,
}

impl ChannelWatcher {
    /// Create an empty watcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a change of `path` to its subscribers.
    pub fn notify_changed(&self, path: &Path) {
        let key = watch_key(path);
        let change = Ok(FileChange { path: key.clone() });
        lock(&self.registry).dispatch(&key, &change);
    }

    /// Deliver a watcher failure to the subscribers of `path`.
    pub fn fail(&self, path: &Path, error: TailError) {
        let key = watch_key(path);
        lock(&self.registry).dispatch(&key, &Err(error));
    }

    /// Drop every subscriber of `path`, ending their notification streams.
    pub fn close(&self, path: &Path) {
        let key = watch_key(path);
        let removed = lock(&self.registry).entries.remove(&key);
        drop(removed);
    }

    /// Number of live subscriptions for `path`.
    #[must_use]
    pub fn subscriber_count(&self, path: &Path) -> usize {
        let key = watch_key(path);
        lock(&self.registry)
            .entries
            .get(&key)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Paths with at least one live subscription.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        paths_of(&self.registry)
    }
}

impl ChangeWatcher for ChannelWatcher {
    fn subscribe(&self, path: &Path) -> Result<ChangeSubscription, TailError> {
        register(&self.registry, watch_key(path), || Ok(None))
    }
}
