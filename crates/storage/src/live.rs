//! Live-update plumbing shared by the storage adapters.
//!
//! A `Listeners` registry holds callbacks keyed by what they watch. Callers
//! get back a `Subscription`; dropping it (or calling `cancel`) removes the
//! callback, so release happens on every exit path.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::repository::StorageError;

type UpdateFn<T> = Box<dyn Fn(T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&StorageError) + Send + Sync>;

/// A pair of callbacks: one per delivered snapshot, one per failure.
pub struct Listener<T> {
    on_update: UpdateFn<T>,
    on_error: ErrorFn,
}

impl<T> Listener<T> {
    pub fn new(
        on_update: impl Fn(T) + Send + Sync + 'static,
        on_error: impl Fn(&StorageError) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_update: Box::new(on_update),
            on_error: Box::new(on_error),
        }
    }

    /// A listener whose failures are only logged.
    pub fn updates_only(on_update: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self::new(on_update, |err| {
            tracing::warn!(error = %err, "live update failed with no error handler attached");
        })
    }

    pub fn deliver(&self, value: T) {
        (self.on_update)(value);
    }

    pub fn fail(&self, err: &StorageError) {
        (self.on_error)(err);
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").finish_non_exhaustive()
    }
}

struct Entry<K, T> {
    key: K,
    listener: Arc<Listener<T>>,
}

struct Registry<K, T> {
    next_id: u64,
    entries: HashMap<u64, Entry<K, T>>,
}

/// Registry of listeners keyed by `K`.
pub struct Listeners<K, T> {
    inner: Arc<Mutex<Registry<K, T>>>,
}

impl<K, T> Clone for Listeners<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> Default for Listeners<K, T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: HashMap::new(),
            })),
        }
    }
}

impl<K, T> Listeners<K, T>
where
    K: Clone + PartialEq + Send + 'static,
    T: Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return its subscription together with a handle
    /// the caller can use for the initial delivery.
    pub fn register(&self, key: K, listener: Listener<T>) -> (Arc<Listener<T>>, Subscription) {
        let listener = Arc::new(listener);
        let id = {
            let mut registry = lock(&self.inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.insert(
                id,
                Entry {
                    key,
                    listener: Arc::clone(&listener),
                },
            );
            id
        };

        let weak: Weak<Mutex<Registry<K, T>>> = Arc::downgrade(&self.inner);
        let subscription = Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).entries.remove(&id);
            }
        });
        (listener, subscription)
    }

    /// Listeners currently registered under `key`.
    ///
    /// The registry lock is released before this returns, so callbacks are
    /// free to drop their own subscriptions.
    #[must_use]
    pub fn for_key(&self, key: &K) -> Vec<Arc<Listener<T>>> {
        lock(&self.inner)
            .entries
            .values()
            .filter(|entry| entry.key == *key)
            .map(|entry| Arc::clone(&entry.listener))
            .collect()
    }

    /// Every registered listener with its key.
    #[must_use]
    pub fn all(&self) -> Vec<(K, Arc<Listener<T>>)> {
        lock(&self.inner)
            .entries
            .values()
            .map(|entry| (entry.key.clone(), Arc::clone(&entry.listener)))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<K, T>(inner: &Mutex<Registry<K, T>>) -> std::sync::MutexGuard<'_, Registry<K, T>> {
    // A panicking listener must not wedge every later subscriber.
    inner
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Handle for a live subscription. Dropping it releases the subscription.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn detached() -> Self {
        Self { release: None }
    }

    pub fn cancel(mut self) {
        self.release_now();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
