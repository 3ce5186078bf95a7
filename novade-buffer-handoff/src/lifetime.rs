//! Destruction tracking for client-owned protocol resources.
//!
//! A [`LifetimeTracker`] lives inside the user data of a protocol object. The
//! compositor never holds the resource itself across a commit; it holds a
//! [`LifetimeHandle`] (or a [`Tracked`] value) and checks `is_alive` before
//! touching the client side again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Listener = Box<dyn FnOnce() + Send>;

struct Inner {
    destroyed: AtomicBool,
    listeners: Mutex<Vec<Listener>>,
}

impl Inner {
    fn fire(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let listeners = std::mem::take(
            &mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for listener in listeners {
            listener();
        }
    }
}

/// Owner side of a resource lifetime.
///
/// Listeners run exactly once, either on [`LifetimeTracker::mark_destroyed`]
/// or when the tracker is dropped, whichever happens first.
pub struct LifetimeTracker {
    inner: Arc<Inner>,
}

impl LifetimeTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                destroyed: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns a weak handle that observes this tracker.
    pub fn handle(&self) -> LifetimeHandle {
        LifetimeHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers a one-shot destruction listener.
    ///
    /// If the resource is already destroyed the listener runs immediately.
    pub fn on_destroyed(&self, listener: impl FnOnce() + Send + 'static) {
        register(&self.inner, Box::new(listener));
    }

    /// Marks the resource as destroyed and notifies listeners. Idempotent.
    pub fn mark_destroyed(&self) {
        self.inner.fire();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }
}

impl Default for LifetimeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifetimeTracker {
    fn drop(&mut self) {
        self.inner.fire();
    }
}

impl fmt::Debug for LifetimeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeTracker")
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn register(inner: &Inner, listener: Listener) {
    let mut listeners = inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
    // Checked under the lock so a concurrent `fire` cannot miss this listener.
    if inner.destroyed.load(Ordering::Acquire) {
        drop(listeners);
        listener();
    } else {
        listeners.push(listener);
    }
}

/// Weak observer of a [`LifetimeTracker`].
#[derive(Clone)]
pub struct LifetimeHandle {
    inner: Weak<Inner>,
}

impl LifetimeHandle {
    /// A handle that was never attached to a live resource.
    pub fn dangling() -> Self {
        Self { inner: Weak::new() }
    }

    pub fn is_alive(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| !inner.destroyed.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Registers a one-shot destruction listener through the weak side.
    ///
    /// Runs the listener immediately when the tracker is already gone.
    pub fn on_destroyed(&self, listener: impl FnOnce() + Send + 'static) {
        match self.inner.upgrade() {
            Some(inner) => register(&inner, Box::new(listener)),
            None => listener(),
        }
    }
}

impl fmt::Debug for LifetimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// A value whose client-side counterpart may disappear at any time.
#[derive(Clone)]
pub struct Tracked<T> {
    value: T,
    lifetime: LifetimeHandle,
}

impl<T> Tracked<T> {
    pub fn new(value: T, lifetime: LifetimeHandle) -> Self {
        Self { value, lifetime }
    }

    pub fn is_alive(&self) -> bool {
        self.lifetime.is_alive()
    }

    /// Returns the value only while the underlying resource is alive.
    pub fn get(&self) -> Option<&T> {
        self.is_alive().then_some(&self.value)
    }

    /// Returns the value regardless of liveness.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn lifetime(&self) -> &LifetimeHandle {
        &self.lifetime
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("value", &self.value)
            .field("alive", &self.is_alive())
            .finish()
    }
}
