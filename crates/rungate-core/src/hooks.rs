//! Observation hooks.
//!
//! Runtime components report lifecycle moments (a reservation expired, a
//! task dispatched, a waiter evicted) through callbacks registered at
//! construction time. Callers never hold a hook set directly; they register
//! through the `on_*` methods on each component's builder, and the
//! component fires its own event enum through a [`Hooks`] it owns.

use std::fmt;
use std::sync::Arc;

/// Stable machine-readable tag for an event, used in diagnostics when a
/// hook misbehaves.
pub trait EventKind {
    /// Tag such as `"task_dispatched"` or `"reservation_expired"`.
    fn kind(&self) -> &'static str;
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// An append-only set of callbacks for one component's event type.
///
/// Firing is synchronous at the emission site, always after the component
/// has released its internal locks. A panicking callback is contained: the
/// panic is swallowed for that event and the remaining callbacks still run,
/// so observability code cannot take admission down with it.
pub struct Hooks<E> {
    callbacks: Vec<Callback<E>>,
}

impl<E> Hooks<E> {
    /// Creates an empty hook set.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Registers a callback invoked for every fired event.
    pub fn observe<F>(&mut self, callback: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl<E: EventKind> Hooks<E> {
    /// Fires an event at every registered callback, in registration order.
    pub fn fire(&self, event: &E) {
        for callback in &self.callbacks {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
            if outcome.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(event = event.kind(), "event hook panicked");

                #[cfg(feature = "metrics")]
                metrics::counter!("rungate_hook_panics_total", "event" => event.kind())
                    .increment(1);
            }
        }
    }
}

impl<E> Clone for Hooks<E> {
    fn clone(&self) -> Self {
        Self {
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<E> Default for Hooks<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Hooks<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
