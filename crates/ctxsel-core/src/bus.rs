#![forbid(unsafe_code)]

//! Topic-addressed, synchronous, in-process fan-out.
//!
//! # Design
//!
//! [`EventBus<P>`] is a cheaply cloneable handle (`Rc<RefCell<..>>` inside)
//! over a map from [`Topic`] to an ordered list of listeners. Listeners are
//! `Rc<dyn Fn(&P)>`; their identity is the `Rc` allocation, which is what
//! [`off`](EventBus::off) matches on.
//!
//! # Invariants
//!
//! 1. Listeners are invoked in registration order.
//! 2. Only listeners registered when [`emit`](EventBus::emit) starts can be
//!    invoked by that emit.
//! 3. A listener removed during an in-flight emit, before it was reached, is
//!    not invoked.
//! 4. A topic with no listeners holds no map entry.
//! 5. Dropping a [`Subscription`] removes its listener before the next emit.
//!
//! # Failure Modes
//!
//! - **Listener panics**: with [`BusConfig::isolate_panics`] (the default)
//!   the panic is caught, counted in [`EmitReport::panicked`], logged at WARN,
//!   and delivery continues. Without isolation the panic unwinds out of
//!   `emit`, and listeners after the failing one are skipped.
//! - **Re-entrant emit**: a listener may emit on any topic, including its own;
//!   the snapshot taken by the outer emit is unaffected.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::id::Topic;

/// A registered callback. Identity is the `Rc` allocation.
pub type Listener<P> = Rc<dyn Fn(&P)>;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Configuration for an [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Catch listener panics so remaining listeners still receive the emit.
    /// Default: true.
    pub isolate_panics: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            isolate_panics: true,
        }
    }
}

impl BusConfig {
    /// Set whether listener panics are isolated.
    #[must_use]
    pub fn isolate_panics(mut self, isolate: bool) -> Self {
        self.isolate_panics = isolate;
        self
    }
}

// ─── Emit report ─────────────────────────────────────────────────────────────

/// Outcome of a single [`EventBus::emit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitReport {
    /// Topic the emit was addressed to.
    pub topic: Topic,
    /// Listeners that returned normally.
    pub delivered: usize,
    /// Listeners that panicked (only non-zero when panics are isolated).
    pub panicked: usize,
}

impl EmitReport {
    /// Whether every invoked listener returned normally.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.panicked == 0
    }

    /// Total listeners invoked.
    #[must_use]
    pub const fn invoked(&self) -> usize {
        self.delivered + self.panicked
    }
}

// ─── Shared interior ─────────────────────────────────────────────────────────

struct Entry<P> {
    listener: Listener<P>,
    /// Cleared on removal so in-flight snapshots skip the entry.
    live: Rc<Cell<bool>>,
}

struct BusInner<P> {
    topics: AHashMap<Topic, Vec<Entry<P>>>,
    config: BusConfig,
}

impl<P> BusInner<P> {
    fn remove(&mut self, topic: Topic, listener: &Listener<P>) -> bool {
        let Some(entries) = self.topics.get_mut(&topic) else {
            return false;
        };
        let Some(pos) = entries
            .iter()
            .position(|e| same_listener(&e.listener, listener))
        else {
            return false;
        };
        let entry = entries.remove(pos);
        entry.live.set(false);
        if entries.is_empty() {
            self.topics.remove(&topic);
        }
        true
    }
}

fn same_listener<P>(a: &Listener<P>, b: &Listener<P>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

// ─── EventBus ────────────────────────────────────────────────────────────────

/// Synchronous topic-addressed publish/subscribe bus.
///
/// Cloning an `EventBus` creates a new handle to the **same** bus.
pub struct EventBus<P> {
    inner: Rc<RefCell<BusInner<P>>>,
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventBus")
            .field("topics", &inner.topics.len())
            .field(
                "listeners",
                &inner.topics.values().map(Vec::len).sum::<usize>(),
            )
            .field("config", &inner.config)
            .finish()
    }
}

impl<P: 'static> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static> EventBus<P> {
    /// Create an empty bus with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create an empty bus with the given configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                topics: AHashMap::new(),
                config,
            })),
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> BusConfig {
        self.inner.borrow().config
    }

    /// Register `listener` under `topic`.
    ///
    /// Registering the same listener twice yields duplicate delivery.
    pub fn on(&self, topic: Topic, listener: Listener<P>) {
        self.inner
            .borrow_mut()
            .topics
            .entry(topic)
            .or_default()
            .push(Entry {
                listener,
                live: Rc::new(Cell::new(true)),
            });
    }

    /// Remove the earliest registration of exactly `listener` under `topic`.
    ///
    /// Returns `false` (and does nothing) if it was not registered.
    pub fn off(&self, topic: Topic, listener: &Listener<P>) -> bool {
        self.inner.borrow_mut().remove(topic, listener)
    }

    /// Register a closure and return a guard that removes it on drop.
    pub fn subscribe(&self, topic: Topic, f: impl Fn(&P) + 'static) -> Subscription {
        let listener: Listener<P> = Rc::new(f);
        self.on(topic, Rc::clone(&listener));
        let weak: Weak<RefCell<BusInner<P>>> = Rc::downgrade(&self.inner);
        Subscription {
            topic,
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().remove(topic, &listener);
                }
            })),
        }
    }

    /// Invoke every listener currently registered under `topic`.
    pub fn emit(&self, topic: Topic, payload: &P) -> EmitReport {
        let (snapshot, isolate) = {
            let inner = self.inner.borrow();
            let snapshot: Vec<(Listener<P>, Rc<Cell<bool>>)> = inner
                .topics
                .get(&topic)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|e| (Rc::clone(&e.listener), Rc::clone(&e.live)))
                        .collect()
                })
                .unwrap_or_default();
            (snapshot, inner.config.isolate_panics)
        };

        let span = tracing::debug_span!(
            "ctxsel.emit",
            topic = topic.raw(),
            listeners = snapshot.len(),
            delivered = tracing::field::Empty,
            panicked = tracing::field::Empty
        );
        let _guard = span.enter();

        let mut report = EmitReport {
            topic,
            delivered: 0,
            panicked: 0,
        };
        for (listener, live) in snapshot {
            if !live.get() {
                continue;
            }
            if !isolate {
                listener(payload);
                report.delivered += 1;
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.panicked += 1;
                    tracing::warn!(
                        message = "bus.listener_panicked",
                        topic = topic.raw(),
                        reason = panic_message(err.as_ref())
                    );
                }
            }
        }

        span.record("delivered", report.delivered as u64);
        span.record("panicked", report.panicked as u64);
        report
    }

    /// Number of listeners registered under `topic`.
    #[must_use]
    pub fn listener_count(&self, topic: Topic) -> usize {
        self.inner.borrow().topics.get(&topic).map_or(0, Vec::len)
    }

    /// Number of topics with at least one listener.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.inner.borrow().topics.len()
    }

    /// Whether no listener is registered under any topic.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().topics.is_empty()
    }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// RAII guard for a listener registered via [`EventBus::subscribe`].
///
/// Dropping the guard (or calling [`unsubscribe`](Self::unsubscribe))
/// removes the listener. Both are idempotent and tolerate the bus having
/// been dropped already.
pub struct Subscription {
    topic: Topic,
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Topic this subscription listens on.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Whether the listener is still registered by this guard.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Remove the listener now.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
