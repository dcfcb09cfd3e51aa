#![forbid(unsafe_code)]

//! Selector-filtered consumer hook.
//!
//! # Design
//!
//! A [`Consumer<T, S>`] is the per-instance state a host keeps for one call
//! site that reads a context. Construction evaluates the selector once
//! against the value resolvable at the render position. [`mount`] installs a
//! single bus listener; [`unmount`] (or drop) removes that same listener.
//!
//! The listener runs on every raw change the consumer accepts. It always
//! re-applies the selector and stores the result, but only calls the host's
//! [`Rerender`] hook when the stored state actually transitions: by
//! reference identity without a selector, by `PartialEq` with one.
//!
//! # Invariants
//!
//! 1. At most one bus registration per consumer, present only while mounted.
//! 2. The selector is captured at construction and never replaced.
//! 3. `get()` reflects the latest accepted notification, or the value
//!    resolved at mount when none has arrived.
//!
//! # Failure Modes
//!
//! - **Selector panics at construction**: propagates to the reader.
//! - **Selector panics in a notification**: the panic unwinds into the bus,
//!   which isolates it by default. The stored state keeps its previous value.
//!
//! [`mount`]: Consumer::mount
//! [`unmount`]: Consumer::unmount

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ctxsel_core::{EventBus, Listener, Topic};

use crate::config::ValueSource;
use crate::error::Result;
use crate::registry::{Context, RegistryInner};
use crate::scope::{Notification, Provided, ProviderId, Rerender, Scope};

// ─── Selector ────────────────────────────────────────────────────────────────

pub(crate) struct Selector<T, S> {
    project: Rc<dyn Fn(&Rc<T>) -> S>,
    same: fn(&S, &S) -> bool,
}

impl<T: 'static> Selector<T, Rc<T>> {
    pub(crate) fn identity() -> Self {
        Self {
            project: Rc::new(|v: &Rc<T>| Rc::clone(v)),
            same: |a, b| Rc::ptr_eq(a, b),
        }
    }
}

impl<T: 'static, S: PartialEq + 'static> Selector<T, S> {
    pub(crate) fn projecting(f: impl Fn(&T) -> S + 'static) -> Self {
        Self {
            project: Rc::new(move |v: &Rc<T>| f(v.as_ref())),
            same: |a, b| a == b,
        }
    }
}

// ─── Acceptance ──────────────────────────────────────────────────────────────

/// Which publishers a consumer listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accept {
    /// Resolved the initial value under native scoping: no Provider above.
    Nothing,
    /// Resolved this Provider under native scoping.
    From(ProviderId),
    /// Side cache: every Provider of the context.
    Any,
}

impl Accept {
    fn for_source(source: ValueSource, provided: Option<&Provided>) -> Self {
        match (source, provided) {
            (ValueSource::SideCache, _) => Self::Any,
            (ValueSource::NativeScope, Some(p)) => Self::From(p.origin()),
            (ValueSource::NativeScope, None) => Self::Nothing,
        }
    }

    fn accepts(self, origin: ProviderId) -> bool {
        match self {
            Self::Nothing => false,
            Self::From(id) => id == origin,
            Self::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Mounted,
    Unmounted,
}

// ─── Shared interior ─────────────────────────────────────────────────────────

struct Shared<T, S> {
    selector: Selector<T, S>,
    state: RefCell<S>,
    /// Raw value the current state was derived from.
    source_value: RefCell<Rc<T>>,
    accept: Cell<Accept>,
    notifications: Cell<u64>,
    transitions: Cell<u64>,
    rerender: RefCell<Option<Rerender>>,
}

impl<T, S> Shared<T, S> {
    /// Derive and store the state for `value`. Returns whether it transitioned.
    fn apply(&self, value: Rc<T>) -> bool {
        let next = (self.selector.project)(&value);
        *self.source_value.borrow_mut() = value;
        let changed = {
            let mut state = self.state.borrow_mut();
            let changed = !(self.selector.same)(&*state, &next);
            *state = next;
            changed
        };
        if changed {
            self.transitions.set(self.transitions.get() + 1);
            let rerender = self.rerender.borrow().clone();
            if let Some(rerender) = rerender {
                rerender();
            }
        }
        changed
    }
}

// ─── Consumer ────────────────────────────────────────────────────────────────

/// One mounted read of a context.
pub struct Consumer<T, S> {
    context: Context<T>,
    bus: EventBus<Notification>,
    source: ValueSource,
    shared: Rc<Shared<T, S>>,
    listener: Listener<Notification>,
    phase: Phase,
}

impl<T: 'static, S: 'static> Consumer<T, S> {
    pub(crate) fn resolve(
        registry: &Rc<RegistryInner>,
        context: &Context<T>,
        scope: &dyn Scope,
        selector: Selector<T, S>,
    ) -> Result<Self> {
        let (value, provided) = context.resolve_value(registry, scope)?;
        let source = registry.value_source();
        let state = (selector.project)(&value);
        let shared = Rc::new(Shared {
            selector,
            state: RefCell::new(state),
            source_value: RefCell::new(value),
            accept: Cell::new(Accept::for_source(source, provided.as_ref())),
            notifications: Cell::new(0),
            transitions: Cell::new(0),
            rerender: RefCell::new(None),
        });
        let listener = Self::listener(Rc::clone(&shared), context.topic());
        Ok(Self {
            context: context.clone(),
            bus: registry.bus().clone(),
            source,
            shared,
            listener,
            phase: Phase::Pending,
        })
    }

    fn listener(shared: Rc<Shared<T, S>>, topic: Topic) -> Listener<Notification> {
        Rc::new(move |n: &Notification| {
            if !shared.accept.get().accepts(n.origin) {
                return;
            }
            let Ok(value) = Rc::clone(&n.value).downcast::<T>() else {
                tracing::warn!(
                    message = "consumer.type_mismatch",
                    topic = topic.raw(),
                    origin = n.origin.raw()
                );
                return;
            };
            shared.notifications.set(shared.notifications.get() + 1);
            shared.apply(value);
        })
    }

    /// Host hook invoked whenever the stored state transitions.
    #[must_use]
    pub fn on_rerender(self, f: impl Fn() + 'static) -> Self {
        self.set_rerender(Rc::new(f));
        self
    }

    /// Replace the host hook.
    pub fn set_rerender(&self, rerender: Rerender) {
        *self.shared.rerender.borrow_mut() = Some(rerender);
    }

    /// Subscribe for the mounted lifetime. Call once after the instance
    /// mounts, from the position it was read at.
    ///
    /// The value is re-resolved first, so a change published between
    /// construction and mount is not lost. Returns `false` if the consumer
    /// was already mounted or has been unmounted.
    pub fn mount(&mut self, scope: &dyn Scope) -> bool {
        if self.phase != Phase::Pending {
            return false;
        }
        if let Ok(registry) = self.context.registry()
            && let Ok((value, provided)) = self.context.resolve_value(&registry, scope)
        {
            self.shared
                .accept
                .set(Accept::for_source(self.source, provided.as_ref()));
            let stale = !Rc::ptr_eq(&*self.shared.source_value.borrow(), &value);
            if stale {
                self.shared.apply(value);
            }
        }
        self.bus.on(self.context.topic(), Rc::clone(&self.listener));
        self.phase = Phase::Mounted;
        tracing::trace!(
            message = "consumer.subscribe",
            topic = self.context.topic().raw()
        );
        true
    }
}

impl<T, S> Consumer<T, S> {
    /// Remove the subscription. Idempotent.
    ///
    /// Returns `true` if a bus registration was removed.
    pub fn unmount(&mut self) -> bool {
        let was_mounted = self.phase == Phase::Mounted;
        self.phase = Phase::Unmounted;
        if !was_mounted {
            return false;
        }
        let topic = self.context.topic();
        self.bus.off(topic, &self.listener);
        tracing::trace!(message = "consumer.unsubscribe", topic = topic.raw());
        true
    }

    /// Whether the consumer currently holds a subscription.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.phase == Phase::Mounted
    }

    /// Context this consumer reads.
    #[must_use]
    pub fn context(&self) -> &Context<T> {
        &self.context
    }

    /// Access the current state by reference.
    ///
    /// # Panics
    ///
    /// Panics if the closure re-enters a Provider render that notifies this
    /// consumer (re-entrant borrow).
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&*self.shared.state.borrow())
    }

    /// Notifications accepted (selector evaluations after construction).
    #[must_use]
    pub fn notifications(&self) -> u64 {
        self.shared.notifications.get()
    }

    /// Times the stored state actually changed.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.shared.transitions.get()
    }
}

impl<T, S: Clone> Consumer<T, S> {
    /// Current state.
    #[must_use]
    pub fn get(&self) -> S {
        self.shared.state.borrow().clone()
    }
}

impl<T, S> Drop for Consumer<T, S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<T, S: fmt::Debug> fmt::Debug for Consumer<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("topic", &self.context.topic())
            .field("state", &*self.shared.state.borrow())
            .field("phase", &self.phase)
            .field("notifications", &self.notifications())
            .field("transitions", &self.transitions())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
