#![forbid(unsafe_code)]

//! Context creation and bookkeeping.
//!
//! # Design
//!
//! [`Contexts`] is a constructed service object, never a global. It owns (or
//! is handed) the [`EventBus`] every context it creates publishes on, plus a
//! side table keyed by [`Topic`] that records which contexts it created and,
//! for [`ValueSource::SideCache`], their cached value.
//!
//! A [`Context<T>`] is an immutable handle. Its topic, scope key and registry
//! link are private to this crate; application code can only derive
//! Providers and consumers from it.
//!
//! # Invariants
//!
//! 1. Every context gets a fresh topic and scope key.
//! 2. A context's side-table entry lives exactly as long as some handle to it.
//! 3. A read through a registry that did not create the context, or whose
//!    registry is gone, yields `None` rather than panicking.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use ctxsel_core::{EventBus, ScopeKey, Topic};

use crate::config::{ContextsConfig, ValueSource};
use crate::consumer::{Consumer, Selector};
use crate::error::{ContextError, Result};
use crate::provider::ProviderBinding;
use crate::scope::{AnyValue, Notification, Provided, Scope};

// ─── Registry interior ───────────────────────────────────────────────────────

struct Slot {
    /// Side cache. Seeded with the initial value; only written under
    /// [`ValueSource::SideCache`].
    cached: AnyValue,
}

pub(crate) struct RegistryInner {
    bus: EventBus<Notification>,
    config: ContextsConfig,
    slots: RefCell<AHashMap<Topic, Slot>>,
}

impl RegistryInner {
    pub(crate) fn bus(&self) -> &EventBus<Notification> {
        &self.bus
    }

    pub(crate) fn value_source(&self) -> ValueSource {
        self.config.value_source
    }

    pub(crate) fn cached(&self, topic: Topic) -> Option<AnyValue> {
        self.slots
            .borrow()
            .get(&topic)
            .map(|slot| Rc::clone(&slot.cached))
    }

    // Displaced values are dropped only after the borrow ends: one may own
    // the last handle to another context of this registry, whose drop
    // re-enters `forget`.

    pub(crate) fn write_cache(&self, topic: Topic, value: AnyValue) {
        let old = self
            .slots
            .borrow_mut()
            .get_mut(&topic)
            .map(|slot| std::mem::replace(&mut slot.cached, value));
        drop(old);
    }

    fn forget(&self, topic: Topic) {
        let removed = self.slots.borrow_mut().remove(&topic);
        drop(removed);
    }
}

// ─── Contexts ────────────────────────────────────────────────────────────────

/// Registry of contexts sharing one event bus.
///
/// Cloning a `Contexts` creates a new handle to the **same** registry.
#[derive(Clone)]
pub struct Contexts {
    inner: Rc<RegistryInner>,
}

impl fmt::Debug for Contexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contexts")
            .field("contexts", &self.context_count())
            .field("config", &self.inner.config)
            .field("bus", &self.inner.bus)
            .finish()
    }
}

impl Default for Contexts {
    fn default() -> Self {
        Self::new()
    }
}

impl Contexts {
    /// Registry with default configuration and its own bus.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ContextsConfig::default())
    }

    /// Registry with its own bus built from `config.bus`.
    #[must_use]
    pub fn with_config(config: ContextsConfig) -> Self {
        Self::with_bus(EventBus::with_config(config.bus), config)
    }

    /// Registry publishing on an injected bus.
    #[must_use]
    pub fn with_bus(bus: EventBus<Notification>, config: ContextsConfig) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                bus,
                config,
                slots: RefCell::new(AHashMap::new()),
            }),
        }
    }

    /// Configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> ContextsConfig {
        self.inner.config
    }

    /// The bus contexts of this registry publish on.
    #[must_use]
    pub fn bus(&self) -> &EventBus<Notification> {
        &self.inner.bus
    }

    /// Number of live contexts created by this registry.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    /// Whether `context` was created by this registry and is still live.
    #[must_use]
    pub fn owns<T>(&self, context: &Context<T>) -> bool {
        std::ptr::eq(context.inner.registry.as_ptr(), Rc::as_ptr(&self.inner))
            && self.inner.slots.borrow().contains_key(&context.inner.topic)
    }

    /// Number of consumers currently subscribed to `context`.
    #[must_use]
    pub fn subscriber_count<T>(&self, context: &Context<T>) -> usize {
        self.inner.bus.listener_count(context.inner.topic)
    }

    /// Create a context whose consumers read `initial` until a Provider
    /// mounts above them.
    pub fn create_context<T: 'static>(&self, initial: T) -> Context<T> {
        self.create_context_rc(Rc::new(initial))
    }

    /// Like [`create_context`](Self::create_context), keeping the caller's
    /// `Rc` so the initial value's identity is known.
    pub fn create_context_rc<T: 'static>(&self, initial: Rc<T>) -> Context<T> {
        let topic = Topic::mint();
        let key = ScopeKey::mint();
        let cached: AnyValue = initial.clone();
        self.inner
            .slots
            .borrow_mut()
            .insert(topic, Slot { cached });
        tracing::debug!(
            message = "registry.create",
            topic = topic.raw(),
            scope_key = key.raw(),
            value_type = type_name::<T>()
        );
        Context {
            inner: Rc::new(ContextInner {
                topic,
                key,
                initial,
                registry: Rc::downgrade(&self.inner),
            }),
        }
    }

    /// Read `context` at `scope` without a selector.
    ///
    /// Returns `None` if `context` was not created by this registry.
    pub fn read<T: 'static>(
        &self,
        context: &Context<T>,
        scope: &dyn Scope,
    ) -> Option<Consumer<T, Rc<T>>> {
        self.try_read(context, scope).ok()
    }

    /// Read `context` at `scope`, storing only `selector`'s output.
    ///
    /// Returns `None` if `context` was not created by this registry. A
    /// panicking selector propagates to the caller.
    pub fn read_with<T, S>(
        &self,
        context: &Context<T>,
        scope: &dyn Scope,
        selector: impl Fn(&T) -> S + 'static,
    ) -> Option<Consumer<T, S>>
    where
        T: 'static,
        S: PartialEq + 'static,
    {
        self.try_read_with(context, scope, selector).ok()
    }

    /// [`read`](Self::read), reporting why a read failed.
    pub fn try_read<T: 'static>(
        &self,
        context: &Context<T>,
        scope: &dyn Scope,
    ) -> Result<Consumer<T, Rc<T>>> {
        self.check_owner(context)?;
        Consumer::resolve(&self.inner, context, scope, Selector::identity())
    }

    /// [`read_with`](Self::read_with), reporting why a read failed.
    pub fn try_read_with<T, S>(
        &self,
        context: &Context<T>,
        scope: &dyn Scope,
        selector: impl Fn(&T) -> S + 'static,
    ) -> Result<Consumer<T, S>>
    where
        T: 'static,
        S: PartialEq + 'static,
    {
        self.check_owner(context)?;
        Consumer::resolve(&self.inner, context, scope, Selector::projecting(selector))
    }

    fn check_owner<T>(&self, context: &Context<T>) -> Result<()> {
        if self.owns(context) {
            Ok(())
        } else {
            Err(ContextError::Foreign {
                topic: context.inner.topic,
            })
        }
    }
}

// ─── Context ─────────────────────────────────────────────────────────────────

struct ContextInner<T> {
    topic: Topic,
    key: ScopeKey,
    initial: Rc<T>,
    registry: Weak<RegistryInner>,
}

impl<T> Drop for ContextInner<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.forget(self.topic);
        }
    }
}

/// Handle to one context.
///
/// Cloning a `Context` creates a new handle to the **same** context.
pub struct Context<T> {
    inner: Rc<ContextInner<T>>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("topic", &self.inner.topic)
            .field("initial", &self.inner.initial)
            .finish_non_exhaustive()
    }
}

impl<T> Context<T> {
    /// Topic this context publishes on (for tracing/logging).
    #[must_use]
    pub fn topic(&self) -> Topic {
        self.inner.topic
    }

    /// Value consumers read when no Provider is mounted above them.
    #[must_use]
    pub fn initial(&self) -> &Rc<T> {
        &self.inner.initial
    }

    /// Whether both handles refer to the same context.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn scope_key(&self) -> ScopeKey {
        self.inner.key
    }

    pub(crate) fn registry(&self) -> Result<Rc<RegistryInner>> {
        self.inner
            .registry
            .upgrade()
            .ok_or(ContextError::RegistryDropped {
                topic: self.inner.topic,
            })
    }
}

impl<T: 'static> Context<T> {
    /// Mount a Provider for this context with its first value.
    ///
    /// The first value is exposed but never published.
    pub fn provide(&self, value: Rc<T>) -> ProviderBinding<T> {
        ProviderBinding::mount(self.clone(), value)
    }

    /// Read this context at `scope` without a selector.
    ///
    /// Returns `None` if the registry that created it has been dropped.
    pub fn read(&self, scope: &dyn Scope) -> Option<Consumer<T, Rc<T>>> {
        self.try_read(scope).ok()
    }

    /// Read this context at `scope`, storing only `selector`'s output.
    pub fn read_with<S>(
        &self,
        scope: &dyn Scope,
        selector: impl Fn(&T) -> S + 'static,
    ) -> Option<Consumer<T, S>>
    where
        S: PartialEq + 'static,
    {
        self.try_read_with(scope, selector).ok()
    }

    /// [`read`](Self::read), reporting why a read failed.
    pub fn try_read(&self, scope: &dyn Scope) -> Result<Consumer<T, Rc<T>>> {
        let registry = self.registry()?;
        Consumer::resolve(&registry, self, scope, Selector::identity())
    }

    /// [`read_with`](Self::read_with), reporting why a read failed.
    pub fn try_read_with<S>(
        &self,
        scope: &dyn Scope,
        selector: impl Fn(&T) -> S + 'static,
    ) -> Result<Consumer<T, S>>
    where
        S: PartialEq + 'static,
    {
        let registry = self.registry()?;
        Consumer::resolve(&registry, self, scope, Selector::projecting(selector))
    }

    /// Value a consumer constructed at `scope` would start from.
    pub(crate) fn resolve_value(
        &self,
        registry: &RegistryInner,
        scope: &dyn Scope,
    ) -> Result<(Rc<T>, Option<Provided>)> {
        let topic = self.inner.topic;
        let mismatch = || ContextError::TypeMismatch {
            topic,
            expected: type_name::<T>(),
        };
        match registry.value_source() {
            ValueSource::NativeScope => match scope.lookup(self.inner.key) {
                Some(provided) => {
                    let value = provided.value().downcast::<T>().map_err(|_| mismatch())?;
                    Ok((value, Some(provided)))
                }
                None => Ok((Rc::clone(&self.inner.initial), None)),
            },
            ValueSource::SideCache => match registry.cached(topic) {
                Some(cached) => Ok((cached.downcast::<T>().map_err(|_| mismatch())?, None)),
                None => Ok((Rc::clone(&self.inner.initial), None)),
            },
        }
    }
}
