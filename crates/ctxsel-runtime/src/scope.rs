#![forbid(unsafe_code)]

//! The contract with the hosting component runtime.
//!
//! A host needs to do three things:
//!
//! 1. Attach the [`Provided`] record returned by a
//!    [`ProviderBinding`](crate::ProviderBinding) to the Provider's node.
//! 2. Implement [`Scope`] for render positions, resolving the nearest
//!    enclosing [`Provided`] for a [`ScopeKey`].
//! 3. Call [`Consumer::mount`](crate::Consumer::mount) once after a consumer
//!    mounts and [`Consumer::unmount`](crate::Consumer::unmount) (or drop it)
//!    before it is destroyed, and re-render the instance when its
//!    [`Rerender`] hook fires.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ctxsel_core::ScopeKey;

/// Type-erased value as carried on the bus and through host scopes.
pub type AnyValue = Rc<dyn Any>;

/// Host callback that re-renders exactly one mounted instance.
pub type Rerender = Rc<dyn Fn()>;

// ─── ProviderId ──────────────────────────────────────────────────────────────

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one Provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    pub(crate) fn mint() -> Self {
        Self(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider-{}", self.0)
    }
}

// ─── Notification ────────────────────────────────────────────────────────────

/// Bus payload published by a Provider whose value changed.
#[derive(Clone)]
pub struct Notification {
    /// Provider that published the change.
    pub origin: ProviderId,
    /// The new value.
    pub value: AnyValue,
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

// ─── Provided ────────────────────────────────────────────────────────────────

/// What a mounted Provider exposes to its subtree.
///
/// The record is a live view: the Provider updates the shared slot on every
/// render before it publishes, so a host that stored the record once always
/// resolves the current value.
#[derive(Clone)]
pub struct Provided {
    key: ScopeKey,
    origin: ProviderId,
    slot: Rc<RefCell<AnyValue>>,
}

impl Provided {
    pub(crate) fn new(key: ScopeKey, origin: ProviderId, value: AnyValue) -> Self {
        Self {
            key,
            origin,
            slot: Rc::new(RefCell::new(value)),
        }
    }

    pub(crate) fn replace(&self, value: AnyValue) {
        *self.slot.borrow_mut() = value;
    }

    /// Scope key the value is provided under.
    #[must_use]
    pub fn key(&self) -> ScopeKey {
        self.key
    }

    /// Provider instance that owns this record.
    #[must_use]
    pub fn origin(&self) -> ProviderId {
        self.origin
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> AnyValue {
        Rc::clone(&*self.slot.borrow())
    }
}

impl fmt::Debug for Provided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provided")
            .field("key", &self.key)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// A render position inside the host tree.
pub trait Scope {
    /// Nearest enclosing record provided under `key`, if any.
    fn lookup(&self, key: ScopeKey) -> Option<Provided>;
}

/// A position with no enclosing Providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl Scope for Detached {
    fn lookup(&self, _key: ScopeKey) -> Option<Provided> {
        None
    }
}

/// A stack of records, outermost first. The nearest match is the last one.
impl Scope for [Provided] {
    fn lookup(&self, key: ScopeKey) -> Option<Provided> {
        self.iter().rev().find(|p| p.key == key).cloned()
    }
}

impl Scope for Vec<Provided> {
    fn lookup(&self, key: ScopeKey) -> Option<Provided> {
        self.as_slice().lookup(key)
    }
}

impl<S: Scope + ?Sized> Scope for &S {
    fn lookup(&self, key: ScopeKey) -> Option<Provided> {
        (**self).lookup(key)
    }
}
