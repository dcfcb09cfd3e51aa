#![forbid(unsafe_code)]

//! Process-wide unique identifiers.
//!
//! Both id kinds are minted from monotonic counters and never reused, so two
//! contexts created with identical initial values still get distinct ids.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ─── Id generation ───────────────────────────────────────────────────────────

static NEXT_TOPIC: AtomicU64 = AtomicU64::new(1);
static NEXT_SCOPE_KEY: AtomicU64 = AtomicU64::new(1);

// ─── Topic ───────────────────────────────────────────────────────────────────

/// Addressing key on the [`EventBus`](crate::EventBus).
///
/// Opaque and globally unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(u64);

impl Topic {
    /// Mint a fresh topic.
    #[must_use]
    pub fn mint() -> Self {
        Self(NEXT_TOPIC.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value (for tracing/logging).
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

// ─── ScopeKey ────────────────────────────────────────────────────────────────

/// Key under which a host's native scoping stores provided values for one
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey(u64);

impl ScopeKey {
    /// Mint a fresh scope key.
    #[must_use]
    pub fn mint() -> Self {
        Self(NEXT_SCOPE_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_unique_and_increasing() {
        let a = Topic::mint();
        let b = Topic::mint();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn topic_display() {
        let t = Topic::mint();
        assert_eq!(t.to_string(), format!("context-{}", t.raw()));
    }

    #[test]
    fn scope_keys_do_not_collide() {
        let keys: Vec<_> = (0..64).map(|_| ScopeKey::mint()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), keys.len());
    }
}
