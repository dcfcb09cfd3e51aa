#![forbid(unsafe_code)]

//! Property-based invariant tests for one Provider and its consumers.
//!
//! 1. A render emits exactly when its value is a different allocation from
//!    the previous render's; re-rendering the current `Rc` is a no-op.
//! 2. A plain consumer always holds the Provider's current allocation.
//! 3. A selector consumer always holds `selector(current)`, and it counts
//!    one transition (and one re-render) per change of selector output.
//! 4. Both properties hold under either value source.

use std::cell::Cell;
use std::rc::Rc;

use ctxsel_runtime::{Contexts, ContextsConfig, ValueSource};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────

/// `(reuse, value)`: re-render the current `Rc`, or a fresh one holding
/// `value`.
fn steps() -> impl Strategy<Value = Vec<(bool, i32)>> {
    proptest::collection::vec((any::<bool>(), -20i32..20), 0..80)
}

fn value_source() -> impl Strategy<Value = ValueSource> {
    prop_oneof![Just(ValueSource::NativeScope), Just(ValueSource::SideCache)]
}

fn registry(source: ValueSource) -> Contexts {
    Contexts::with_config(ContextsConfig::default().value_source(source))
}

// ═════════════════════════════════════════════════════════════════════════
// 1, 2. Reference identity
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn emits_follow_fresh_allocations(source in value_source(), steps in steps()) {
        let reg = registry(source);
        let ctx = reg.create_context(0);
        let mut provider = ctx.provide(Rc::new(0));
        let scope = vec![provider.provided()];
        let mut plain = reg.read(&ctx, &scope).expect("owned context");
        plain.mount(&scope);

        let mut fresh = 0u64;
        for &(reuse, value) in &steps {
            let next = if reuse {
                Rc::clone(provider.current())
            } else {
                Rc::new(value)
            };
            let outcome = provider.render(Rc::clone(&next));
            prop_assert_eq!(outcome.changed, !reuse);
            match outcome.report {
                Some(report) => prop_assert_eq!((report.delivered, report.panicked), (1, 0)),
                None => prop_assert!(reuse),
            }
            if !reuse {
                fresh += 1;
            }
            prop_assert!(Rc::ptr_eq(&plain.get(), &next));
        }

        prop_assert_eq!(provider.renders(), 1 + steps.len() as u64);
        prop_assert_eq!(provider.emits(), fresh);
        prop_assert_eq!(plain.notifications(), fresh);
        prop_assert_eq!(plain.transitions(), fresh);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Selector output
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn selector_state_tracks_output_changes(
        source in value_source(),
        modulus in 1i32..6,
        steps in steps(),
    ) {
        let reg = registry(source);
        let ctx = reg.create_context(0);
        let mut provider = ctx.provide(Rc::new(0));
        let scope = vec![provider.provided()];
        let rerenders = Rc::new(Cell::new(0u64));
        let mut c = {
            let rerenders = Rc::clone(&rerenders);
            reg.read_with(&ctx, &scope, move |v: &i32| v.rem_euclid(modulus))
                .expect("owned context")
                .on_rerender(move || rerenders.set(rerenders.get() + 1))
        };
        c.mount(&scope);

        let mut last = 0;
        let mut changes = 0u64;
        for &(reuse, value) in &steps {
            let next = if reuse {
                Rc::clone(provider.current())
            } else {
                Rc::new(value)
            };
            let _ = provider.render(next);
            let want = provider.current().rem_euclid(modulus);
            if want != last {
                changes += 1;
                last = want;
            }
            prop_assert_eq!(c.get(), want);
        }

        prop_assert_eq!(c.transitions(), changes);
        prop_assert_eq!(rerenders.get(), changes);
        prop_assert_eq!(c.notifications(), provider.emits());
    }
}
