#![forbid(unsafe_code)]

//! Property-based invariant tests for the event bus.
//!
//! 1. Delivery order equals registration order of the live listeners.
//! 2. The listener count always matches a naive model under on/off churn.
//! 3. Emits never cross topics.
//! 4. After every guard is dropped the bus is empty.

use std::cell::RefCell;
use std::rc::Rc;

use ctxsel_core::{EventBus, Listener, Topic};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    /// Register listener `slot` under topic `topic`.
    On { topic: usize, slot: usize },
    /// Remove one registration of listener `slot` under topic `topic`.
    Off { topic: usize, slot: usize },
    /// Emit on topic `topic`.
    Emit { topic: usize },
}

const TOPICS: usize = 3;
const SLOTS: usize = 6;

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..TOPICS, 0..SLOTS).prop_map(|(topic, slot)| Op::On { topic, slot }),
        (0..TOPICS, 0..SLOTS).prop_map(|(topic, slot)| Op::Off { topic, slot }),
        (0..TOPICS).prop_map(|topic| Op::Emit { topic }),
    ]
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(op(), 0..200)
}

// ── Helpers ─────────────────────────────────────────────────────────────

struct Fixture {
    bus: EventBus<u32>,
    topics: Vec<Topic>,
    listeners: Vec<Listener<u32>>,
    log: Rc<RefCell<Vec<(usize, u32)>>>,
}

fn fixture() -> Fixture {
    let log = Rc::new(RefCell::new(Vec::new()));
    let listeners = (0..SLOTS)
        .map(|slot| {
            let log = Rc::clone(&log);
            let l: Listener<u32> = Rc::new(move |v: &u32| log.borrow_mut().push((slot, *v)));
            l
        })
        .collect();
    Fixture {
        bus: EventBus::new(),
        topics: (0..TOPICS).map(|_| Topic::mint()).collect(),
        listeners,
        log,
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Bus matches a naive ordered-list model
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn bus_matches_naive_model(ops in ops()) {
        let fx = fixture();
        let mut model: Vec<Vec<usize>> = vec![Vec::new(); TOPICS];

        for (step, op) in ops.iter().enumerate() {
            let payload = step as u32;
            match *op {
                Op::On { topic, slot } => {
                    fx.bus.on(fx.topics[topic], Rc::clone(&fx.listeners[slot]));
                    model[topic].push(slot);
                }
                Op::Off { topic, slot } => {
                    let removed = fx.bus.off(fx.topics[topic], &fx.listeners[slot]);
                    let pos = model[topic].iter().position(|&s| s == slot);
                    prop_assert_eq!(removed, pos.is_some());
                    if let Some(pos) = pos {
                        model[topic].remove(pos);
                    }
                }
                Op::Emit { topic } => {
                    fx.log.borrow_mut().clear();
                    let report = fx.bus.emit(fx.topics[topic], &payload);
                    let expected: Vec<(usize, u32)> =
                        model[topic].iter().map(|&s| (s, payload)).collect();
                    prop_assert_eq!(&*fx.log.borrow(), &expected);
                    prop_assert_eq!(report.delivered, expected.len());
                }
            }
            for (t, slots) in model.iter().enumerate() {
                prop_assert_eq!(fx.bus.listener_count(fx.topics[t]), slots.len());
            }
        }
        let live_topics = model.iter().filter(|s| !s.is_empty()).count();
        prop_assert_eq!(fx.bus.topic_count(), live_topics);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Guards leave nothing behind
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn dropped_guards_leave_bus_empty(
        plan in proptest::collection::vec((0..TOPICS, any::<bool>()), 0..64)
    ) {
        let bus: EventBus<u32> = EventBus::new();
        let topics: Vec<Topic> = (0..TOPICS).map(|_| Topic::mint()).collect();
        let mut guards = Vec::new();
        for (topic, early) in plan {
            let mut sub = bus.subscribe(topics[topic], |_| {});
            if early {
                sub.unsubscribe();
            }
            guards.push(sub);
        }
        for t in &topics {
            bus.emit(*t, &0);
        }
        drop(guards);
        prop_assert!(bus.is_empty());
    }
}
