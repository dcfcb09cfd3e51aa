#![forbid(unsafe_code)]

//! Core: topic identifiers and the synchronous, topic-addressed event bus.
//!
//! Nothing in this crate knows about contexts, providers or consumers. The
//! bus is a delivery channel and the ids are opaque tokens; `ctxsel-runtime`
//! gives them meaning.

pub mod bus;
pub mod id;

pub use bus::{BusConfig, EmitReport, EventBus, Listener, Subscription};
pub use id::{ScopeKey, Topic};
