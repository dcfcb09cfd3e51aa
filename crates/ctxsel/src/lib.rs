#![forbid(unsafe_code)]

//! ctxsel public facade crate.
//!
//! Create contexts with [`Contexts`], mount a [`ProviderBinding`] per
//! Provider, and read with [`Context::read`] or [`Context::read_with`] so
//! each call site re-renders only when its selected slice changes.

pub use ctxsel_core as core;
pub use ctxsel_runtime as runtime;

#[cfg(feature = "harness")]
pub use ctxsel_harness as harness;

pub use ctxsel_core::{BusConfig, EmitReport, EventBus, Topic};
pub use ctxsel_runtime::{
    Consumer, Context, ContextError, Contexts, ContextsConfig, Detached, Provided,
    ProviderBinding, RenderOutcome, Scope, ValueSource,
};

pub mod prelude {
    pub use ctxsel_core::{EventBus, Topic};
    pub use ctxsel_runtime::{
        Consumer, Context, Contexts, ContextsConfig, Detached, Provided, ProviderBinding, Scope,
        ValueSource,
    };

    #[cfg(feature = "harness")]
    pub use ctxsel_harness::{NodeId, TreeHost};
}
