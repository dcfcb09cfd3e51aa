#![forbid(unsafe_code)]

//! Reference host and test fixtures for ctxsel.
//!
//! [`TreeHost`] implements the host side of the context contract (scoping,
//! per-instance re-render, mount/unmount lifecycle) over an in-memory tree so
//! the runtime can be exercised end to end without a rendering engine.
//! Every host operation is journaled as a [`HostEvent`]; [`Journal::to_jsonl`]
//! dumps the run for postmortem inspection.

pub mod error;
pub mod host;
pub mod journal;

pub use error::{HarnessError, Result};
pub use host::{NodeId, NodeScope, TreeHost};
pub use journal::{HostEvent, Journal};
