#![forbid(unsafe_code)]

use ctxsel_core::Topic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextError>;

/// Why a context could not be read.
///
/// The plain read operations turn these into `None`; the `try_` variants
/// surface them for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("{topic} belongs to a registry that has been dropped")]
    RegistryDropped { topic: Topic },

    #[error("{topic} was not created by this registry")]
    Foreign { topic: Topic },

    #[error("value resolved for {topic} is not a `{expected}`")]
    TypeMismatch { topic: Topic, expected: &'static str },
}

impl ContextError {
    /// Topic of the context the failed read targeted.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::RegistryDropped { topic }
            | Self::Foreign { topic }
            | Self::TypeMismatch { topic, .. } => *topic,
        }
    }
}
