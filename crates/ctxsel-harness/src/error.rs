#![forbid(unsafe_code)]

use ctxsel_runtime::ContextError;
use thiserror::Error;

use crate::host::NodeId;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("unknown or unmounted node: {node}")]
    UnknownNode { node: NodeId },

    #[error("{node} is not a {expected} node")]
    WrongKind { node: NodeId, expected: &'static str },

    #[error("{node} does not hold a `{expected}`")]
    TypeMismatch { node: NodeId, expected: &'static str },

    #[error("the root node cannot be unmounted")]
    RootUnmount,

    #[error("context read failed: {0}")]
    Read(#[from] ContextError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Node the failed operation targeted, when there is one.
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::UnknownNode { node }
            | Self::WrongKind { node, .. }
            | Self::TypeMismatch { node, .. } => Some(*node),
            Self::RootUnmount | Self::Read(_) | Self::Json(_) => None,
        }
    }
}
