//! Engine errors.

use conjure_graph::ComposeError;
use conjure_system::error::CallError;

/// Errors returned by the engine's compose-and-call entry points.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The target could not be composed.
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// The composed callable failed.
    #[error(transparent)]
    Call(#[from] CallError),
}

impl EngineError {
    /// Returns the call error, if the failure happened at call time.
    #[must_use]
    pub fn as_call(&self) -> Option<&CallError> {
        match self {
            EngineError::Call(err) => Some(err),
            EngineError::Compose(_) => None,
        }
    }

    /// Returns the composition error, if the failure happened before the call.
    #[must_use]
    pub fn as_compose(&self) -> Option<&ComposeError> {
        match self {
            EngineError::Compose(err) => Some(err),
            EngineError::Call(_) => None,
        }
    }
}
