//! Error types shared by the store and its subscriptions.

use std::any::Any;

/// Boxed error returned by fallible reducers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported while building stores or applying reducers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("action name must not be empty")]
    EmptyActionName,

    #[error("reducer for action '{action}' is registered more than once")]
    DuplicateAction { action: String },

    #[error("no reducer provided for action '{action}'")]
    MissingReducer { action: String },

    #[error("reducer for action '{action}' failed: {message}")]
    ReducerFailed { action: String, message: String },

    #[error("reducer for action '{action}' panicked: {message}")]
    ReducerPanicked { action: String, message: String },
}

impl Error {
    /// Name of the action the error relates to, if any.
    pub fn action(&self) -> Option<&str> {
        match self {
            Error::EmptyActionName => None,
            Error::DuplicateAction { action }
            | Error::MissingReducer { action }
            | Error::ReducerFailed { action, .. }
            | Error::ReducerPanicked { action, .. } => Some(action),
        }
    }

    pub(crate) fn from_panic(action: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Error::ReducerPanicked {
            action: action.to_string(),
            message,
        }
    }
}
