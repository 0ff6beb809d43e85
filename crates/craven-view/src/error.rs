#![forbid(unsafe_code)]

//! Controller construction errors.

/// Errors from building controllers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A declarative binding or a direct call named a method the controller
    /// does not have.
    #[error("unknown method `{method}` (bound from {binding})")]
    UnknownMethod { method: String, binding: String },
}

impl Error {
    pub(crate) fn unknown_method(method: &str, binding: impl Into<String>) -> Self {
        Self::UnknownMethod {
            method: method.to_owned(),
            binding: binding.into(),
        }
    }
}

/// Result alias for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
