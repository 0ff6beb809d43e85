#![forbid(unsafe_code)]

//! Error types for model declaration and validation.

use std::fmt;

/// Errors from building model schemas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A schema declaration was malformed.
    #[error("invalid schema `{schema}`: {reason}")]
    InvalidSchema { schema: String, reason: String },
}

/// Result alias for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One failed attribute check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{attribute}: {message}")]
pub struct ValidationError {
    /// Attribute that failed.
    pub attribute: String,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for `attribute`.
    #[must_use]
    pub fn new(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            message: message.into(),
        }
    }
}

/// Every check that failed during one `validate()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Record a failure, builder style.
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, message: impl Into<String>) -> Self {
        self.push(ValidationError::new(attribute, message));
        self
    }

    /// Failures in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Failure for a given attribute, if any.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&ValidationError> {
        self.errors.iter().find(|e| e.attribute == attribute)
    }

    /// Number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("validation failed");
        }
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_failures() {
        let errors = ValidationErrors::new()
            .with("title", "must not be empty")
            .with("due", "must be a date");
        assert_eq!(
            errors.to_string(),
            "title: must not be empty; due: must be a date"
        );
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("due").map(|e| e.message.as_str()), Some("must be a date"));
    }

    #[test]
    fn empty_set_is_ok() {
        assert_eq!(ValidationErrors::new().into_result(), Ok(()));
    }

    #[test]
    fn schema_error_display() {
        let err = Error::InvalidSchema {
            schema: "Todo".into(),
            reason: "duplicate attribute `title`".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid schema `Todo`: duplicate attribute `title`"
        );
    }
}
