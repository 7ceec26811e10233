#![deny(missing_docs)]

//! # Validation Outcomes
//!
//! Request-time results. A failed stage is not an error in the Rust sense; it is a
//! [`Violation`] carried by [`ValidationOutcome::Invalid`].

use derive_more::Display;
use serde_json::{json, Value};
use std::fmt;

/// Failure category, one per validation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ValidationError {
    /// The request passed.
    #[display("NONE")]
    None,
    /// The route exists but not for this method.
    #[display("INVALID_METHOD")]
    InvalidMethod,
    /// No route template matches the path.
    #[display("INVALID_ROUTE")]
    InvalidRoute,
    /// A path parameter is missing or malformed.
    #[display("INVALID_PATH_PARAM")]
    InvalidPathParam,
    /// A query parameter is missing or malformed.
    #[display("INVALID_QUERY_PARAM")]
    InvalidQueryParam,
    /// A header parameter is missing or malformed.
    #[display("INVALID_HEADER_PARAM")]
    InvalidHeaderParam,
    /// The body is missing, unparseable or does not satisfy its schema.
    #[display("INVALID_BODY")]
    InvalidBody,
    /// Reserved for response validation; never produced.
    #[display("INVALID_RSP")]
    InvalidRsp,
}

impl ValidationError {
    /// Stable integer code (`0` for success, negative for failures).
    pub fn code(self) -> i32 {
        match self {
            ValidationError::None => 0,
            ValidationError::InvalidMethod => -1,
            ValidationError::InvalidRoute => -2,
            ValidationError::InvalidPathParam => -3,
            ValidationError::InvalidQueryParam => -4,
            ValidationError::InvalidHeaderParam => -5,
            ValidationError::InvalidBody => -6,
            ValidationError::InvalidRsp => -7,
        }
    }
}

/// Details of a failed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Failure category.
    pub kind: ValidationError,
    /// Human-readable description, never empty.
    pub message: String,
    /// Offending parameter name or JSON pointer into the body.
    pub location: Option<String>,
    /// JSON pointer to the definition that was violated.
    pub spec_ref: Option<String>,
}

impl Violation {
    /// A violation without location details.
    pub fn new(kind: ValidationError, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            spec_ref: None,
        }
    }

    /// Attaches the offending parameter or body path.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Attaches the violated definition.
    pub fn with_spec_ref(mut self, spec_ref: impl Into<String>) -> Self {
        self.spec_ref = Some(spec_ref.into());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of validating a request or one of its stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Every evaluated stage passed.
    Valid,
    /// The first failing stage.
    Invalid(Violation),
}

impl ValidationOutcome {
    /// True for [`ValidationOutcome::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    /// Failure category, [`ValidationError::None`] on success.
    pub fn kind(&self) -> ValidationError {
        match self {
            ValidationOutcome::Valid => ValidationError::None,
            ValidationOutcome::Invalid(v) => v.kind,
        }
    }

    /// Failure message, empty on success.
    pub fn message(&self) -> &str {
        match self {
            ValidationOutcome::Valid => "",
            ValidationOutcome::Invalid(v) => &v.message,
        }
    }

    /// The violation, if any.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Invalid(v) => Some(v),
        }
    }

    /// Renders the error envelope returned to clients:
    /// `{"errorCode": "INVALID_…", "details": {"specRef", "location", "description"}}`.
    ///
    /// Returns `null` on success.
    pub fn to_json(&self) -> Value {
        match self {
            ValidationOutcome::Valid => Value::Null,
            ValidationOutcome::Invalid(v) => json!({
                "errorCode": v.kind.to_string(),
                "details": {
                    "specRef": v.spec_ref,
                    "location": v.location,
                    "description": v.message,
                }
            }),
        }
    }
}

impl From<Result<(), Violation>> for ValidationOutcome {
    fn from(result: Result<(), Violation>) -> Self {
        match result {
            Ok(()) => ValidationOutcome::Valid,
            Err(v) => ValidationOutcome::Invalid(v),
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationOutcome::Valid => f.write_str("NONE"),
            ValidationOutcome::Invalid(v) => v.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_names() {
        assert_eq!(ValidationError::None.code(), 0);
        assert_eq!(ValidationError::InvalidBody.code(), -6);
        assert_eq!(ValidationError::InvalidRsp.code(), -7);
        assert_eq!(ValidationError::InvalidQueryParam.to_string(), "INVALID_QUERY_PARAM");
    }

    #[test]
    fn test_valid_outcome_has_empty_message() {
        let outcome = ValidationOutcome::Valid;
        assert!(outcome.is_valid());
        assert_eq!(outcome.kind(), ValidationError::None);
        assert_eq!(outcome.message(), "");
        assert!(outcome.to_json().is_null());
    }

    #[test]
    fn test_error_envelope() {
        let outcome = ValidationOutcome::Invalid(
            Violation::new(ValidationError::InvalidPathParam, "Path parameter 'id' must be an integer")
                .at("id")
                .with_spec_ref("#/paths/~1users~1{id}/get/parameters/0"),
        );
        assert_eq!(
            outcome.to_json(),
            json!({
                "errorCode": "INVALID_PATH_PARAM",
                "details": {
                    "specRef": "#/paths/~1users~1{id}/get/parameters/0",
                    "location": "id",
                    "description": "Path parameter 'id' must be an integer"
                }
            })
        );
        assert_eq!(
            outcome.to_string(),
            "INVALID_PATH_PARAM: Path parameter 'id' must be an integer"
        );
    }

    #[test]
    fn test_from_result() {
        let ok: ValidationOutcome = Ok(()).into();
        assert!(ok.is_valid());
        let err: ValidationOutcome = Err(Violation::new(ValidationError::InvalidRoute, "no route")).into();
        assert_eq!(err.kind(), ValidationError::InvalidRoute);
    }
}
