//! # Error Handling
//!
//! Provides `SpecError`, raised while compiling a specification document into a
//! validator. Request-time failures are not errors; they are reported through
//! [`crate::validate::ValidationOutcome`].

use derive_more::{Display, From};

/// Build-time failure of a specification document.
///
/// We use `derive_more` for boilerplate.
/// Note: String errors default to `General`.
#[derive(Debug, Display, From)]
pub enum SpecError {
    /// Wrapper for standard IO errors (reading a specification file).
    #[display("IO Error: {_0}")]
    Io(std::io::Error),

    /// The document text is neither valid JSON nor valid YAML.
    #[from(ignore)]
    #[display("Parse Error: {_0}")]
    Parse(String),

    /// A `$ref` does not point at anything inside the document.
    #[from(ignore)]
    #[display("Unresolved reference '{_0}'")]
    UnresolvedRef(String),

    /// Two path templates normalise to the same route.
    #[from(ignore)]
    #[display("Duplicate route: '{first}' and '{second}' describe the same path")]
    DuplicateRoute {
        /// Template declared first.
        first: String,
        /// Template that collides with it.
        second: String,
    },

    /// Two templates could match the same request path with equal specificity.
    #[from(ignore)]
    #[display("Ambiguous routes: '{first}' and '{second}' overlap with equal specificity")]
    AmbiguousRoute {
        /// Template declared first.
        first: String,
        /// Template that overlaps it.
        second: String,
    },

    /// Malformed or self-contradictory parameter definition.
    #[from(ignore)]
    #[display("Invalid parameter: {_0}")]
    InvalidParameter(String),

    /// Malformed schema (bad pattern, unsupported keyword value, unguarded cycle).
    #[from(ignore)]
    #[display("Invalid schema: {_0}")]
    InvalidSchema(String),

    /// Generic errors.
    #[display("General Error: {_0}")]
    General(String),
}

/// Manual implementation of the standard Error trait.
impl std::error::Error for SpecError {}

/// Helper type alias for Result using SpecError.
pub type SpecResult<T> = Result<T, SpecError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_conversion() {
        let io_err = Error::new(ErrorKind::NotFound, "missing.yaml");
        let err: SpecError = io_err.into();
        assert!(matches!(err, SpecError::Io(_)));
    }

    #[test]
    fn test_string_conversion() {
        let err: SpecError = String::from("something wrong").into();
        match err {
            SpecError::General(s) => assert_eq!(s, "something wrong"),
            _ => panic!("String should convert to SpecError::General"),
        }
    }

    #[test]
    fn test_route_error_display() {
        let err = SpecError::AmbiguousRoute {
            first: "/a/{x}".into(),
            second: "/{y}/b".into(),
        };
        assert_eq!(
            err.to_string(),
            "Ambiguous routes: '/a/{x}' and '/{y}/b' overlap with equal specificity"
        );
    }

    #[test]
    fn test_unresolved_ref_display() {
        let err = SpecError::UnresolvedRef("#/components/schemas/Nope".into());
        assert_eq!(
            format!("{}", err),
            "Unresolved reference '#/components/schemas/Nope'"
        );
    }
}
