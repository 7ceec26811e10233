#![deny(missing_docs)]

//! # Request Validation
//!
//! Request-time side of the validator.
//!
//! - **outcome**: Error taxonomy and results.
//! - **style**: Parameter serialization styles.
//! - **coerce**: Raw strings to typed JSON.
//! - **formats**: `format` keyword checks.
//! - **body**: Schema evaluation of JSON values.
//! - **params**: Path, query and header stages.

pub mod body;
pub mod coerce;
pub mod formats;
pub mod outcome;
pub(crate) mod params;
pub mod style;

pub use body::{SchemaValidator, SchemaViolation};
pub use outcome::{ValidationError, ValidationOutcome, Violation};
