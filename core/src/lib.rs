#![deny(missing_docs)]

//! # OAS Validator Core
//!
//! Validates HTTP requests against an OpenAPI 3.x document.
//!
//! A document is compiled once into an immutable model (routes, operations, parameter
//! definitions and a schema arena). Requests are then checked stage by stage: route,
//! method, path parameters, query parameters, headers and JSON body. The first failing
//! stage determines the reported [`ValidationError`].
//!
//! ```no_run
//! use oas_validator_core::{Request, Stages, Validator};
//!
//! let validator = Validator::from_path("openapi.yaml").unwrap();
//! let outcome = validator.validate_request(&Request::from_target("GET", "/users/42"), Stages::all());
//! assert!(outcome.is_valid());
//! ```

/// Shared error types.
pub mod error;

/// Validator options.
pub mod config;

/// Specification loading and compilation.
pub mod oas;

/// Request-time checks.
pub mod validate;

/// The request-facing entry point.
pub mod validator;

pub use config::ValidatorOptions;
pub use error::{SpecError, SpecResult};
pub use oas::{Method, SpecModel};
pub use validate::{ValidationError, ValidationOutcome, Violation};
pub use validator::{Body, Request, Stages, Validator};
