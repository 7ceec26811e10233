#![deny(missing_docs)]

//! # OpenAPI Model
//!
//! Build-time side of the validator. A document is loaded once and compiled into a
//! [`SpecModel`]:
//!
//! - **document**: Reading JSON/YAML and root checks.
//! - **refs**: Local `$ref` and JSON Pointer handling.
//! - **schema**: The compiled schema arena.
//! - **compiler**: Schema objects to arena nodes.
//! - **params**: Parameter definitions, styles and defaults.
//! - **routing**: Path templates and the route index.
//! - **model**: Operations, request bodies and the assembled model.

pub(crate) mod compiler;
pub mod document;
pub mod model;
pub mod params;
pub(crate) mod refs;
pub mod routing;
pub mod schema;

pub use document::{load_document_file, parse_document, DocumentFormat};
pub use model::{Method, OperationModel, RequestBodyDef, RouteEntry, SpecModel};
pub use params::{ParamLocation, ParamStyle, ParameterDef};
pub use routing::{RouteIndex, RouteMatch, RouteTemplate, Segment};
pub use schema::{Format, SchemaArena, SchemaId, SchemaKind, SchemaNode, TypeTag};
