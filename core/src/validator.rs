#![deny(missing_docs)]

//! # Validator
//!
//! The request-facing entry point. A [`Validator`] owns a compiled [`SpecModel`] behind an
//! `Arc`, so clones are cheap and share the model across threads.
//!
//! Every stage runs the same fixed sequence and stops at the first failure:
//! route, method, path parameters, query parameters, headers, body.
//! Single-stage calls resolve route and method, then run only the requested stage.

use crate::config::ValidatorOptions;
use crate::error::{SpecError, SpecResult};
use crate::oas::document::{load_document_file, parse_document, DocumentFormat};
use crate::oas::model::{Method, OperationModel, SpecModel};
use crate::oas::params::{ParamLocation, ParameterDef};
use crate::validate::body::SchemaValidator;
use crate::validate::outcome::{ValidationError, ValidationOutcome, Violation};
use crate::validate::params::{
    check_headers, check_path_param, check_path_params, check_query_param, check_query_params,
};
use crate::validate::style::QueryPairs;
use indexmap::IndexMap;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::trace;

/// A request body as handed to the validator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Body<'a> {
    /// An already parsed JSON document.
    Json(&'a Value),
    /// Raw text, parsed as JSON during the body stage.
    Text(&'a str),
}

/// One HTTP request, borrowed from the caller for the duration of a call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Request<'a> {
    /// Method name (any case).
    pub method: &'a str,
    /// Path without query string.
    pub path: &'a str,
    /// Raw query string without the leading `?`.
    pub query: Option<&'a str>,
    /// Header map; names match case-insensitively.
    pub headers: Option<&'a HashMap<String, String>>,
    /// Request body.
    pub body: Option<Body<'a>>,
}

impl<'a> Request<'a> {
    /// A request with no query, headers or body.
    pub fn new(method: &'a str, path: &'a str) -> Self {
        Self {
            method,
            path,
            query: None,
            headers: None,
            body: None,
        }
    }

    /// Splits a request target such as `/users?limit=5#top` into path and query.
    pub fn from_target(method: &'a str, target: &'a str) -> Self {
        let target = target.split_once('#').map_or(target, |(before, _)| before);
        match target.split_once('?') {
            Some((path, query)) => Self::new(method, path).with_query(query),
            None => Self::new(method, target),
        }
    }

    /// Sets the raw query string.
    pub fn with_query(mut self, query: &'a str) -> Self {
        self.query = Some(query);
        self
    }

    /// Sets the header map.
    pub fn with_headers(mut self, headers: &'a HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Sets a parsed JSON body.
    pub fn with_json_body(mut self, body: &'a Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    /// Sets a raw text body.
    pub fn with_text_body(mut self, body: &'a str) -> Self {
        self.body = Some(Body::Text(body));
        self
    }
}

/// Optional stages of [`Validator::validate_request`].
///
/// Route, method, path and query checks always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stages {
    /// Check header parameters.
    pub headers: bool,
    /// Check the request body.
    pub body: bool,
}

impl Stages {
    /// Every stage.
    pub fn all() -> Self {
        Self {
            headers: true,
            body: true,
        }
    }

    /// Adds the header stage.
    pub fn with_headers(mut self) -> Self {
        self.headers = true;
        self
    }

    /// Adds the body stage.
    pub fn with_body(mut self) -> Self {
        self.body = true;
        self
    }
}

/// Validates requests against one compiled specification.
#[derive(Debug, Clone)]
pub struct Validator {
    model: Arc<SpecModel>,
}

/// An operation resolved from method and path.
struct Resolved<'m> {
    op: &'m OperationModel,
    bindings: IndexMap<String, String>,
}

impl Validator {
    /// Compiles an already parsed document with default options.
    pub fn from_value(root: &Value) -> SpecResult<Self> {
        Self::from_value_with_options(root, &ValidatorOptions::default())
    }

    /// Compiles an already parsed document.
    pub fn from_value_with_options(root: &Value, options: &ValidatorOptions) -> SpecResult<Self> {
        Ok(Self {
            model: Arc::new(SpecModel::build(root, options)?),
        })
    }

    /// Compiles a JSON or YAML document held in memory.
    pub fn from_text_with_options(text: &str, options: &ValidatorOptions) -> SpecResult<Self> {
        let root = parse_document(text, DocumentFormat::Auto)?;
        Self::from_value_with_options(&root, options)
    }

    /// Loads and compiles a document file with default options.
    pub fn from_path(path: impl AsRef<Path>) -> SpecResult<Self> {
        Self::from_path_with_options(path, &ValidatorOptions::default())
    }

    /// Loads and compiles a document file. The extension picks the parser.
    pub fn from_path_with_options(path: impl AsRef<Path>, options: &ValidatorOptions) -> SpecResult<Self> {
        let root = load_document_file(path)?;
        Self::from_value_with_options(&root, options)
    }

    /// The compiled model.
    pub fn model(&self) -> &SpecModel {
        &self.model
    }

    /// Checks that a route exists for `path` and declares `method`.
    pub fn validate_route(&self, method: &str, path: &str) -> ValidationOutcome {
        self.finish(method, path, self.resolve(method, path).map(|_| ()))
    }

    /// Checks every path parameter.
    pub fn validate_path_params(&self, method: &str, path: &str) -> ValidationOutcome {
        let result = self
            .resolve(method, path)
            .and_then(|r| check_path_params(&self.model, r.op, &r.bindings));
        self.finish(method, path, result)
    }

    /// Checks the path parameter `name`.
    pub fn validate_path_param(&self, method: &str, path: &str, name: &str) -> ValidationOutcome {
        let result = self.resolve(method, path).and_then(|r| {
            let def = declared(r.op, ParamLocation::Path, name)?;
            check_path_param(&self.model, def, &r.bindings)
        });
        self.finish(method, path, result)
    }

    /// Checks every query parameter.
    pub fn validate_query_params(&self, method: &str, path: &str, query: Option<&str>) -> ValidationOutcome {
        let result = self
            .resolve(method, path)
            .and_then(|r| check_query_params(&self.model, r.op, query));
        self.finish(method, path, result)
    }

    /// Checks the query parameter `name`.
    pub fn validate_query_param(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        name: &str,
    ) -> ValidationOutcome {
        let result = self.resolve(method, path).and_then(|r| {
            let def = declared(r.op, ParamLocation::Query, name)?;
            check_query_param(&self.model, def, &QueryPairs::parse(query.unwrap_or_default()))
        });
        self.finish(method, path, result)
    }

    /// Checks every header parameter.
    pub fn validate_headers(
        &self,
        method: &str,
        path: &str,
        headers: Option<&HashMap<String, String>>,
    ) -> ValidationOutcome {
        let result = self
            .resolve(method, path)
            .and_then(|r| check_headers(&self.model, r.op, headers));
        self.finish(method, path, result)
    }

    /// Checks the request body.
    pub fn validate_body(&self, method: &str, path: &str, body: Option<Body<'_>>) -> ValidationOutcome {
        let result = self
            .resolve(method, path)
            .and_then(|r| self.check_body(r.op, body));
        self.finish(method, path, result)
    }

    /// Runs the full sequence, with headers and body as selected by `stages`.
    pub fn validate_request(&self, request: &Request<'_>, stages: Stages) -> ValidationOutcome {
        let result = self.resolve(request.method, request.path).and_then(|r| {
            check_path_params(&self.model, r.op, &r.bindings)?;
            check_query_params(&self.model, r.op, request.query)?;
            if stages.headers {
                check_headers(&self.model, r.op, request.headers)?;
            }
            if stages.body {
                self.check_body(r.op, request.body)?;
            }
            Ok(())
        });
        self.finish(request.method, request.path, result)
    }

    /// Route and method stages.
    fn resolve(&self, method: &str, path: &str) -> Result<Resolved<'_>, Violation> {
        // 1. Base path
        let Some(local) = self.model.strip_base_path(path) else {
            return Err(Violation::new(
                ValidationError::InvalidRoute,
                format!(
                    "Path '{}' is outside the base path '{}'",
                    path,
                    self.model.base_path.as_deref().unwrap_or_default()
                ),
            )
            .at(path));
        };

        // 2. Route
        let Some(found) = self.model.find_route(local) else {
            return Err(
                Violation::new(ValidationError::InvalidRoute, format!("No route matches '{}'", path)).at(path),
            );
        };

        // 3. Method
        let template = found.template.as_str();
        let op = Method::parse(method).and_then(|m| self.model.operation_for(found.value, m));
        let Some(op) = op else {
            let allowed: Vec<&str> = found.value.operations.keys().map(Method::as_str).collect();
            return Err(Violation::new(
                ValidationError::InvalidMethod,
                format!(
                    "Method '{}' is not allowed for '{}' (allowed: {})",
                    method,
                    template,
                    allowed.join(", ")
                ),
            )
            .at(template)
            .with_spec_ref(found.value.spec_ref.clone()));
        };

        Ok(Resolved {
            op,
            bindings: found.bindings,
        })
    }

    fn check_body(&self, op: &OperationModel, body: Option<Body<'_>>) -> Result<(), Violation> {
        let Some(def) = &op.body else {
            return Ok(());
        };
        let fail = |message: String| {
            Violation::new(ValidationError::InvalidBody, message).with_spec_ref(def.spec_ref.clone())
        };

        let Some(body) = body else {
            return if def.required {
                Err(fail("Request body is required but missing".to_string()))
            } else {
                Ok(())
            };
        };
        let Some(schema) = def.schema else {
            return Ok(());
        };

        let value: Cow<'_, Value> = match body {
            Body::Json(value) => Cow::Borrowed(value),
            Body::Text(text) => Cow::Owned(
                serde_json::from_str(text)
                    .map_err(|e| fail(format!("Request body is not valid JSON: {}", e)))?,
            ),
        };

        SchemaValidator::new(&self.model.schemas, self.model.check_formats)
            .validate(&value, schema)
            .map_err(|violations| match violations.first() {
                Some(first) if first.path.is_empty() => fail(format!("Request body: {}", first.message)).at(""),
                Some(first) => {
                    fail(format!("Request body at '{}': {}", first.path, first.message)).at(first.path.clone())
                }
                None => fail("Request body does not match its schema".to_string()),
            })
    }

    fn finish(&self, method: &str, path: &str, result: Result<(), Violation>) -> ValidationOutcome {
        if let Err(violation) = &result {
            trace!(kind = %violation.kind, method, path, message = %violation.message, "request rejected");
        }
        result.into()
    }
}

impl FromStr for Validator {
    type Err = SpecError;

    /// Compiles a JSON or YAML document with default options.
    fn from_str(text: &str) -> SpecResult<Self> {
        Self::from_text_with_options(text, &ValidatorOptions::default())
    }
}

fn declared<'o>(op: &'o OperationModel, location: ParamLocation, name: &str) -> Result<&'o ParameterDef, Violation> {
    op.find_param(location, name).ok_or_else(|| {
        let kind = match location {
            ParamLocation::Path => ValidationError::InvalidPathParam,
            ParamLocation::Query => ValidationError::InvalidQueryParam,
            ParamLocation::Header => ValidationError::InvalidHeaderParam,
        };
        Violation::new(
            kind,
            format!("Parameter '{}' is not declared in {} for this operation", name, location),
        )
        .at(name)
        .with_spec_ref(op.spec_ref.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn petstore() -> Validator {
        Validator::from_value(&json!({
            "openapi": "3.0.3",
            "paths": {
                "/pets/{petId}": {
                    "parameters": [
                        {"name": "petId", "in": "path", "required": true, "schema": {"type": "integer"}}
                    ],
                    "get": {"operationId": "getPet"},
                    "put": {
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {
                                "type": "object",
                                "required": ["name"],
                                "properties": {"name": {"type": "string"}}
                            }}}
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_request_from_target() {
        let req = Request::from_target("GET", "/pets/1?limit=5#frag");
        assert_eq!(req.path, "/pets/1");
        assert_eq!(req.query, Some("limit=5"));
        assert_eq!(Request::from_target("GET", "/pets").query, None);
    }

    #[test]
    fn test_route_then_method() {
        let v = petstore();
        assert!(v.validate_route("get", "/pets/1").is_valid());
        assert_eq!(v.validate_route("GET", "/owners/1").kind(), ValidationError::InvalidRoute);
        assert_eq!(v.validate_route("DELETE", "/pets/1").kind(), ValidationError::InvalidMethod);
        assert_eq!(v.validate_route("BREW", "/pets/1").kind(), ValidationError::InvalidMethod);
        // Unknown route wins over unknown verb.
        assert_eq!(v.validate_route("BREW", "/owners").kind(), ValidationError::InvalidRoute);
    }

    #[test]
    fn test_single_param_stage() {
        let v = petstore();
        assert!(v.validate_path_param("GET", "/pets/7", "petId").is_valid());
        assert_eq!(
            v.validate_path_param("GET", "/pets/x", "petId").kind(),
            ValidationError::InvalidPathParam
        );
        assert_eq!(
            v.validate_path_param("GET", "/pets/7", "other").kind(),
            ValidationError::InvalidPathParam
        );
    }

    #[test]
    fn test_body_stage() {
        let v = petstore();
        let good = json!({"name": "Rex"});
        assert!(v.validate_body("PUT", "/pets/1", Some(Body::Json(&good))).is_valid());

        let missing = v.validate_body("PUT", "/pets/1", None);
        assert_eq!(missing.kind(), ValidationError::InvalidBody);
        assert_eq!(missing.message(), "Request body is required but missing");

        let broken = v.validate_body("PUT", "/pets/1", Some(Body::Text("{")));
        assert!(broken.message().starts_with("Request body is not valid JSON"));

        let wrong = v.validate_body("PUT", "/pets/1", Some(Body::Text(r#"{"name": 3}"#)));
        assert_eq!(wrong.message(), "Request body at '/name': expected string, found integer");

        // Operations without a request body accept anything.
        assert!(v.validate_body("GET", "/pets/1", Some(Body::Text("not json"))).is_valid());
    }

    #[test]
    fn test_stages_skip_headers_and_body() {
        let v = petstore();
        let req = Request::new("PUT", "/pets/1");
        assert!(v.validate_request(&req, Stages::default()).is_valid());
        assert_eq!(
            v.validate_request(&req, Stages::default().with_body()).kind(),
            ValidationError::InvalidBody
        );
    }

    #[test]
    fn test_from_str_yaml() {
        let v: Validator = "openapi: 3.1.0\npaths:\n  /health:\n    get: {}\n".parse().unwrap();
        assert!(v.validate_route("GET", "/health").is_valid());
    }
}
