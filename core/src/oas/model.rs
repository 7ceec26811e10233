#![deny(missing_docs)]

//! # Spec Model
//!
//! The compiled, immutable form of a specification: the route index, one
//! [`OperationModel`] per route and method, and the schema arena they point into.
//!
//! [`SpecModel::build`] walks `paths` once. Every reference is resolved and every schema
//! compiled at this point, so request-time code never touches the source document.

use crate::config::ValidatorOptions;
use crate::error::{SpecError, SpecResult};
use crate::oas::compiler::SchemaCompiler;
use crate::oas::document::validate_document_root;
use crate::oas::params::{
    is_json_media_type, merge_parameters, resolve_parameters, ParamLocation, ParameterDef,
};
use crate::oas::refs::{encode_pointer_segment, join_pointer, ref_target, resolve_ref_chain};
use crate::oas::routing::{RouteIndex, RouteMatch, RouteTemplate};
use crate::oas::schema::{SchemaArena, SchemaId};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// HTTP methods an operation can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
    /// HEAD
    Head,
    /// PATCH
    Patch,
    /// TRACE
    Trace,
    /// CONNECT
    Connect,
}

impl Method {
    /// All methods, in the order path items list them.
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Put,
        Method::Post,
        Method::Delete,
        Method::Options,
        Method::Head,
        Method::Patch,
        Method::Trace,
        Method::Connect,
    ];

    /// Parses a method name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    /// Upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `requestBody` of an operation, restricted to its JSON media type.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodyDef {
    /// Schema of the JSON body; `None` accepts any JSON document.
    pub schema: Option<SchemaId>,
    /// A body must be sent.
    pub required: bool,
    /// The media type the schema was taken from.
    pub media_type: String,
    /// Pointer to the request body definition.
    pub spec_ref: String,
}

/// One method on one route.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationModel {
    /// HTTP method.
    pub method: Method,
    /// `operationId`, when declared.
    pub operation_id: Option<String>,
    /// Path-level and operation-level parameters, merged.
    pub parameters: Vec<ParameterDef>,
    /// JSON request body. `None` means the body is not validated.
    pub body: Option<RequestBodyDef>,
    /// Pointer to the operation object.
    pub spec_ref: String,
}

impl OperationModel {
    /// Parameters declared for `location`.
    pub fn params_in(&self, location: ParamLocation) -> impl Iterator<Item = &ParameterDef> {
        self.parameters.iter().filter(move |p| p.location == location)
    }

    /// Looks a parameter up by name and location.
    pub fn find_param(&self, location: ParamLocation, name: &str) -> Option<&ParameterDef> {
        self.params_in(location).find(|p| p.is_named(name))
    }
}

/// Operations of one path template.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    /// Operations keyed by method.
    pub operations: IndexMap<Method, OperationModel>,
    /// Pointer to the path item.
    pub spec_ref: String,
}

/// Compiled specification shared by every validation call.
#[derive(Debug)]
pub struct SpecModel {
    /// Every compiled schema.
    pub schemas: SchemaArena,
    /// Route templates and their operations.
    pub routes: RouteIndex<RouteEntry>,
    /// Fallback methods tried when a route lacks the request method.
    pub method_aliases: HashMap<Method, Vec<Method>>,
    /// Prefix removed from request paths before matching.
    pub base_path: Option<String>,
    /// Enforce recognised `format` tags.
    pub check_formats: bool,
    /// Undeclared query keys are invalid.
    pub reject_unknown_query_params: bool,
}

impl SpecModel {
    /// Compiles a parsed specification document.
    pub fn build(root: &Value, options: &ValidatorOptions) -> SpecResult<Self> {
        validate_document_root(root)?;

        let mut compiler = SchemaCompiler::new(root);
        let mut entries = Vec::new();
        let mut operation_ids = HashSet::new();
        let mut operation_count = 0usize;

        // 1. Paths
        if let Some(paths) = root.get("paths").and_then(Value::as_object) {
            for (path, item) in paths {
                if path.starts_with("x-") {
                    continue;
                }
                let path_pointer = join_pointer(["paths", path.as_str()]);
                let (template, entry) = build_route_entry(
                    &mut compiler,
                    root,
                    path,
                    item,
                    &path_pointer,
                    &mut operation_ids,
                )?;
                operation_count += entry.operations.len();
                entries.push((template, entry));
            }
        }

        // 2. Options
        let method_aliases = parse_method_aliases(&options.method_aliases)?;
        let base_path = normalize_base_path(options.base_path.as_deref());

        // 3. Indexes
        let routes = RouteIndex::build(entries)?;
        let schemas = compiler.finish()?;

        tracing::debug!(
            routes = routes.len(),
            operations = operation_count,
            schemas = schemas.len(),
            "compiled specification"
        );

        Ok(Self {
            schemas,
            routes,
            method_aliases,
            base_path,
            check_formats: options.check_formats,
            reject_unknown_query_params: options.reject_unknown_query_params,
        })
    }

    /// Removes the configured base path. `None` when the path lies outside it.
    pub fn strip_base_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        let Some(base) = self.base_path.as_deref() else {
            return Some(path);
        };
        match path.strip_prefix(base) {
            Some("") => Some("/"),
            Some(rest) if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }

    /// Finds the route for a request path (base path already removed).
    pub fn find_route(&self, path: &str) -> Option<RouteMatch<'_, RouteEntry>> {
        self.routes.find(path)
    }

    /// Picks the operation of `entry` for `method`, falling back to configured aliases.
    pub fn operation_for<'e>(&self, entry: &'e RouteEntry, method: Method) -> Option<&'e OperationModel> {
        entry.operations.get(&method).or_else(|| {
            self.method_aliases
                .get(&method)?
                .iter()
                .find_map(|alias| entry.operations.get(alias))
        })
    }
}

fn build_route_entry(
    compiler: &mut SchemaCompiler<'_>,
    root: &Value,
    path: &str,
    item: &Value,
    path_pointer: &str,
    operation_ids: &mut HashSet<String>,
) -> SpecResult<(RouteTemplate, RouteEntry)> {
    let item = resolve_ref_chain(root, item)?;
    let item_map = item.as_object().ok_or_else(|| {
        SpecError::General(format!("Path item '{}' must be an object", path))
    })?;
    let template = RouteTemplate::parse(path)?;

    // Handle common parameters defined at PathItem level.
    let common_params = match item_map.get("parameters") {
        Some(params) => resolve_parameters(
            compiler,
            root,
            params,
            &format!("{}/parameters", path_pointer),
        )?,
        None => Vec::new(),
    };

    let mut operations = IndexMap::new();
    for (key, op) in item_map {
        let Some(method) = Method::parse(key) else {
            continue;
        };
        if operations.contains_key(&method) {
            return Err(SpecError::General(format!(
                "Path '{}' declares method {} more than once",
                path, method
            )));
        }
        let op_pointer = format!("{}/{}", path_pointer, encode_pointer_segment(key));
        let op_map = op.as_object().ok_or_else(|| {
            SpecError::General(format!("Operation {} {} must be an object", method, path))
        })?;

        let operation_id = op_map
            .get("operationId")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(op_id) = &operation_id {
            if !operation_ids.insert(op_id.clone()) {
                return Err(SpecError::General(format!(
                    "Duplicate operationId '{}' detected",
                    op_id
                )));
            }
        }

        let op_params = match op_map.get("parameters") {
            Some(params) => resolve_parameters(
                compiler,
                root,
                params,
                &format!("{}/parameters", op_pointer),
            )?,
            None => Vec::new(),
        };
        let parameters = merge_parameters(&common_params, op_params);
        validate_path_parameters(&template, &parameters, method)?;

        let body = match op_map.get("requestBody") {
            Some(body) => build_request_body(compiler, root, body, &op_pointer)?,
            None => None,
        };

        operations.insert(
            method,
            OperationModel {
                method,
                operation_id,
                parameters,
                body,
                spec_ref: op_pointer,
            },
        );
    }

    let entry = RouteEntry {
        operations,
        spec_ref: path_pointer.to_string(),
    };
    Ok((template, entry))
}

/// Every path parameter must name a placeholder. Placeholders without a definition
/// match any segment.
fn validate_path_parameters(
    template: &RouteTemplate,
    params: &[ParameterDef],
    method: Method,
) -> SpecResult<()> {
    let placeholders: HashSet<&str> = template.param_names().collect();

    for param in params.iter().filter(|p| p.location == ParamLocation::Path) {
        if !placeholders.contains(param.name.as_str()) {
            return Err(SpecError::InvalidParameter(format!(
                "Path parameter '{}' is not present in path template '{}'",
                param.name,
                template.as_str()
            )));
        }
    }

    for name in placeholders {
        if !params
            .iter()
            .any(|p| p.location == ParamLocation::Path && p.name == name)
        {
            tracing::debug!(
                template = template.as_str(),
                %method,
                placeholder = name,
                "placeholder has no parameter definition"
            );
        }
    }
    Ok(())
}

fn build_request_body(
    compiler: &mut SchemaCompiler<'_>,
    root: &Value,
    body: &Value,
    op_pointer: &str,
) -> SpecResult<Option<RequestBodyDef>> {
    let spec_ref = match ref_target(body) {
        Some(r) => r.to_string(),
        None => format!("{}/requestBody", op_pointer),
    };
    let body = resolve_ref_chain(root, body)?;
    let required = body.get("required").and_then(Value::as_bool).unwrap_or(false);

    let Some(content) = body.get("content").and_then(Value::as_object) else {
        return Err(SpecError::General(format!(
            "Request body at '{}' must define 'content'",
            spec_ref
        )));
    };

    let Some((media_type, media)) = content.iter().find(|(mt, _)| is_json_media_type(mt)) else {
        tracing::warn!(
            spec_ref = %spec_ref,
            media_types = ?content.keys().collect::<Vec<_>>(),
            "request body has no JSON media type; body is not validated"
        );
        return Ok(None);
    };

    let schema = match media.get("schema") {
        Some(schema) => Some(compiler.compile(
            schema,
            &format!(
                "{}/content/{}/schema",
                spec_ref,
                encode_pointer_segment(media_type)
            ),
        )?),
        None => None,
    };

    Ok(Some(RequestBodyDef {
        schema,
        required,
        media_type: media_type.clone(),
        spec_ref,
    }))
}

fn parse_method_aliases(
    raw: &IndexMap<String, Vec<String>>,
) -> SpecResult<HashMap<Method, Vec<Method>>> {
    let parse = |name: &str| {
        Method::parse(name)
            .ok_or_else(|| SpecError::General(format!("Unknown HTTP method '{}' in method_aliases", name)))
    };
    raw.iter()
        .map(|(method, fallbacks)| {
            let fallbacks = fallbacks
                .iter()
                .map(|f| parse(f.as_str()))
                .collect::<SpecResult<Vec<_>>>()?;
            Ok((parse(method.as_str())?, fallbacks))
        })
        .collect()
}

fn normalize_base_path(base: Option<&str>) -> Option<String> {
    let trimmed = base?.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    })
}
