#![deny(missing_docs)]

//! # Parameter Resolution
//!
//! Turns OpenAPI Parameter Objects into [`ParameterDef`]s.
//! Handles `$ref` indirection, style/explode defaults, location and type checks for
//! styles, `content`-encoded parameters and path-level/operation-level merging.

use crate::error::{SpecError, SpecResult};
use crate::oas::compiler::SchemaCompiler;
use crate::oas::refs::{ref_target, resolve_ref_chain};
use crate::oas::schema::{SchemaId, TypeTag};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Where a parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    /// A template placeholder.
    Path,
    /// The query string.
    Query,
    /// A request header.
    Header,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
        })
    }
}

/// Parameter serialization style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamStyle {
    /// `simple`: `a,b,c`
    Simple,
    /// `label`: `.a.b.c`
    Label,
    /// `matrix`: `;id=a,b,c`
    Matrix,
    /// `form`: `id=a&id=b` or `id=a,b`
    Form,
    /// `spaceDelimited`: `id=a%20b`
    SpaceDelimited,
    /// `pipeDelimited`: `id=a|b`
    PipeDelimited,
    /// `deepObject`: `id[role]=admin`
    DeepObject,
}

impl ParamStyle {
    fn parse(style: &str) -> Option<Self> {
        match style {
            "simple" => Some(ParamStyle::Simple),
            "label" => Some(ParamStyle::Label),
            "matrix" => Some(ParamStyle::Matrix),
            "form" => Some(ParamStyle::Form),
            "spaceDelimited" => Some(ParamStyle::SpaceDelimited),
            "pipeDelimited" => Some(ParamStyle::PipeDelimited),
            "deepObject" => Some(ParamStyle::DeepObject),
            _ => None,
        }
    }

    /// Name as written in a specification.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamStyle::Simple => "simple",
            ParamStyle::Label => "label",
            ParamStyle::Matrix => "matrix",
            ParamStyle::Form => "form",
            ParamStyle::SpaceDelimited => "spaceDelimited",
            ParamStyle::PipeDelimited => "pipeDelimited",
            ParamStyle::DeepObject => "deepObject",
        }
    }
}

impl fmt::Display for ParamStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled parameter definition of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDef {
    /// Parameter name (header names keep their declared case).
    pub name: String,
    /// Location.
    pub location: ParamLocation,
    /// Serialization style (after defaults).
    pub style: ParamStyle,
    /// Explode modifier (after defaults).
    pub explode: bool,
    /// Presence requirement. Always true for path parameters.
    pub required: bool,
    /// An empty query value is accepted without validation.
    pub allow_empty_value: bool,
    /// Value is a JSON document (`content: {application/json: ...}`) instead of a styled string.
    pub content_json: bool,
    /// Schema the decoded value must satisfy.
    pub schema: SchemaId,
    /// Node carrying the value's type (`$ref` and `allOf` wrappers followed).
    pub type_schema: SchemaId,
    /// JSON Pointer to the definition inside the specification.
    pub spec_ref: String,
}

impl ParameterDef {
    /// True when `name` refers to this parameter (case-insensitive for headers).
    pub fn is_named(&self, name: &str) -> bool {
        match self.location {
            ParamLocation::Header => self.name.eq_ignore_ascii_case(name),
            _ => self.name == name,
        }
    }

    fn key(&self) -> (String, ParamLocation) {
        match self.location {
            ParamLocation::Header => (self.name.to_ascii_lowercase(), self.location),
            _ => (self.name.clone(), self.location),
        }
    }
}

/// Raw Parameter Object as it appears in the document.
#[derive(Debug, Clone, Deserialize)]
struct ShimParameter {
    name: String,
    #[serde(rename = "in")]
    parameter_in: String,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    schema: Option<Value>,
    #[serde(default)]
    content: Option<IndexMap<String, ShimMediaType>>,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    explode: Option<bool>,
    #[serde(rename = "allowEmptyValue", default)]
    allow_empty_value: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShimMediaType {
    #[serde(default)]
    schema: Option<Value>,
}

/// Resolves a `parameters` array found at `list_pointer`.
///
/// Cookie parameters and the reserved headers `Accept`, `Content-Type` and
/// `Authorization` are skipped. A `(name, location)` pair may appear only once.
pub(crate) fn resolve_parameters(
    compiler: &mut SchemaCompiler<'_>,
    root: &Value,
    params: &Value,
    list_pointer: &str,
) -> SpecResult<Vec<ParameterDef>> {
    let list = params.as_array().ok_or_else(|| {
        SpecError::InvalidParameter(format!("'parameters' at '{}' must be an array", list_pointer))
    })?;

    let mut result = Vec::new();
    let mut seen = HashSet::new();
    for (idx, entry) in list.iter().enumerate() {
        let spec_ref = match ref_target(entry) {
            Some(r) => r.to_string(),
            None => format!("{}/{}", list_pointer, idx),
        };
        let resolved = resolve_ref_chain(root, entry)?;
        let param: ShimParameter = serde_json::from_value(resolved.clone()).map_err(|e| {
            SpecError::InvalidParameter(format!("Malformed parameter at '{}': {}", spec_ref, e))
        })?;

        let location = match param.parameter_in.as_str() {
            "path" => ParamLocation::Path,
            "query" => ParamLocation::Query,
            "header" => ParamLocation::Header,
            "cookie" | "querystring" => {
                tracing::warn!(
                    name = %param.name,
                    location = %param.parameter_in,
                    spec_ref = %spec_ref,
                    "parameter location is not validated; skipping"
                );
                continue;
            }
            other => {
                return Err(SpecError::InvalidParameter(format!(
                    "Parameter '{}' has unknown location '{}'",
                    param.name, other
                )))
            }
        };

        if should_ignore_header_param(&param.name, location) {
            tracing::warn!(name = %param.name, spec_ref = %spec_ref, "reserved header parameter ignored");
            continue;
        }

        let def = process_parameter(compiler, &param, location, spec_ref)?;
        if !seen.insert(def.key()) {
            return Err(SpecError::InvalidParameter(format!(
                "Duplicate parameter '{}' in location '{}'",
                def.name, def.location
            )));
        }
        result.push(def);
    }
    Ok(result)
}

/// Merges path-item parameters into operation parameters. Operation-level entries
/// override path-level entries with the same name and location.
pub(crate) fn merge_parameters(
    path_level: &[ParameterDef],
    operation_level: Vec<ParameterDef>,
) -> Vec<ParameterDef> {
    let overridden: HashSet<_> = operation_level.iter().map(ParameterDef::key).collect();
    let mut merged: Vec<ParameterDef> = path_level
        .iter()
        .filter(|p| !overridden.contains(&p.key()))
        .cloned()
        .collect();
    merged.extend(operation_level);
    merged
}

/// Determines whether a header parameter targets a header owned by the HTTP layer.
fn should_ignore_header_param(name: &str, location: ParamLocation) -> bool {
    location == ParamLocation::Header
        && matches!(
            name.to_ascii_lowercase().as_str(),
            "accept" | "content-type" | "authorization"
        )
}

fn process_parameter(
    compiler: &mut SchemaCompiler<'_>,
    param: &ShimParameter,
    location: ParamLocation,
    spec_ref: String,
) -> SpecResult<ParameterDef> {
    let name = param.name.clone();

    // 1. Structural checks
    if param.schema.is_some() && param.content.is_some() {
        return Err(SpecError::InvalidParameter(format!(
            "Parameter '{}' cannot specify both 'schema' and 'content'",
            name
        )));
    }
    if param.content.is_some() && (param.style.is_some() || param.explode.is_some()) {
        return Err(SpecError::InvalidParameter(format!(
            "Parameter '{}' uses 'content' and must not define style/explode",
            name
        )));
    }

    let allow_empty_value = param.allow_empty_value.unwrap_or(false);
    if allow_empty_value && location != ParamLocation::Query {
        return Err(SpecError::InvalidParameter(format!(
            "Parameter '{}' uses allowEmptyValue but is not in 'query'",
            name
        )));
    }

    if location == ParamLocation::Path && param.required == Some(false) {
        return Err(SpecError::InvalidParameter(format!(
            "Path parameter '{}' must set required: true",
            name
        )));
    }
    let required = location == ParamLocation::Path || param.required.unwrap_or(false);

    // 2. Schema, from `schema` or the single `content` entry
    let (schema_value, content_json) = match (&param.schema, &param.content) {
        (Some(schema), None) => (Some(schema), false),
        (None, Some(content)) => {
            let mut entries = content.iter();
            let (media_type, media) = match (entries.next(), entries.next()) {
                (Some(entry), None) => entry,
                _ => {
                    return Err(SpecError::InvalidParameter(format!(
                        "Parameter '{}' must define exactly one media type in 'content'",
                        name
                    )))
                }
            };
            let is_json = is_json_media_type(media_type);
            if !is_json {
                tracing::warn!(
                    name = %name,
                    media_type = %media_type,
                    "non-JSON parameter content is validated as a plain string"
                );
            }
            (media.schema.as_ref(), is_json)
        }
        _ => {
            return Err(SpecError::InvalidParameter(format!(
                "Parameter '{}' must define either 'schema' or 'content'",
                name
            )))
        }
    };
    let schema = match schema_value {
        Some(value) => compiler.compile(value, &format!("{}/schema", spec_ref))?,
        None => compiler.compile(&Value::Bool(true), &spec_ref)?,
    };

    // 3. Style and explode
    let style = resolve_style(param.style.as_deref(), location).ok_or_else(|| {
        SpecError::InvalidParameter(format!(
            "Parameter '{}' uses unknown style '{}'",
            name,
            param.style.as_deref().unwrap_or_default()
        ))
    })?;
    validate_style_for_location(&name, location, style)?;
    let type_schema = compiler.typed(schema);
    if !content_json {
        validate_style_for_type(&name, style, compiler.node(type_schema).type_tag())?;
    }
    let explode = resolve_explode(param.explode, style);

    Ok(ParameterDef {
        name,
        location,
        style,
        explode,
        required,
        allow_empty_value,
        content_json,
        schema,
        type_schema,
        spec_ref,
    })
}

/// True for `application/json` and structured-syntax `*/*+json` media types.
pub(crate) fn is_json_media_type(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

fn resolve_style(style: Option<&str>, location: ParamLocation) -> Option<ParamStyle> {
    match style {
        Some(s) => ParamStyle::parse(s),
        None => Some(match location {
            ParamLocation::Query => ParamStyle::Form,
            ParamLocation::Path | ParamLocation::Header => ParamStyle::Simple,
        }),
    }
}

fn resolve_explode(explicit: Option<bool>, style: ParamStyle) -> bool {
    explicit.unwrap_or(style == ParamStyle::Form)
}

fn allowed_styles(location: ParamLocation) -> &'static [ParamStyle] {
    match location {
        ParamLocation::Path => &[ParamStyle::Simple, ParamStyle::Label, ParamStyle::Matrix],
        ParamLocation::Query => &[
            ParamStyle::Form,
            ParamStyle::SpaceDelimited,
            ParamStyle::PipeDelimited,
            ParamStyle::DeepObject,
        ],
        ParamLocation::Header => &[ParamStyle::Simple],
    }
}

fn validate_style_for_location(name: &str, location: ParamLocation, style: ParamStyle) -> SpecResult<()> {
    let allowed = allowed_styles(location);
    if allowed.contains(&style) {
        return Ok(());
    }
    Err(SpecError::InvalidParameter(format!(
        "Parameter '{}' uses style '{}' which is not allowed for {}. Allowed styles: {}",
        name,
        style,
        location,
        allowed.iter().map(ParamStyle::as_str).collect::<Vec<_>>().join(", ")
    )))
}

fn validate_style_for_type(name: &str, style: ParamStyle, tag: TypeTag) -> SpecResult<()> {
    // Untyped schemas (combinators only) are checked at request time.
    if tag == TypeTag::Any {
        return Ok(());
    }
    match style {
        ParamStyle::DeepObject if tag != TypeTag::Object => Err(SpecError::InvalidParameter(format!(
            "Parameter '{}' uses style 'deepObject' but is not an object",
            name
        ))),
        ParamStyle::SpaceDelimited | ParamStyle::PipeDelimited if tag != TypeTag::Array => {
            Err(SpecError::InvalidParameter(format!(
                "Parameter '{}' uses style '{}' but is not an array",
                name, style
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(root: &Value, params: Value) -> SpecResult<Vec<ParameterDef>> {
        let mut compiler = SchemaCompiler::new(root);
        resolve_parameters(&mut compiler, root, &params, "#/paths/~1x/get/parameters")
    }

    #[test]
    fn test_defaults_per_location() {
        let root = json!({});
        let params = resolve(
            &root,
            json!([
                {"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}},
                {"name": "tags", "in": "query", "schema": {"type": "array", "items": {"type": "string"}}},
                {"name": "X-Trace-Id", "in": "header", "schema": {"type": "string"}}
            ]),
        )
        .unwrap();
        assert_eq!((params[0].style, params[0].explode, params[0].required), (ParamStyle::Simple, false, true));
        assert_eq!((params[1].style, params[1].explode, params[1].required), (ParamStyle::Form, true, false));
        assert_eq!((params[2].style, params[2].explode), (ParamStyle::Simple, false));
        assert_eq!(params[1].spec_ref, "#/paths/~1x/get/parameters/1");
    }

    #[test]
    fn test_ref_parameter_keeps_component_pointer() {
        let root = json!({"components": {"parameters": {"Limit": {
            "name": "limit", "in": "query", "schema": {"type": "integer", "maximum": 100}
        }}}});
        let params = resolve(&root, json!([{"$ref": "#/components/parameters/Limit"}])).unwrap();
        assert_eq!(params[0].name, "limit");
        assert_eq!(params[0].spec_ref, "#/components/parameters/Limit");
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let root = json!({});
        let err = resolve(
            &root,
            json!([
                {"name": "X-Id", "in": "header", "schema": {"type": "string"}},
                {"name": "x-id", "in": "header", "schema": {"type": "string"}}
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate parameter"));
    }

    #[test]
    fn test_style_not_allowed_for_location() {
        let root = json!({});
        let err = resolve(
            &root,
            json!([{"name": "id", "in": "path", "required": true, "style": "form", "schema": {"type": "string"}}]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not allowed for path"));
    }

    #[test]
    fn test_deep_object_requires_object_schema() {
        let root = json!({});
        let err = resolve(
            &root,
            json!([{"name": "filter", "in": "query", "style": "deepObject", "schema": {"type": "string"}}]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("deepObject"));
    }

    #[test]
    fn test_styles_accept_wrapped_schemas() {
        let root = json!({"components": {"schemas": {
            "Filter": {"type": "object", "properties": {"name": {"type": "string"}}},
            "Ids": {"type": "array", "items": {"type": "integer"}},
            "IdList": {"$ref": "#/components/schemas/Ids"}
        }}});
        let params = resolve(
            &root,
            json!([
                {"name": "filter", "in": "query", "style": "deepObject",
                 "schema": {"allOf": [{"$ref": "#/components/schemas/Filter"}]}},
                {"name": "ids", "in": "query", "style": "pipeDelimited",
                 "schema": {"$ref": "#/components/schemas/IdList"}}
            ]),
        )
        .unwrap();
        assert_ne!(params[0].type_schema, params[0].schema);
        assert_eq!(params[1].style, ParamStyle::PipeDelimited);
    }

    #[test]
    fn test_pipe_delimited_requires_array_schema() {
        let root = json!({});
        let err = resolve(
            &root,
            json!([{"name": "ids", "in": "query", "style": "pipeDelimited", "schema": {"type": "integer"}}]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("is not an array"));
    }

    #[test]
    fn test_optional_path_parameter_rejected() {
        let root = json!({});
        let err = resolve(
            &root,
            json!([{"name": "id", "in": "path", "required": false, "schema": {"type": "string"}}]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must set required: true"));
    }

    #[test]
    fn test_reserved_headers_and_cookies_skipped() {
        let root = json!({});
        let params = resolve(
            &root,
            json!([
                {"name": "Content-Type", "in": "header", "schema": {"type": "string"}},
                {"name": "session", "in": "cookie", "schema": {"type": "string"}},
                {"name": "q", "in": "query", "schema": {"type": "string"}}
            ]),
        )
        .unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "q");
    }

    #[test]
    fn test_content_parameter() {
        let root = json!({});
        let params = resolve(
            &root,
            json!([{"name": "filter", "in": "query", "content": {"application/json": {"schema": {"type": "object"}}}}]),
        )
        .unwrap();
        assert!(params[0].content_json);

        let err = resolve(
            &root,
            json!([{"name": "f", "in": "query", "schema": {"type": "string"}, "content": {"application/json": {}}}]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("both 'schema' and 'content'"));
    }

    #[test]
    fn test_allow_empty_value_only_in_query() {
        let root = json!({});
        let err = resolve(
            &root,
            json!([{"name": "X-A", "in": "header", "allowEmptyValue": true, "schema": {"type": "string"}}]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("allowEmptyValue"));
    }

    #[test]
    fn test_merge_operation_overrides_path_level() {
        let root = json!({});
        let path_level = resolve(
            &root,
            json!([
                {"name": "id", "in": "path", "required": true, "schema": {"type": "string"}},
                {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
            ]),
        )
        .unwrap();
        let op_level = resolve(
            &root,
            json!([{"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}]),
        )
        .unwrap();
        let merged = merge_parameters(&path_level, op_level);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "verbose");
        assert_eq!(merged[1].name, "id");
    }

    #[test]
    fn test_json_media_types() {
        assert!(is_json_media_type("application/json"));
        assert!(is_json_media_type("application/merge-patch+json; charset=utf-8"));
        assert!(!is_json_media_type("text/plain"));
    }
}
