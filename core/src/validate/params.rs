#![deny(missing_docs)]

//! # Parameter Stages
//!
//! Path, query and header checks for one operation. Each parameter goes through the same
//! steps:
//! 1. presence (`required`, empty values and `allowEmptyValue`);
//! 2. style decoding into a string, list or map;
//! 3. coercion of the pieces to the primitive types the schema names;
//! 4. schema evaluation.

use crate::oas::model::{OperationModel, SpecModel};
use crate::oas::params::{ParamLocation, ParamStyle, ParameterDef};
use crate::oas::schema::{AdditionalProperties, SchemaId, SchemaKind, SchemaNode, TypeTag};
use crate::validate::body::SchemaValidator;
use crate::validate::coerce::{coerce_auto, coerce_scalar};
use crate::validate::outcome::{ValidationError, Violation};
use crate::validate::style::{
    decode_component, decode_header, decode_json, decode_path, decode_query, decode_query_component,
    QueryPairs, RawValue, Shape,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Checks every path parameter of `op` against the placeholder bindings of a route match.
pub(crate) fn check_path_params(
    model: &SpecModel,
    op: &OperationModel,
    bindings: &IndexMap<String, String>,
) -> Result<(), Violation> {
    for def in op.params_in(ParamLocation::Path) {
        check_path_param(model, def, bindings)?;
    }
    Ok(())
}

/// Checks one path parameter.
pub(crate) fn check_path_param(
    model: &SpecModel,
    def: &ParameterDef,
    bindings: &IndexMap<String, String>,
) -> Result<(), Violation> {
    let Some(raw) = bindings.get(&def.name) else {
        return Err(missing(def));
    };
    if raw.is_empty() {
        return Err(no_data(def));
    }

    let decoded = if def.content_json {
        decode_json(&decode_component(raw))
            .map_err(|reason| invalid(def, reason))?
    } else {
        let shape = shape_of(model.schemas.get(def.type_schema));
        let raw_value =
            decode_path(raw, &def.name, def.style, def.explode, shape).map_err(|reason| invalid(def, reason))?;
        type_raw_value(model, def.type_schema, raw_value).map_err(|reason| invalid(def, reason))?
    };
    check_schema(model, def, &decoded)
}

/// Checks every query parameter of `op`, then (when configured) rejects undeclared keys.
pub(crate) fn check_query_params(
    model: &SpecModel,
    op: &OperationModel,
    query: Option<&str>,
) -> Result<(), Violation> {
    let pairs = QueryPairs::parse(query.unwrap_or_default());
    for def in op.params_in(ParamLocation::Query) {
        check_query_param(model, def, &pairs)?;
    }

    if model.reject_unknown_query_params {
        for key in pairs.keys() {
            let claimed = op
                .params_in(ParamLocation::Query)
                .any(|def| claims_query_key(model, def, key));
            if !claimed {
                return Err(Violation::new(
                    ValidationError::InvalidQueryParam,
                    format!("Unknown query parameter '{}'", key),
                )
                .at(key)
                .with_spec_ref(op.spec_ref.clone()));
            }
        }
    }
    Ok(())
}

/// Checks one query parameter against the parsed query string.
pub(crate) fn check_query_param(
    model: &SpecModel,
    def: &ParameterDef,
    pairs: &QueryPairs<'_>,
) -> Result<(), Violation> {
    let node = model.schemas.get(def.type_schema);

    // 1. Presence and empty values
    if def.style != ParamStyle::DeepObject {
        let values = pairs.values(&def.name);
        if !values.is_empty() && values.iter().all(|v| v.is_empty()) {
            return if def.allow_empty_value {
                Ok(())
            } else {
                Err(no_data(def))
            };
        }
    }

    let decoded = if def.content_json {
        let values = pairs.values(&def.name);
        let Some(raw) = values.first() else {
            return absent(def);
        };
        decode_json(&decode_query_component(raw)).map_err(|reason| invalid(def, reason))?
    } else {
        let properties: Vec<&str> = match &node.kind {
            SchemaKind::Object(rules) => rules.properties.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        };
        let raw_value = decode_query(pairs, &def.name, def.style, def.explode, shape_of(node), &properties)
            .map_err(|reason| invalid(def, reason))?;
        let Some(raw_value) = raw_value else {
            return absent(def);
        };
        type_raw_value(model, def.type_schema, raw_value).map_err(|reason| invalid(def, reason))?
    };
    check_schema(model, def, &decoded)
}

/// Checks every header parameter of `op`. Header names match case-insensitively; an exact
/// match wins, otherwise the lexicographically smallest spelling is used.
pub(crate) fn check_headers(
    model: &SpecModel,
    op: &OperationModel,
    headers: Option<&HashMap<String, String>>,
) -> Result<(), Violation> {
    for def in op.params_in(ParamLocation::Header) {
        let value = headers.and_then(|map| header_value(map, def));
        let Some(raw) = value else {
            absent(def)?;
            continue;
        };
        if raw.trim().is_empty() {
            return Err(no_data(def));
        }

        let decoded = if def.content_json {
            decode_json(raw).map_err(|reason| invalid(def, reason))?
        } else {
            let shape = shape_of(model.schemas.get(def.type_schema));
            let raw_value = decode_header(raw, def.explode, shape).map_err(|reason| invalid(def, reason))?;
            type_raw_value(model, def.type_schema, raw_value).map_err(|reason| invalid(def, reason))?
        };
        check_schema(model, def, &decoded)?;
    }
    Ok(())
}

fn header_value<'h>(headers: &'h HashMap<String, String>, def: &ParameterDef) -> Option<&'h str> {
    if let Some(value) = headers.get(&def.name) {
        return Some(value.as_str());
    }
    headers
        .iter()
        .filter(|(name, _)| def.is_named(name))
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, value)| value.as_str())
}

/// True when `key` of the query string belongs to `def`.
fn claims_query_key(model: &SpecModel, def: &ParameterDef, key: &str) -> bool {
    if key == def.name {
        return true;
    }
    match (def.style, &model.schemas.get(def.type_schema).kind) {
        (ParamStyle::DeepObject, _) => key
            .strip_prefix(def.name.as_str())
            .is_some_and(|rest| rest.starts_with('[') && rest.ends_with(']')),
        (ParamStyle::Form, SchemaKind::Object(rules)) if def.explode => rules.properties.contains_key(key),
        _ => false,
    }
}

fn shape_of(node: &SchemaNode) -> Shape {
    match node.type_tag() {
        TypeTag::Array => Shape::Array,
        TypeTag::Object => Shape::Object,
        _ => Shape::Scalar,
    }
}

/// Types the pieces of a decoded value according to the schema. `schema` is already the
/// typed node; item and property schemas are resolved here.
fn type_raw_value(model: &SpecModel, schema: SchemaId, raw: RawValue) -> Result<Value, String> {
    let node = model.schemas.get(schema);
    match raw {
        RawValue::Scalar(s) => coerce_scalar(&s, node.type_tag()),
        RawValue::Array(items) => {
            let item_tag = match &node.kind {
                SchemaKind::Array(rules) => rules.items.map(|id| model.schemas.type_tag_of(id)),
                _ => None,
            };
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    coerce_piece(item, item_tag).map_err(|reason| format!("item #{} {}", idx + 1, reason))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        RawValue::Object(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                let tag = match &node.kind {
                    SchemaKind::Object(rules) => match (rules.properties.get(&key), rules.additional) {
                        (Some(id), _) => Some(model.schemas.type_tag_of(*id)),
                        (None, AdditionalProperties::Schema(id)) => Some(model.schemas.type_tag_of(id)),
                        _ => None,
                    },
                    _ => None,
                };
                let typed = coerce_piece(&value, tag).map_err(|reason| format!("property '{}' {}", key, reason))?;
                map.insert(key, typed);
            }
            Ok(Value::Object(map))
        }
    }
}

fn coerce_piece(raw: &str, tag: Option<TypeTag>) -> Result<Value, String> {
    match tag {
        Some(tag) => coerce_scalar(raw, tag),
        None => Ok(coerce_auto(raw)),
    }
}

fn check_schema(model: &SpecModel, def: &ParameterDef, value: &Value) -> Result<(), Violation> {
    SchemaValidator::new(&model.schemas, model.check_formats)
        .validate(value, def.schema)
        .map_err(|violations| {
            let reason = violations
                .first()
                .map(|v| v.describe())
                .unwrap_or_else(|| "does not match its schema".to_string());
            invalid(def, reason)
        })
}

fn error_kind(location: ParamLocation) -> ValidationError {
    match location {
        ParamLocation::Path => ValidationError::InvalidPathParam,
        ParamLocation::Query => ValidationError::InvalidQueryParam,
        ParamLocation::Header => ValidationError::InvalidHeaderParam,
    }
}

fn label(location: ParamLocation) -> &'static str {
    match location {
        ParamLocation::Path => "Path parameter",
        ParamLocation::Query => "Query parameter",
        ParamLocation::Header => "Header",
    }
}

fn violation(def: &ParameterDef, message: String) -> Violation {
    Violation::new(error_kind(def.location), message)
        .at(def.name.clone())
        .with_spec_ref(def.spec_ref.clone())
}

fn invalid(def: &ParameterDef, reason: String) -> Violation {
    violation(def, format!("{} '{}' {}", label(def.location), def.name, reason))
}

fn missing(def: &ParameterDef) -> Violation {
    violation(def, format!("Required {} '{}' is missing", label(def.location).to_lowercase(), def.name))
}

fn no_data(def: &ParameterDef) -> Violation {
    violation(def, format!("{} '{}' has no data", label(def.location), def.name))
}

/// Outcome for a parameter the request does not carry.
fn absent(def: &ParameterDef) -> Result<(), Violation> {
    if def.required {
        Err(missing(def))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorOptions;
    use crate::oas::model::Method;
    use serde_json::json;

    fn model_with(params: Value, options: &ValidatorOptions) -> SpecModel {
        SpecModel::build(
            &json!({
                "openapi": "3.0.0",
                "paths": {"/things/{id}": {"get": {"parameters": params}}}
            }),
            options,
        )
        .unwrap()
    }

    fn op(model: &SpecModel) -> &OperationModel {
        let m = model.find_route("/things/1").unwrap();
        model.operation_for(m.value, Method::Get).unwrap()
    }

    fn id_param() -> Value {
        json!({"name": "id", "in": "path", "required": true, "schema": {"type": "integer", "minimum": 1}})
    }

    #[test]
    fn test_path_param_coercion_and_bounds() {
        let model = model_with(json!([id_param()]), &ValidatorOptions::default());
        let op = op(&model);
        let bind = |v: &str| IndexMap::from([("id".to_string(), v.to_string())]);

        assert!(check_path_params(&model, op, &bind("42")).is_ok());
        let err = check_path_params(&model, op, &bind("abc")).unwrap_err();
        assert_eq!(err.kind, ValidationError::InvalidPathParam);
        assert_eq!(err.message, "Path parameter 'id' must be an integer, got 'abc'");
        assert_eq!(err.location.as_deref(), Some("id"));

        let err = check_path_params(&model, op, &bind("0")).unwrap_err();
        assert_eq!(err.message, "Path parameter 'id' must be at least 1");
    }

    #[test]
    fn test_query_required_optional_and_empty() {
        let model = model_with(
            json!([
                id_param(),
                {"name": "limit", "in": "query", "required": true, "schema": {"type": "integer"}},
                {"name": "q", "in": "query", "schema": {"type": "string"}},
                {"name": "flag", "in": "query", "allowEmptyValue": true, "schema": {"type": "boolean"}}
            ]),
            &ValidatorOptions::default(),
        );
        let op = op(&model);

        assert!(check_query_params(&model, op, Some("limit=5")).is_ok());
        assert!(check_query_params(&model, op, Some("limit=5&flag=")).is_ok());

        let err = check_query_params(&model, op, None).unwrap_err();
        assert_eq!(err.message, "Required query parameter 'limit' is missing");

        let err = check_query_params(&model, op, Some("limit=5&q=")).unwrap_err();
        assert_eq!(err.message, "Query parameter 'q' has no data");
    }

    #[test]
    fn test_query_array_items_typed() {
        let model = model_with(
            json!([
                id_param(),
                {"name": "ids", "in": "query", "style": "pipeDelimited", "explode": false,
                 "schema": {"type": "array", "items": {"type": "integer"}, "maxItems": 3}}
            ]),
            &ValidatorOptions::default(),
        );
        let op = op(&model);
        assert!(check_query_params(&model, op, Some("ids=1|2|3")).is_ok());

        let err = check_query_params(&model, op, Some("ids=1|x")).unwrap_err();
        assert_eq!(err.message, "Query parameter 'ids' item #2 must be an integer, got 'x'");

        let err = check_query_params(&model, op, Some("ids=1|2|3|4")).unwrap_err();
        assert!(err.message.contains("at most 3 items"), "{}", err.message);
    }

    #[test]
    fn test_deep_object_and_content_json() {
        let model = model_with(
            json!([
                id_param(),
                {"name": "filter", "in": "query", "style": "deepObject",
                 "schema": {"type": "object", "properties": {"age": {"type": "integer"}}, "additionalProperties": false}},
                {"name": "meta", "in": "query",
                 "content": {"application/json": {"schema": {"type": "object", "required": ["v"]}}}}
            ]),
            &ValidatorOptions::default(),
        );
        let op = op(&model);
        assert!(check_query_params(&model, op, Some("filter[age]=30&meta=%7B%22v%22%3A1%7D")).is_ok());

        let err = check_query_params(&model, op, Some("filter[name]=x")).unwrap_err();
        assert!(err.message.contains("property 'name' is not allowed"), "{}", err.message);

        let err = check_query_params(&model, op, Some("meta=%7B%7D")).unwrap_err();
        assert!(err.message.contains("missing required property 'v'"), "{}", err.message);
    }

    #[test]
    fn test_unknown_query_keys() {
        let options = ValidatorOptions {
            reject_unknown_query_params: true,
            ..ValidatorOptions::default()
        };
        let model = model_with(
            json!([
                id_param(),
                {"name": "f", "in": "query", "style": "deepObject", "schema": {"type": "object"}}
            ]),
            &options,
        );
        let op = op(&model);
        assert!(check_query_params(&model, op, Some("f[a]=1")).is_ok());
        let err = check_query_params(&model, op, Some("f[a]=1&debug=1")).unwrap_err();
        assert_eq!(err.message, "Unknown query parameter 'debug'");
    }

    #[test]
    fn test_headers_case_insensitive() {
        let model = model_with(
            json!([
                id_param(),
                {"name": "X-Trace-Id", "in": "header", "required": true, "schema": {"type": "string", "format": "uuid"}},
                {"name": "X-Tags", "in": "header", "schema": {"type": "array", "items": {"type": "string"}}}
            ]),
            &ValidatorOptions::default(),
        );
        let op = op(&model);
        let headers = HashMap::from([
            ("x-trace-id".to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8".to_string()),
            ("x-tags".to_string(), "a, b".to_string()),
        ]);
        assert!(check_headers(&model, op, Some(&headers)).is_ok());

        let err = check_headers(&model, op, Some(&HashMap::new())).unwrap_err();
        assert_eq!(err.kind, ValidationError::InvalidHeaderParam);
        assert_eq!(err.message, "Required header 'X-Trace-Id' is missing");

        let bad = HashMap::from([("X-TRACE-ID".to_string(), "nope".to_string())]);
        let err = check_headers(&model, op, Some(&bad)).unwrap_err();
        assert_eq!(err.message, "Header 'X-Trace-Id' 'nope' is not a valid 'uuid'");
    }

    #[test]
    fn test_header_lookup_prefers_exact_name() {
        let model = model_with(
            json!([
                id_param(),
                {"name": "X-Id", "in": "header", "required": true, "schema": {"type": "integer"}}
            ]),
            &ValidatorOptions::default(),
        );
        let op = op(&model);
        let headers = HashMap::from([
            ("x-id".to_string(), "nope".to_string()),
            ("X-Id".to_string(), "7".to_string()),
        ]);
        assert!(check_headers(&model, op, Some(&headers)).is_ok());

        let headers = HashMap::from([
            ("x-id".to_string(), "7".to_string()),
            ("X-ID".to_string(), "nope".to_string()),
        ]);
        for _ in 0..8 {
            let err = check_headers(&model, op, Some(&headers)).unwrap_err();
            assert_eq!(err.message, "Header 'X-Id' must be an integer, got 'nope'");
        }
    }

    fn wrapped_model() -> SpecModel {
        SpecModel::build(
            &json!({
                "openapi": "3.0.0",
                "components": {"schemas": {
                    "Digits": {"type": "string", "pattern": "^[0-9]+$"},
                    "Code": {"$ref": "#/components/schemas/Digits"},
                    "Word": {"type": "string", "minLength": 1},
                    "Tags": {"type": "array", "items": {"$ref": "#/components/schemas/Word"}},
                    "Pager": {"type": "object", "properties": {"page": {"type": "integer"}}}
                }},
                "paths": {
                    "/codes/{code}": {"get": {"parameters": [
                        {"name": "code", "in": "path", "required": true,
                         "schema": {"$ref": "#/components/schemas/Code"}}
                    ]}},
                    "/wrapped/{id}": {"get": {"parameters": [
                        {"name": "id", "in": "path", "required": true,
                         "schema": {"allOf": [{"$ref": "#/components/schemas/Digits"}]}}
                    ]}},
                    "/search": {"get": {"parameters": [
                        {"name": "tags", "in": "query",
                         "schema": {"allOf": [{"$ref": "#/components/schemas/Tags"}]}},
                        {"name": "limit", "in": "query",
                         "schema": {"oneOf": [
                             {"type": "integer", "maximum": 10},
                             {"type": "integer", "minimum": 100}
                         ]}},
                        {"name": "pager", "in": "query", "style": "deepObject",
                         "schema": {"$ref": "#/components/schemas/Pager"}},
                        {"name": "X-Code", "in": "header",
                         "schema": {"$ref": "#/components/schemas/Digits", "nullable": true}},
                        {"name": "X-Tags", "in": "header",
                         "schema": {"$ref": "#/components/schemas/Tags"}}
                    ]}}
                }
            }),
            &ValidatorOptions::default(),
        )
        .unwrap()
    }

    fn get_op<'m>(model: &'m SpecModel, path: &str) -> &'m OperationModel {
        let m = model.find_route(path).unwrap();
        model.operation_for(m.value, Method::Get).unwrap()
    }

    #[test]
    fn test_path_params_behind_wrappers_keep_their_type() {
        let model = wrapped_model();

        let op = get_op(&model, "/codes/007");
        let bind = |v: &str| IndexMap::from([("code".to_string(), v.to_string())]);
        assert!(check_path_params(&model, op, &bind("007")).is_ok());
        let err = check_path_params(&model, op, &bind("12a")).unwrap_err();
        assert!(err.message.contains("must match pattern"), "{}", err.message);

        let op = get_op(&model, "/wrapped/12345");
        let bind = |v: &str| IndexMap::from([("id".to_string(), v.to_string())]);
        assert!(check_path_params(&model, op, &bind("12345")).is_ok());
    }

    #[test]
    fn test_query_params_behind_wrappers_keep_their_type() {
        let model = wrapped_model();
        let op = get_op(&model, "/search");

        assert!(check_query_params(&model, op, Some("tags=a&tags=b")).is_ok());
        let err = check_query_params(&model, op, Some("tags=a&tags=")).unwrap_err();
        assert!(err.message.contains("at least 1 characters"), "{}", err.message);

        assert!(check_query_params(&model, op, Some("limit=105")).is_ok());
        assert!(check_query_params(&model, op, Some("limit=5")).is_ok());
        let err = check_query_params(&model, op, Some("limit=50")).unwrap_err();
        assert_eq!(err.kind, ValidationError::InvalidQueryParam);
        let err = check_query_params(&model, op, Some("limit=x")).unwrap_err();
        assert_eq!(err.message, "Query parameter 'limit' must be an integer, got 'x'");

        assert!(check_query_params(&model, op, Some("pager[page]=2")).is_ok());
        let err = check_query_params(&model, op, Some("pager[page]=two")).unwrap_err();
        assert!(err.message.contains("must be an integer"), "{}", err.message);
    }

    #[test]
    fn test_headers_behind_wrappers_keep_their_type() {
        let model = wrapped_model();
        let op = get_op(&model, "/search");
        let headers = HashMap::from([
            ("X-Code".to_string(), "0042".to_string()),
            ("X-Tags".to_string(), "a,b".to_string()),
        ]);
        assert!(check_headers(&model, op, Some(&headers)).is_ok());

        let headers = HashMap::from([("X-Code".to_string(), "4x".to_string())]);
        let err = check_headers(&model, op, Some(&headers)).unwrap_err();
        assert!(err.message.contains("must match pattern"), "{}", err.message);
    }
}
