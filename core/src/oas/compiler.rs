#![deny(missing_docs)]

//! # Schema Compiler
//!
//! Turns JSON Schema fragments of a specification document into [`SchemaNode`]s
//! stored in a [`SchemaArena`].
//!
//! - `$ref` targets are compiled once and shared; each target gets its slot reserved
//!   before its body is compiled, which is what lets recursive schemas terminate.
//! - OpenAPI 3.0 and 3.1 spellings are normalised here: `nullable`/`x-nullable`,
//!   `type` arrays containing `"null"`, boolean and numeric `exclusiveMinimum`,
//!   `const`, and boolean schemas.
//! - [`SchemaCompiler::finish`] rejects reference cycles that never pass through an
//!   object property or array item, since those would recurse without consuming input.

use crate::error::{SpecError, SpecResult};
use crate::oas::refs::{encode_pointer_segment, ref_target, resolve_local_ref};
use crate::oas::schema::{
    AdditionalProperties, ArrayRules, Bound, Format, NumericRules, ObjectRules, Pattern,
    SchemaArena, SchemaId, SchemaKind, SchemaNode, StringRules,
};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Keywords that may sit next to `$ref` without changing its meaning.
const ANNOTATION_KEYWORDS: [&str; 7] = [
    "$ref",
    "description",
    "summary",
    "title",
    "example",
    "examples",
    "deprecated",
];

/// Compiles schemas of one document into a shared arena.
pub(crate) struct SchemaCompiler<'doc> {
    root: &'doc Value,
    arena: SchemaArena,
    by_pointer: HashMap<String, SchemaId>,
    origins: Vec<String>,
}

impl<'doc> SchemaCompiler<'doc> {
    /// Creates a compiler resolving references against `root`.
    pub(crate) fn new(root: &'doc Value) -> Self {
        Self {
            root,
            arena: SchemaArena::default(),
            by_pointer: HashMap::new(),
            origins: Vec::new(),
        }
    }

    /// Compiles `schema`, found at `location` (a `#/...` pointer used in error messages).
    pub(crate) fn compile(&mut self, schema: &Value, location: &str) -> SpecResult<SchemaId> {
        if let Some(map) = schema.as_object() {
            if let Some(ref_str) = ref_target(schema) {
                let target = self.compile_ref(ref_str)?;
                if map.keys().all(|k| ANNOTATION_KEYWORDS.contains(&k.as_str())) {
                    return Ok(target);
                }
                // OAS 3.1: siblings of `$ref` apply in addition to the target.
                let mut node = self.build_node(map, location)?;
                node.all_of.insert(0, target);
                return Ok(self.alloc(node, location));
            }
        }
        let node = self.node_for(schema, location)?;
        Ok(self.alloc(node, location))
    }

    /// Looks at an already compiled node. Slots still being compiled read as `any`.
    pub(crate) fn node(&self, id: SchemaId) -> &SchemaNode {
        self.arena.get(id)
    }

    /// The node naming the value's type, see [`SchemaArena::typed`].
    pub(crate) fn typed(&self, id: SchemaId) -> SchemaId {
        self.arena.typed(id)
    }

    /// Validates the arena and hands it over.
    pub(crate) fn finish(self) -> SpecResult<SchemaArena> {
        check_unguarded_cycles(&self.arena, &self.origins)?;
        Ok(self.arena)
    }

    fn alloc(&mut self, node: SchemaNode, location: &str) -> SchemaId {
        self.origins.push(location.to_string());
        self.arena.push(node)
    }

    fn compile_ref(&mut self, ref_str: &str) -> SpecResult<SchemaId> {
        let (pointer, target) = resolve_local_ref(self.root, ref_str)?;
        if let Some(id) = self.by_pointer.get(&pointer) {
            return Ok(*id);
        }

        let location = format!("#{}", pointer);
        let id = self.arena.reserve();
        self.origins.push(location.clone());
        self.by_pointer.insert(pointer, id);

        let node = match ref_target(target) {
            // A reference to a reference: pass through.
            Some(next) => {
                let mut node = SchemaNode::any();
                node.all_of.push(self.compile_ref(next)?);
                node
            }
            None => self.node_for(target, &location)?,
        };
        self.arena.fill(id, node);
        Ok(id)
    }

    fn node_for(&mut self, schema: &Value, location: &str) -> SpecResult<SchemaNode> {
        match schema {
            Value::Bool(true) => Ok(SchemaNode::any()),
            Value::Bool(false) => {
                let mut node = SchemaNode::any();
                node.never = true;
                Ok(node)
            }
            Value::Object(map) => {
                if let Some(ref_str) = ref_target(schema) {
                    let mut node = self.build_node(map, location)?;
                    node.all_of.insert(0, self.compile_ref(ref_str)?);
                    Ok(node)
                } else {
                    self.build_node(map, location)
                }
            }
            other => Err(SpecError::InvalidSchema(format!(
                "schema at '{}' must be an object or boolean, found {}",
                location,
                json_kind(other)
            ))),
        }
    }

    fn build_node(&mut self, map: &Map<String, Value>, location: &str) -> SpecResult<SchemaNode> {
        let mut nullable = is_true(map.get("nullable")) || is_true(map.get("x-nullable"));
        let mut node = SchemaNode::any();

        // 1. Direct type
        match map.get("type") {
            Some(Value::String(tag)) if tag == "null" => {
                nullable = true;
                node.enum_values = Some(vec![Value::Null]);
            }
            Some(Value::String(tag)) => node.kind = self.kind_for(tag, map, location)?,
            Some(Value::Array(tags)) => {
                let mut names = Vec::new();
                for tag in tags {
                    match tag.as_str() {
                        Some("null") => nullable = true,
                        Some(name) => names.push(name),
                        None => {
                            return Err(SpecError::InvalidSchema(format!(
                                "'type' entries at '{}' must be strings",
                                location
                            )))
                        }
                    }
                }
                match names.as_slice() {
                    [] => node.enum_values = Some(vec![Value::Null]),
                    [single] => node.kind = self.kind_for(single, map, location)?,
                    several => {
                        for name in several {
                            let kind = self.kind_for(name, map, location)?;
                            let branch = format!("{}/type/{}", location, name);
                            let id = self.alloc(SchemaNode::of(kind), &branch);
                            node.any_of.push(id);
                        }
                    }
                }
            }
            Some(other) => {
                return Err(SpecError::InvalidSchema(format!(
                    "'type' at '{}' must be a string or array, found {}",
                    location,
                    json_kind(other)
                )))
            }
            None => {
                if ["properties", "required", "additionalProperties"]
                    .iter()
                    .any(|k| map.contains_key(*k))
                {
                    node.kind = self.kind_for("object", map, location)?;
                } else if map.contains_key("items") {
                    node.kind = self.kind_for("array", map, location)?;
                }
            }
        }
        node.nullable = nullable;

        // 2. Literal values
        if let Some(const_val) = map.get("const") {
            node.enum_values = Some(vec![const_val.clone()]);
        } else if let Some(values) = map.get("enum") {
            let values = values.as_array().ok_or_else(|| {
                SpecError::InvalidSchema(format!("'enum' at '{}' must be an array", location))
            })?;
            node.enum_values = Some(values.clone());
        }

        // 3. Format
        if let Some(tag) = map.get("format").and_then(Value::as_str) {
            let format = Format::parse(tag);
            if let Format::Other(name) = &format {
                tracing::debug!(format = %name, location, "format is not enforced");
            }
            node.format = Some(format);
        }

        // 4. Combinators
        node.all_of.extend(self.compile_list(map, "allOf", location)?);
        node.any_of.extend(self.compile_list(map, "anyOf", location)?);
        node.one_of.extend(self.compile_list(map, "oneOf", location)?);
        if let Some(not) = map.get("not") {
            node.not = Some(self.compile(not, &child(location, "not"))?);
        }

        Ok(node)
    }

    fn kind_for(&mut self, tag: &str, map: &Map<String, Value>, location: &str) -> SpecResult<SchemaKind> {
        let kind = match tag {
            "string" => SchemaKind::String(StringRules {
                min_length: count_keyword(map, "minLength", location)?,
                max_length: count_keyword(map, "maxLength", location)?,
                pattern: compile_pattern(map, location)?,
            }),
            "integer" => SchemaKind::Integer(numeric_rules(map, location)?),
            "number" => SchemaKind::Number(numeric_rules(map, location)?),
            "boolean" => SchemaKind::Boolean,
            "array" => {
                let items = match map.get("items") {
                    Some(Value::Array(_)) => {
                        return Err(SpecError::InvalidSchema(format!(
                            "tuple-form 'items' at '{}' is not supported",
                            location
                        )))
                    }
                    Some(items) => Some(self.compile(items, &child(location, "items"))?),
                    None => None,
                };
                SchemaKind::Array(ArrayRules {
                    items,
                    min_items: count_keyword(map, "minItems", location)?,
                    max_items: count_keyword(map, "maxItems", location)?,
                    unique_items: is_true(map.get("uniqueItems")),
                })
            }
            "object" => SchemaKind::Object(self.object_rules(map, location)?),
            other => {
                return Err(SpecError::InvalidSchema(format!(
                    "unknown type '{}' at '{}'",
                    other, location
                )))
            }
        };
        Ok(kind)
    }

    fn object_rules(&mut self, map: &Map<String, Value>, location: &str) -> SpecResult<ObjectRules> {
        let mut properties = IndexMap::new();
        if let Some(props) = map.get("properties") {
            let props = props.as_object().ok_or_else(|| {
                SpecError::InvalidSchema(format!("'properties' at '{}' must be an object", location))
            })?;
            let props_location = child(location, "properties");
            for (name, prop) in props {
                let id = self.compile(prop, &child(&props_location, name))?;
                properties.insert(name.clone(), id);
            }
        }

        let required = match map.get("required") {
            None => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| {
                    n.as_str().map(str::to_string).ok_or_else(|| {
                        SpecError::InvalidSchema(format!(
                            "'required' entries at '{}' must be strings",
                            location
                        ))
                    })
                })
                .collect::<SpecResult<Vec<_>>>()?,
            // OAS 2.0 / draft-3 style boolean `required` on a property is not an object rule.
            Some(Value::Bool(_)) => Vec::new(),
            Some(_) => {
                return Err(SpecError::InvalidSchema(format!(
                    "'required' at '{}' must be an array of names",
                    location
                )))
            }
        };

        let additional = match map.get("additionalProperties") {
            None | Some(Value::Bool(true)) => AdditionalProperties::Allow,
            Some(Value::Bool(false)) => AdditionalProperties::Deny,
            Some(schema) => AdditionalProperties::Schema(
                self.compile(schema, &child(location, "additionalProperties"))?,
            ),
        };

        Ok(ObjectRules {
            properties,
            required,
            additional,
            min_properties: count_keyword(map, "minProperties", location)?,
            max_properties: count_keyword(map, "maxProperties", location)?,
        })
    }

    fn compile_list(
        &mut self,
        map: &Map<String, Value>,
        keyword: &str,
        location: &str,
    ) -> SpecResult<Vec<SchemaId>> {
        let Some(value) = map.get(keyword) else {
            return Ok(Vec::new());
        };
        let list = value
            .as_array()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| {
                SpecError::InvalidSchema(format!(
                    "'{}' at '{}' must be a non-empty array",
                    keyword, location
                ))
            })?;
        let list_location = child(location, keyword);
        list.iter()
            .enumerate()
            .map(|(idx, sub)| self.compile(sub, &child(&list_location, &idx.to_string())))
            .collect()
    }
}

fn numeric_rules(map: &Map<String, Value>, location: &str) -> SpecResult<NumericRules> {
    let minimum = bound(map, "minimum", "exclusiveMinimum", location, f64::max)?;
    let maximum = bound(map, "maximum", "exclusiveMaximum", location, f64::min)?;
    let multiple_of = match map.get("multipleOf") {
        None => None,
        Some(v) => match v.as_f64() {
            Some(n) if n > 0.0 => Some(n),
            _ => {
                return Err(SpecError::InvalidSchema(format!(
                    "'multipleOf' at '{}' must be a positive number",
                    location
                )))
            }
        },
    };
    Ok(NumericRules {
        minimum,
        maximum,
        multiple_of,
    })
}

/// Reads an inclusive keyword plus its exclusive companion, which is a boolean flag in
/// OAS 3.0 and a standalone limit in OAS 3.1. `stricter` picks the tighter of two limits.
fn bound(
    map: &Map<String, Value>,
    inclusive_key: &str,
    exclusive_key: &str,
    location: &str,
    stricter: fn(f64, f64) -> f64,
) -> SpecResult<Option<Bound>> {
    let inclusive = match map.get(inclusive_key) {
        None => None,
        Some(v) => Some(v.as_f64().ok_or_else(|| {
            SpecError::InvalidSchema(format!("'{}' at '{}' must be a number", inclusive_key, location))
        })?),
    };

    match (inclusive, map.get(exclusive_key)) {
        (None, None) | (None, Some(Value::Bool(_))) => Ok(None),
        (Some(value), None) => Ok(Some(Bound { value, exclusive: false })),
        (Some(value), Some(Value::Bool(exclusive))) => Ok(Some(Bound {
            value,
            exclusive: *exclusive,
        })),
        (inclusive, Some(Value::Number(n))) => {
            let limit = n.as_f64().unwrap_or_default();
            match inclusive {
                Some(value) if stricter(value, limit) != limit => Ok(Some(Bound {
                    value,
                    exclusive: false,
                })),
                _ => Ok(Some(Bound {
                    value: limit,
                    exclusive: true,
                })),
            }
        }
        (_, Some(_)) => Err(SpecError::InvalidSchema(format!(
            "'{}' at '{}' must be a boolean or number",
            exclusive_key, location
        ))),
    }
}

fn count_keyword(map: &Map<String, Value>, key: &str, location: &str) -> SpecResult<Option<u64>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| {
                SpecError::InvalidSchema(format!(
                    "'{}' at '{}' must be a non-negative integer",
                    key, location
                ))
            }),
    }
}

fn compile_pattern(map: &Map<String, Value>, location: &str) -> SpecResult<Option<Pattern>> {
    let Some(source) = map.get("pattern") else {
        return Ok(None);
    };
    let source = source.as_str().ok_or_else(|| {
        SpecError::InvalidSchema(format!("'pattern' at '{}' must be a string", location))
    })?;
    let regex = Regex::new(source).map_err(|e| {
        SpecError::InvalidSchema(format!(
            "invalid pattern '{}' at '{}': {}",
            source, location, e
        ))
    })?;
    Ok(Some(Pattern {
        source: source.to_string(),
        regex,
    }))
}

fn is_true(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

fn child(location: &str, segment: &str) -> String {
    format!("{}/{}", location, encode_pointer_segment(segment))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Rejects cycles made only of combinator edges (`allOf`/`anyOf`/`oneOf`/`not`).
///
/// Property, item and additionalProperties edges consume one level of the instance,
/// so cycles through them are bounded by the input depth and remain legal.
fn check_unguarded_cycles(arena: &SchemaArena, origins: &[String]) -> SpecResult<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let nodes = arena.nodes();
    let mut marks = vec![Mark::Unvisited; nodes.len()];

    for start in 0..nodes.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        // Iterative DFS: (node, next edge index).
        let mut stack = vec![(start, 0usize)];
        marks[start] = Mark::InProgress;
        while let Some((current, edge)) = stack.last().copied() {
            let node = &nodes[current];
            let next = node
                .all_of
                .iter()
                .chain(&node.any_of)
                .chain(&node.one_of)
                .chain(node.not.iter())
                .nth(edge);
            match next {
                Some(target) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    match marks[target.0] {
                        Mark::InProgress => {
                            let origin = origins
                                .get(target.0)
                                .map(String::as_str)
                                .unwrap_or("<unknown>");
                            return Err(SpecError::InvalidSchema(format!(
                                "schema at '{}' refers back to itself through allOf/anyOf/oneOf/not without an intervening property or item",
                                origin
                            )));
                        }
                        Mark::Unvisited => {
                            marks[target.0] = Mark::InProgress;
                            stack.push((target.0, 0));
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks[current] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oas::schema::TypeTag;
    use serde_json::json;

    fn compile_one(doc: &Value, schema: &Value) -> SpecResult<(SchemaArena, SchemaId)> {
        let mut compiler = SchemaCompiler::new(doc);
        let id = compiler.compile(schema, "#/test")?;
        Ok((compiler.finish()?, id))
    }

    #[test]
    fn test_compile_object_with_required() {
        let doc = json!({});
        let schema = json!({
            "type": "object",
            "required": ["total"],
            "properties": {
                "total": {"type": "number", "minimum": 0},
                "items": {"type": "array", "items": {"type": "string"}}
            },
            "additionalProperties": false
        });
        let (arena, id) = compile_one(&doc, &schema).unwrap();
        let SchemaKind::Object(rules) = &arena.get(id).kind else {
            panic!("expected object");
        };
        assert_eq!(rules.required, vec!["total".to_string()]);
        assert_eq!(rules.additional, AdditionalProperties::Deny);
        let total = arena.get(rules.properties["total"]);
        assert_eq!(total.type_tag(), TypeTag::Number);
    }

    #[test]
    fn test_nullable_and_type_array() {
        let doc = json!({});
        let (arena, id) = compile_one(&doc, &json!({"type": "string", "nullable": true})).unwrap();
        assert!(arena.get(id).nullable);

        let (arena, id) = compile_one(&doc, &json!({"type": ["integer", "null"]})).unwrap();
        let node = arena.get(id);
        assert!(node.nullable);
        assert_eq!(node.type_tag(), TypeTag::Integer);
    }

    #[test]
    fn test_multiple_types_become_any_of() {
        let doc = json!({});
        let (arena, id) = compile_one(&doc, &json!({"type": ["integer", "string"]})).unwrap();
        let node = arena.get(id);
        assert_eq!(node.type_tag(), TypeTag::Any);
        assert_eq!(node.any_of.len(), 2);
    }

    #[test]
    fn test_exclusive_bounds_both_dialects() {
        let doc = json!({});
        let (arena, id) =
            compile_one(&doc, &json!({"type": "number", "minimum": 1, "exclusiveMinimum": true}))
                .unwrap();
        let SchemaKind::Number(rules) = &arena.get(id).kind else {
            panic!("expected number");
        };
        assert_eq!(rules.minimum, Some(Bound { value: 1.0, exclusive: true }));

        let (arena, id) = compile_one(&doc, &json!({"type": "number", "exclusiveMaximum": 10})).unwrap();
        let SchemaKind::Number(rules) = &arena.get(id).kind else {
            panic!("expected number");
        };
        assert_eq!(rules.maximum, Some(Bound { value: 10.0, exclusive: true }));
    }

    #[test]
    fn test_shared_ref_compiled_once() {
        let doc = json!({"components": {"schemas": {"Id": {"type": "integer"}}}});
        let mut compiler = SchemaCompiler::new(&doc);
        let a = compiler.compile(&json!({"$ref": "#/components/schemas/Id"}), "#/a").unwrap();
        let b = compiler.compile(&json!({"$ref": "#/components/schemas/Id"}), "#/b").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_recursive_schema_through_properties_is_allowed() {
        let doc = json!({"components": {"schemas": {"Node": {
            "type": "object",
            "properties": {"children": {"type": "array", "items": {"$ref": "#/components/schemas/Node"}}}
        }}}});
        let result = compile_one(&doc, &json!({"$ref": "#/components/schemas/Node"}));
        assert!(result.is_ok());
    }

    #[test]
    fn test_combinator_only_cycle_rejected() {
        let doc = json!({"components": {"schemas": {
            "A": {"allOf": [{"$ref": "#/components/schemas/B"}]},
            "B": {"anyOf": [{"$ref": "#/components/schemas/A"}]}
        }}});
        let err = compile_one(&doc, &json!({"$ref": "#/components/schemas/A"})).unwrap_err();
        assert!(format!("{err}").contains("refers back to itself"));
    }

    #[test]
    fn test_unresolved_ref() {
        let doc = json!({"components": {"schemas": {}}});
        let err = compile_one(&doc, &json!({"$ref": "#/components/schemas/Missing"})).unwrap_err();
        assert!(matches!(err, SpecError::UnresolvedRef(_)));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let doc = json!({});
        let err = compile_one(&doc, &json!({"type": "string", "pattern": "(["})).unwrap_err();
        assert!(matches!(err, SpecError::InvalidSchema(_)));
    }

    #[test]
    fn test_const_and_boolean_schemas() {
        let doc = json!({});
        let (arena, id) = compile_one(&doc, &json!({"const": "fixed"})).unwrap();
        assert_eq!(arena.get(id).enum_values, Some(vec![json!("fixed")]));

        let (arena, id) = compile_one(&doc, &json!(false)).unwrap();
        assert!(arena.get(id).never);
    }

    #[test]
    fn test_ref_with_siblings_wraps_target() {
        let doc = json!({"components": {"schemas": {"Name": {"type": "string"}}}});
        let (arena, id) = compile_one(
            &doc,
            &json!({"$ref": "#/components/schemas/Name", "maxLength": 3, "type": "string"}),
        )
        .unwrap();
        let node = arena.get(id);
        assert_eq!(node.all_of.len(), 1);
        assert_eq!(node.type_tag(), TypeTag::String);
    }

    #[test]
    fn test_typed_follows_ref_chains_and_all_of() {
        let doc = json!({"components": {"schemas": {
            "Digits": {"type": "string", "pattern": "^[0-9]+$"},
            "Code": {"$ref": "#/components/schemas/Digits"},
            "Tags": {"type": "array", "items": {"type": "string"}}
        }}});
        let mut compiler = SchemaCompiler::new(&doc);
        let chain = compiler.compile(&json!({"$ref": "#/components/schemas/Code"}), "#/a").unwrap();
        let wrapped = compiler
            .compile(&json!({"allOf": [{"$ref": "#/components/schemas/Tags"}]}), "#/b")
            .unwrap();
        let nullable = compiler
            .compile(&json!({"$ref": "#/components/schemas/Digits", "nullable": true}), "#/c")
            .unwrap();
        let arena = compiler.finish().unwrap();

        assert_eq!(arena.type_tag_of(chain), TypeTag::String);
        assert_eq!(arena.type_tag_of(wrapped), TypeTag::Array);
        assert_eq!(arena.type_tag_of(nullable), TypeTag::String);
        assert_eq!(arena.get(wrapped).type_tag(), TypeTag::Any);
    }

    #[test]
    fn test_typed_alternatives_need_a_common_type() {
        let doc = json!({});
        let (arena, id) = compile_one(
            &doc,
            &json!({"oneOf": [{"type": "integer", "maximum": 10}, {"type": "integer", "minimum": 100}]}),
        )
        .unwrap();
        assert_eq!(arena.type_tag_of(id), TypeTag::Integer);

        let (arena, id) = compile_one(&doc, &json!({"anyOf": [{"type": "integer"}, {"type": "string"}]})).unwrap();
        assert_eq!(arena.typed(id), id);
        assert_eq!(arena.type_tag_of(id), TypeTag::Any);
    }
}
