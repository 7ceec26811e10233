#![deny(missing_docs)]

//! # Schema Evaluation
//!
//! Recursive evaluation of a JSON value against a compiled schema.
//!
//! The evaluator collects every violation instead of stopping at the first one, which is
//! what lets `anyOf`/`oneOf` point at the alternative that came closest. Callers report
//! the first collected violation. Recursion depth is bounded by the depth of the input,
//! since the compiler rejects schema cycles that do not descend into the value.

use crate::oas::compiler::json_kind;
use crate::oas::refs::encode_pointer_segment;
use crate::oas::schema::{
    AdditionalProperties, ArrayRules, NumericRules, ObjectRules, SchemaArena, SchemaId, SchemaKind,
    SchemaNode, StringRules,
};
use crate::validate::formats::check_format;
use serde_json::{Map, Value};

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value (`""` for the root).
    pub path: String,
    /// The violated rule.
    pub message: String,
}

impl SchemaViolation {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// `message`, prefixed with the pointer when it is not the root.
    pub fn describe(&self) -> String {
        if self.path.is_empty() {
            self.message.clone()
        } else {
            format!("at '{}': {}", self.path, self.message)
        }
    }
}

/// Evaluates values against schemas of one arena.
#[derive(Debug, Clone, Copy)]
pub struct SchemaValidator<'a> {
    arena: &'a SchemaArena,
    check_formats: bool,
}

impl<'a> SchemaValidator<'a> {
    /// Creates an evaluator; `check_formats` enables `format` enforcement.
    pub fn new(arena: &'a SchemaArena, check_formats: bool) -> Self {
        Self {
            arena,
            check_formats,
        }
    }

    /// Validates `value`; on failure returns every violation, most relevant first.
    pub fn validate(&self, value: &Value, schema: SchemaId) -> Result<(), Vec<SchemaViolation>> {
        let mut out = Vec::new();
        self.evaluate(value, schema, "", &mut out);
        if out.is_empty() {
            Ok(())
        } else {
            Err(out)
        }
    }

    /// Validates `value` against `schema` and returns the violations (empty on success).
    fn collect(&self, value: &Value, schema: SchemaId, path: &str) -> Vec<SchemaViolation> {
        let mut out = Vec::new();
        self.evaluate(value, schema, path, &mut out);
        out
    }

    fn evaluate(&self, value: &Value, schema: SchemaId, path: &str, out: &mut Vec<SchemaViolation>) {
        let node = self.arena.get(schema);

        if node.never {
            out.push(SchemaViolation::new(path, "no value is allowed here"));
            return;
        }

        // 1. Null short-circuit
        if value.is_null() {
            if node.nullable {
                return;
            }
            if !matches!(node.kind, SchemaKind::Any) {
                out.push(SchemaViolation::new(
                    path,
                    format!("expected {}, found null", node.type_tag()),
                ));
                return;
            }
        }

        // 2. Combinators
        self.evaluate_combinators(node, value, path, out);

        // 3. Direct type and its constraints
        if !self.evaluate_kind(&node.kind, value, path, out) {
            return;
        }

        // 4. Literal values and format
        if let Some(allowed) = &node.enum_values {
            if !allowed.iter().any(|candidate| json_eq(candidate, value)) {
                out.push(SchemaViolation::new(
                    path,
                    format!("must be one of {}", Value::Array(allowed.clone())),
                ));
            }
        }
        if self.check_formats {
            if let Some(format) = &node.format {
                if let Err(message) = check_format(value, format) {
                    out.push(SchemaViolation::new(path, message));
                }
            }
        }
    }

    fn evaluate_combinators(&self, node: &SchemaNode, value: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
        for sub in &node.all_of {
            self.evaluate(value, *sub, path, out);
        }

        if !node.any_of.is_empty() {
            let results: Vec<_> = node.any_of.iter().map(|sub| self.collect(value, *sub, path)).collect();
            if !results.iter().any(Vec::is_empty) {
                push_closest(out, results, "anyOf", "must match at least one alternative", path);
            }
        }

        if !node.one_of.is_empty() {
            let results: Vec<_> = node.one_of.iter().map(|sub| self.collect(value, *sub, path)).collect();
            let matched: Vec<usize> = results
                .iter()
                .enumerate()
                .filter(|(_, r)| r.is_empty())
                .map(|(idx, _)| idx)
                .collect();
            match matched.as_slice() {
                [_] => {}
                [] => push_closest(out, results, "oneOf", "must match exactly one alternative but matched none", path),
                many => out.push(SchemaViolation::new(
                    path,
                    format!(
                        "must match exactly one oneOf alternative but matched {} (alternatives {})",
                        many.len(),
                        many.iter()
                            .map(|idx| format!("#{}", idx + 1))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )),
            }
        }

        if let Some(not) = node.not {
            if self.collect(value, not, path).is_empty() {
                out.push(SchemaViolation::new(path, "must not match the 'not' schema"));
            }
        }
    }

    /// Checks the direct type. Returns false on a type mismatch, in which case the
    /// remaining constraints of the node are skipped.
    fn evaluate_kind(&self, kind: &SchemaKind, value: &Value, path: &str, out: &mut Vec<SchemaViolation>) -> bool {
        let type_ok = match kind {
            SchemaKind::Any => true,
            SchemaKind::String(_) => value.is_string(),
            SchemaKind::Integer(_) => is_integer(value),
            SchemaKind::Number(_) => value.is_number(),
            SchemaKind::Boolean => value.is_boolean(),
            SchemaKind::Array(_) => value.is_array(),
            SchemaKind::Object(_) => value.is_object(),
        };
        if !type_ok {
            out.push(SchemaViolation::new(
                path,
                format!("expected {}, found {}", kind.tag(), json_kind(value)),
            ));
            return false;
        }

        match (kind, value) {
            (SchemaKind::String(rules), Value::String(s)) => check_string(rules, s, path, out),
            (SchemaKind::Integer(rules) | SchemaKind::Number(rules), Value::Number(n)) => {
                check_numeric(rules, n.as_f64().unwrap_or_default(), path, out)
            }
            (SchemaKind::Array(rules), Value::Array(items)) => self.check_array(rules, items, path, out),
            (SchemaKind::Object(rules), Value::Object(map)) => self.check_object(rules, map, path, out),
            _ => {}
        }
        true
    }

    fn check_array(&self, rules: &ArrayRules, items: &[Value], path: &str, out: &mut Vec<SchemaViolation>) {
        let len = items.len() as u64;
        if let Some(min) = rules.min_items {
            if len < min {
                out.push(SchemaViolation::new(path, format!("must have at least {} items, found {}", min, len)));
            }
        }
        if let Some(max) = rules.max_items {
            if len > max {
                out.push(SchemaViolation::new(path, format!("must have at most {} items, found {}", max, len)));
            }
        }
        if rules.unique_items {
            'outer: for (i, a) in items.iter().enumerate() {
                for (j, b) in items.iter().enumerate().skip(i + 1) {
                    if json_eq(a, b) {
                        out.push(SchemaViolation::new(
                            path,
                            format!("items must be unique, but #{} and #{} are equal", i, j),
                        ));
                        break 'outer;
                    }
                }
            }
        }
        if let Some(item_schema) = rules.items {
            for (idx, item) in items.iter().enumerate() {
                self.evaluate(item, item_schema, &format!("{}/{}", path, idx), out);
            }
        }
    }

    fn check_object(&self, rules: &ObjectRules, map: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
        for name in &rules.required {
            if !map.contains_key(name) {
                out.push(SchemaViolation::new(path, format!("missing required property '{}'", name)));
            }
        }

        for (name, value) in map {
            let child = format!("{}/{}", path, encode_pointer_segment(name));
            match (rules.properties.get(name), rules.additional) {
                (Some(schema), _) => self.evaluate(value, *schema, &child, out),
                (None, AdditionalProperties::Allow) => {}
                (None, AdditionalProperties::Deny) => {
                    out.push(SchemaViolation::new(&child, format!("property '{}' is not allowed", name)))
                }
                (None, AdditionalProperties::Schema(schema)) => self.evaluate(value, schema, &child, out),
            }
        }

        let count = map.len() as u64;
        if let Some(min) = rules.min_properties {
            if count < min {
                out.push(SchemaViolation::new(path, format!("must have at least {} properties, found {}", min, count)));
            }
        }
        if let Some(max) = rules.max_properties {
            if count > max {
                out.push(SchemaViolation::new(path, format!("must have at most {} properties, found {}", max, count)));
            }
        }
    }
}

/// Reports the alternative with the fewest violations (earliest on a tie), keeping all of
/// its violations so enclosing combinators can compare candidates.
fn push_closest(
    out: &mut Vec<SchemaViolation>,
    results: Vec<Vec<SchemaViolation>>,
    keyword: &str,
    summary: &str,
    path: &str,
) {
    let total = results.len();
    let Some((best_idx, best)) = results
        .into_iter()
        .enumerate()
        .min_by_key(|(idx, violations)| (violations.len(), *idx))
    else {
        return;
    };

    let mut best = best.into_iter();
    if let Some(first) = best.next() {
        out.push(SchemaViolation::new(
            path,
            format!(
                "{} {}; closest is alternative #{} of {}: {}",
                keyword,
                summary,
                best_idx + 1,
                total,
                first.describe()
            ),
        ));
    }
    out.extend(best);
}

fn check_string(rules: &StringRules, s: &str, path: &str, out: &mut Vec<SchemaViolation>) {
    let len = s.chars().count() as u64;
    if let Some(min) = rules.min_length {
        if len < min {
            out.push(SchemaViolation::new(path, format!("must be at least {} characters long", min)));
        }
    }
    if let Some(max) = rules.max_length {
        if len > max {
            out.push(SchemaViolation::new(path, format!("must be at most {} characters long", max)));
        }
    }
    if let Some(pattern) = &rules.pattern {
        if !pattern.regex.is_match(s) {
            out.push(SchemaViolation::new(path, format!("must match pattern '{}'", pattern.source)));
        }
    }
}

fn check_numeric(rules: &NumericRules, n: f64, path: &str, out: &mut Vec<SchemaViolation>) {
    if let Some(min) = rules.minimum {
        let below = if min.exclusive { n <= min.value } else { n < min.value };
        if below {
            let relation = if min.exclusive { "greater than" } else { "at least" };
            out.push(SchemaViolation::new(path, format!("must be {} {}", relation, min.value)));
        }
    }
    if let Some(max) = rules.maximum {
        let above = if max.exclusive { n >= max.value } else { n > max.value };
        if above {
            let relation = if max.exclusive { "less than" } else { "at most" };
            out.push(SchemaViolation::new(path, format!("must be {} {}", relation, max.value)));
        }
    }
    if let Some(step) = rules.multiple_of {
        let quotient = n / step;
        if (quotient - quotient.round()).abs() > 1e-9 {
            out.push(SchemaViolation::new(path, format!("must be a multiple of {}", step)));
        }
    }
}

/// Integers, including floats with a zero fractional part (`2.0`).
fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => false,
    }
}

/// JSON equality where `1` and `1.0` are the same number.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len() && xm.iter().all(|(k, x)| ym.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}
