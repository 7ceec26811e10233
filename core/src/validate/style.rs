#![deny(missing_docs)]

//! # Parameter Style Decoding
//!
//! Turns serialized parameter values back into strings, lists or maps according to the
//! parameter's `style` and `explode` settings. Typing of the pieces happens afterwards
//! against the schema (see [`crate::validate::coerce`]).
//!
//! Percent-decoding order matters for delimiters:
//! - comma-separated forms (`simple`, `label`, `matrix`, non-exploded `form`) split the
//!   raw text first, so an encoded `%2C` stays inside an item;
//! - `spaceDelimited` and `pipeDelimited` decode first, since their delimiters are
//!   usually sent encoded (`%20`, `%7C`).

use crate::oas::params::ParamStyle;
use indexmap::IndexMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

/// Characters escaped inside an encoded item: everything except RFC 3986 unreserved.
const ITEM_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Structure the schema expects, which decides how a serialized value is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A single primitive (or an untyped schema).
    Scalar,
    /// A list of primitives.
    Array,
    /// A map of property name to primitive.
    Object,
}

/// A decoded parameter value, not yet typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// One string.
    Scalar(String),
    /// Ordered items.
    Array(Vec<String>),
    /// Property name to value, in request order.
    Object(IndexMap<String, String>),
}

/// Key/value pairs of a query string, keys decoded, values still raw.
#[derive(Debug, Clone, Default)]
pub struct QueryPairs<'q> {
    pairs: Vec<(String, &'q str)>,
}

impl<'q> QueryPairs<'q> {
    /// Splits `query` (without the leading `?`) on `&`, then at the first `=`.
    pub fn parse(query: &'q str) -> Self {
        let pairs = query
            .split('&')
            .filter(|piece| !piece.is_empty())
            .map(|piece| match piece.split_once('=') {
                Some((key, value)) => (decode_query_component(key), value),
                None => (decode_query_component(piece), ""),
            })
            .collect();
        Self { pairs }
    }

    /// Raw values sent under `key`, in order.
    pub fn values(&self, key: &str) -> Vec<&'q str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .collect()
    }

    /// True when `key` appears at least once.
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Decoded keys, in order (repeats included).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    /// Pairs whose key has the shape `name[prop]`, as `(prop, raw value)`.
    fn bracketed<'s>(&'s self, name: &'s str) -> impl Iterator<Item = (&'s str, &'q str)> + 's {
        self.pairs.iter().filter_map(move |(k, v)| {
            let prop = k.strip_prefix(name)?.strip_prefix('[')?.strip_suffix(']')?;
            Some((prop, *v))
        })
    }
}

/// Percent-decodes a path segment or header item.
pub fn decode_component(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Percent-decodes a query component, treating `+` as a space.
pub fn decode_query_component(raw: &str) -> String {
    if raw.contains('+') {
        decode_component(&raw.replace('+', " "))
    } else {
        decode_component(raw)
    }
}

/// Decodes a path placeholder value (`simple`, `label` or `matrix`).
pub fn decode_path(
    raw: &str,
    name: &str,
    style: ParamStyle,
    explode: bool,
    shape: Shape,
) -> Result<RawValue, String> {
    match style {
        ParamStyle::Label => {
            let body = raw
                .strip_prefix('.')
                .ok_or_else(|| "must start with '.' (label style)".to_string())?;
            let separator = if explode { '.' } else { ',' };
            split_styled(body, shape, separator, explode, decode_component)
        }
        ParamStyle::Matrix => decode_matrix(raw, name, explode, shape),
        _ => split_styled(raw, shape, ',', explode, decode_component),
    }
}

/// Decodes a header value (`simple` style). Header text is not percent-decoded.
pub fn decode_header(raw: &str, explode: bool, shape: Shape) -> Result<RawValue, String> {
    split_styled(raw.trim(), shape, ',', explode, |s| s.trim().to_string())
}

/// Decodes a query parameter. `Ok(None)` when the request does not carry it.
///
/// `properties` lists the declared property names of an object schema; exploded `form`
/// objects send each property as its own key.
pub fn decode_query(
    pairs: &QueryPairs<'_>,
    name: &str,
    style: ParamStyle,
    explode: bool,
    shape: Shape,
    properties: &[&str],
) -> Result<Option<RawValue>, String> {
    match (style, shape) {
        (ParamStyle::DeepObject, _) => decode_deep_object(pairs, name),
        (ParamStyle::Form, Shape::Object) if explode => {
            let mut map = IndexMap::new();
            for prop in properties {
                if let Some(first) = pairs.values(prop).first() {
                    map.insert((*prop).to_string(), decode_query_component(first));
                }
            }
            Ok((!map.is_empty()).then_some(RawValue::Object(map)))
        }
        (ParamStyle::SpaceDelimited | ParamStyle::PipeDelimited, _) if !explode => {
            let Some(raw) = single_value(pairs, name)? else {
                return Ok(None);
            };
            let separator = if style == ParamStyle::SpaceDelimited { ' ' } else { '|' };
            let decoded = decode_query_component(raw);
            Ok(Some(RawValue::Array(
                decoded.split(separator).map(str::to_string).collect(),
            )))
        }
        // Exploded arrays: one key per item.
        (ParamStyle::SpaceDelimited | ParamStyle::PipeDelimited, _) | (_, Shape::Array)
            if explode =>
        {
            let values = pairs.values(name);
            if values.is_empty() {
                return Ok(None);
            }
            if style == ParamStyle::Form && values.iter().any(|v| v.contains(',')) {
                return Err(format!(
                    "uses exploded form encoding; repeat '{}' for each item instead of separating items with ','",
                    name
                ));
            }
            Ok(Some(RawValue::Array(
                values.into_iter().map(decode_query_component).collect(),
            )))
        }
        _ => {
            let Some(raw) = single_value(pairs, name)? else {
                return Ok(None);
            };
            split_styled(raw, shape, ',', false, decode_query_component).map(Some)
        }
    }
}

/// Parses a `content`-encoded value as JSON.
pub fn decode_json(text: &str) -> Result<Value, String> {
    serde_json::from_str(text).map_err(|e| format!("is not valid JSON: {}", e))
}

/// Serializes `items` as an array parameter named `name`.
///
/// Path styles produce the placeholder text, query styles a query-string fragment.
pub fn encode_array<S: AsRef<str>>(name: &str, items: &[S], style: ParamStyle, explode: bool) -> String {
    let encoded: Vec<String> = items
        .iter()
        .map(|item| utf8_percent_encode(item.as_ref(), ITEM_ENCODE_SET).to_string())
        .collect();
    let key = utf8_percent_encode(name, ITEM_ENCODE_SET).to_string();

    match (style, explode) {
        (ParamStyle::Simple, _) => encoded.join(","),
        (ParamStyle::Label, false) => format!(".{}", encoded.join(",")),
        (ParamStyle::Label, true) => format!(".{}", encoded.join(".")),
        (ParamStyle::Matrix, false) => format!(";{}={}", key, encoded.join(",")),
        (ParamStyle::Matrix, true) => encoded
            .iter()
            .map(|item| format!(";{}={}", key, item))
            .collect(),
        (ParamStyle::Form, false) => format!("{}={}", key, encoded.join(",")),
        (ParamStyle::SpaceDelimited, false) => format!("{}={}", key, encoded.join("%20")),
        (ParamStyle::PipeDelimited, false) => format!("{}={}", key, encoded.join("|")),
        (ParamStyle::DeepObject, _) => encoded
            .iter()
            .enumerate()
            .map(|(idx, item)| format!("{}%5B{}%5D={}", key, idx, item))
            .collect::<Vec<_>>()
            .join("&"),
        (ParamStyle::Form | ParamStyle::SpaceDelimited | ParamStyle::PipeDelimited, true) => encoded
            .iter()
            .map(|item| format!("{}={}", key, item))
            .collect::<Vec<_>>()
            .join("&"),
    }
}

/// Splits a delimited body into the requested shape. Objects use alternating
/// `key,value` items, or `key=value` items when exploded.
fn split_styled(
    body: &str,
    shape: Shape,
    separator: char,
    explode: bool,
    decode: impl Fn(&str) -> String,
) -> Result<RawValue, String> {
    match shape {
        Shape::Scalar => Ok(RawValue::Scalar(decode(body))),
        Shape::Array => Ok(RawValue::Array(body.split(separator).map(&decode).collect())),
        Shape::Object if explode => {
            let mut map = IndexMap::new();
            for item in body.split(separator).filter(|s| !s.is_empty()) {
                let (key, value) = item
                    .split_once('=')
                    .ok_or_else(|| format!("object entry '{}' must have the form key=value", item))?;
                map.insert(decode(key), decode(value));
            }
            Ok(RawValue::Object(map))
        }
        Shape::Object => {
            let items: Vec<&str> = body.split(separator).collect();
            if items.len() % 2 != 0 {
                return Err("must list object entries as key,value pairs".to_string());
            }
            Ok(RawValue::Object(
                items
                    .chunks(2)
                    .map(|pair| (decode(pair[0]), decode(pair[1])))
                    .collect(),
            ))
        }
    }
}

fn decode_matrix(raw: &str, name: &str, explode: bool, shape: Shape) -> Result<RawValue, String> {
    let body = raw
        .strip_prefix(';')
        .ok_or_else(|| "must start with ';' (matrix style)".to_string())?;

    match (shape, explode) {
        (Shape::Object, true) => split_styled(body, shape, ';', true, decode_component),
        (Shape::Array, true) => {
            let mut items = Vec::new();
            for entry in body.split(';') {
                let value = matrix_value(entry, name)?;
                items.push(decode_component(value));
            }
            Ok(RawValue::Array(items))
        }
        _ => {
            let value = matrix_value(body, name)?;
            split_styled(value, shape, ',', false, decode_component)
        }
    }
}

/// Strips `name=` from a matrix entry; a bare `name` stands for an empty value.
fn matrix_value<'a>(entry: &'a str, name: &str) -> Result<&'a str, String> {
    match entry.strip_prefix(name) {
        Some("") => Ok(""),
        Some(rest) => rest
            .strip_prefix('=')
            .ok_or_else(|| format!("must have the form ;{}=value (matrix style)", name)),
        None => Err(format!("must have the form ;{}=value (matrix style)", name)),
    }
}

fn decode_deep_object(pairs: &QueryPairs<'_>, name: &str) -> Result<Option<RawValue>, String> {
    let mut map = IndexMap::new();
    for (prop, raw) in pairs.bracketed(name) {
        if prop.is_empty() || prop.contains(['[', ']']) {
            return Err(format!(
                "key '{}[{}]' is not a supported deepObject key; use {}[property]=value",
                name, prop, name
            ));
        }
        if map.insert(prop.to_string(), decode_query_component(raw)).is_some() {
            return Err(format!("property '{}' is given more than once", prop));
        }
    }
    Ok((!map.is_empty()).then_some(RawValue::Object(map)))
}

fn single_value<'q>(pairs: &QueryPairs<'q>, name: &str) -> Result<Option<&'q str>, String> {
    let values = pairs.values(name);
    match values.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        many => Err(format!(
            "must be sent once, but was given {} times",
            many.len()
        )),
    }
}
