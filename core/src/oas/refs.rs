#![deny(missing_docs)]

//! # Reference Utilities
//!
//! Helpers for resolving `$ref` targets inside a single specification document and
//! for building the JSON Pointers used as `specRef` in validation reports.
//!
//! Only same-document references (`#/...`) are supported; no external document is
//! ever fetched.

use crate::error::{SpecError, SpecResult};
use percent_encoding::percent_decode_str;
use serde_json::Value;

/// Resolves a same-document `$ref` against `root`.
///
/// Returns the canonical pointer (fragment without `#`) alongside the target so callers
/// can key caches by it.
pub(crate) fn resolve_local_ref<'a>(root: &'a Value, ref_str: &str) -> SpecResult<(String, &'a Value)> {
    let pointer = local_pointer(ref_str)?;
    let mut current = root;
    for raw in pointer.split('/').skip(1) {
        let segment = decode_pointer_segment(raw);
        current = match current {
            Value::Object(map) => map.get(&segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            _ => None,
        }
        .ok_or_else(|| SpecError::UnresolvedRef(ref_str.to_string()))?;
    }
    Ok((pointer, current))
}

/// Follows a chain of `{"$ref": ...}` objects until a concrete value is reached.
///
/// Used for parameters, request bodies and path items; schemas have their own
/// cycle-aware resolution in the compiler.
pub(crate) fn resolve_ref_chain<'a>(root: &'a Value, value: &'a Value) -> SpecResult<&'a Value> {
    let mut current = value;
    let mut seen = Vec::new();
    while let Some(ref_str) = ref_target(current) {
        if seen.iter().any(|s: &String| s == ref_str) {
            return Err(SpecError::UnresolvedRef(format!(
                "{} (circular reference)",
                ref_str
            )));
        }
        seen.push(ref_str.to_string());
        current = resolve_local_ref(root, ref_str)?.1;
    }
    Ok(current)
}

/// Returns the `$ref` string of an object, if any.
pub(crate) fn ref_target(value: &Value) -> Option<&str> {
    value.get("$ref").and_then(Value::as_str)
}

/// Validates that a reference is local and returns its JSON Pointer part.
fn local_pointer(ref_str: &str) -> SpecResult<String> {
    match ref_str.strip_prefix('#') {
        Some("") => Ok(String::new()),
        Some(pointer) if pointer.starts_with('/') => Ok(pointer.to_string()),
        _ => Err(SpecError::UnresolvedRef(format!(
            "{} (only same-document references are supported)",
            ref_str
        ))),
    }
}

/// Decodes a JSON Pointer segment (handles `~1`, `~0` and percent-encoding).
pub(crate) fn decode_pointer_segment(segment: &str) -> String {
    let decoded = segment.replace("~1", "/").replace("~0", "~");
    percent_decode_str(&decoded).decode_utf8_lossy().into_owned()
}

/// Encodes a single JSON Pointer segment.
pub(crate) fn encode_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Joins segments into a `#/...` reference, escaping each one.
pub(crate) fn join_pointer<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::from("#");
    for segment in segments {
        out.push('/');
        out.push_str(&encode_pointer_segment(segment.as_ref()));
    }
    out
}
