#![deny(missing_docs)]

//! # Scalar Coercion
//!
//! Converts raw parameter strings into typed JSON values before schema evaluation.
//! Untyped schemas try integer, number and boolean in turn before settling on string.

use crate::oas::schema::TypeTag;
use serde_json::{Number, Value};

/// Converts `raw` to the primitive named by `tag`.
///
/// On failure returns a phrase describing the expectation ("must be an integer").
pub fn coerce_scalar(raw: &str, tag: TypeTag) -> Result<Value, String> {
    match tag {
        TypeTag::String => Ok(Value::String(raw.to_string())),
        TypeTag::Integer => parse_integer(raw),
        TypeTag::Number => parse_number(raw),
        TypeTag::Boolean => parse_boolean(raw)
            .map(Value::Bool)
            .ok_or_else(|| format!("must be a boolean ('true' or 'false'), got '{}'", raw)),
        TypeTag::Any => Ok(coerce_auto(raw)),
        TypeTag::Array | TypeTag::Object => {
            Err(format!("must be {}, got the scalar '{}'", article(tag), raw))
        }
    }
}

/// Best-effort typing for schemas without a direct type.
pub fn coerce_auto(raw: &str) -> Value {
    parse_integer(raw)
        .or_else(|_| parse_number(raw))
        .ok()
        .or_else(|| parse_boolean(raw).map(Value::Bool))
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

fn parse_integer(raw: &str) -> Result<Value, String> {
    if !is_integer_literal(raw) {
        return Err(format!("must be an integer, got '{}'", raw));
    }
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    if let Ok(n) = digits.parse::<i64>() {
        return Ok(Value::from(n));
    }
    digits
        .parse::<u64>()
        .map(Value::from)
        .map_err(|_| format!("integer '{}' is out of range", raw))
}

fn parse_number(raw: &str) -> Result<Value, String> {
    if is_integer_literal(raw) {
        if let Ok(v) = parse_integer(raw) {
            return Ok(v);
        }
    }
    if !is_decimal_literal(raw) {
        return Err(format!("must be a number, got '{}'", raw));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("number '{}' is out of range", raw))
}

fn parse_boolean(raw: &str) -> Option<bool> {
    match raw {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// `[+-]?[0-9]+`
fn is_integer_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// `[+-]?(digits[.digits?] | .digits)([eE][+-]?digits)?`
fn is_decimal_literal(raw: &str) -> bool {
    let body = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let mantissa_ok = all_digits(int_part)
        && frac_part.is_none_or(all_digits)
        && (!int_part.is_empty() || frac_part.is_some_and(|f| !f.is_empty()));

    let exponent_ok = exponent.is_none_or(|e| {
        let e = e.strip_prefix(['+', '-']).unwrap_or(e);
        !e.is_empty() && all_digits(e)
    });
    mantissa_ok && exponent_ok
}

fn article(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::String => "a string",
        TypeTag::Integer => "an integer",
        TypeTag::Number => "a number",
        TypeTag::Boolean => "a boolean",
        TypeTag::Array => "an array",
        TypeTag::Object => "an object",
        TypeTag::Any => "a value",
    }
}
