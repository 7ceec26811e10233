#![deny(missing_docs)]

//! # Format Checks
//!
//! Enforcement of the recognised `format` tags. String formats apply to strings only,
//! `int32`/`int64` to numbers only; other JSON types pass untouched.

use crate::oas::schema::Format;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::Url;

/// Checks `value` against `format`. Returns the violated expectation on failure.
pub fn check_format(value: &Value, format: &Format) -> Result<(), String> {
    match value {
        Value::String(s) => check_string_format(s, format),
        Value::Number(n) => {
            let range = match format {
                Format::Int32 => i128::from(i32::MIN)..=i128::from(i32::MAX),
                Format::Int64 => i128::from(i64::MIN)..=i128::from(i64::MAX),
                _ => return Ok(()),
            };
            let integral = n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from));
            match integral {
                Some(i) if !range.contains(&i) => {
                    Err(format!("{} does not fit format '{}'", n, format.as_str()))
                }
                _ => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

fn check_string_format(s: &str, format: &Format) -> Result<(), String> {
    let ok = match format {
        Format::DateTime => DateTime::parse_from_rfc3339(s).is_ok(),
        Format::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() && s.len() == 10,
        Format::Uuid => uuid::Uuid::parse_str(s).is_ok(),
        Format::Email => is_email(s),
        Format::Ipv4 => s.parse::<Ipv4Addr>().is_ok(),
        Format::Ipv6 => s.parse::<Ipv6Addr>().is_ok(),
        Format::Uri => Url::parse(s).is_ok(),
        Format::Int32 | Format::Int64 | Format::Other(_) => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid '{}'", s, format.as_str()))
    }
}

/// `local@domain.tld`, no whitespace.
fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !s.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
