#![deny(missing_docs)]

//! # Specification Document Loading
//!
//! Reads a specification from disk or memory into a `serde_json::Value` tree and checks
//! the root-level structure before the model builder walks it.

use crate::error::{SpecError, SpecResult};
use serde_json::Value;
use std::path::Path;

/// Text syntax of a specification document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// JSON text.
    Json,
    /// YAML text.
    Yaml,
    /// Unknown: JSON is tried first, then YAML.
    Auto,
}

impl DocumentFormat {
    /// Guesses the format from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => DocumentFormat::Json,
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Auto,
        }
    }
}

/// Reads and parses a specification file.
pub fn load_document_file(path: impl AsRef<Path>) -> SpecResult<Value> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    parse_document(&content, DocumentFormat::from_path(path)).map_err(|e| match e {
        SpecError::Parse(msg) => SpecError::Parse(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Parses specification text in the given syntax.
pub fn parse_document(content: &str, format: DocumentFormat) -> SpecResult<Value> {
    let value = match format {
        DocumentFormat::Json => parse_json(content)?,
        DocumentFormat::Yaml => parse_yaml(content)?,
        // YAML is a superset of JSON but reports JSON syntax errors poorly.
        DocumentFormat::Auto => match parse_json(content) {
            Ok(value) => value,
            Err(_) => parse_yaml(content)?,
        },
    };
    validate_document_root(&value)?;
    Ok(value)
}

fn parse_json(content: &str) -> SpecResult<Value> {
    serde_json::from_str(content)
        .map_err(|e| SpecError::Parse(format!("Failed to parse OpenAPI JSON: {}", e)))
}

fn parse_yaml(content: &str) -> SpecResult<Value> {
    serde_yaml::from_str(content)
        .map_err(|e| SpecError::Parse(format!("Failed to parse OpenAPI YAML: {}", e)))
}

/// Checks the root-level fields the model builder relies on.
pub(crate) fn validate_document_root(root: &Value) -> SpecResult<()> {
    let map = root
        .as_object()
        .ok_or_else(|| SpecError::General("OpenAPI document root must be an object".into()))?;

    if let Some(version) = map.get("openapi") {
        let version = version
            .as_str()
            .ok_or_else(|| SpecError::General("'openapi' version must be a string".into()))?;
        if !version.starts_with("3.") {
            return Err(SpecError::General(format!(
                "Unsupported OpenAPI version '{}': only 3.x documents are supported",
                version
            )));
        }
    }

    match map.get("paths") {
        Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(SpecError::General("'paths' must be an object".into())),
        None => Err(SpecError::General(
            "OpenAPI document missing required 'paths' object".into(),
        )),
    }
}
