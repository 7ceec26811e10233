#![deny(missing_docs)]

//! # Validator Options
//!
//! Tunables applied while compiling a specification. Every field has a default,
//! so an empty document is a valid configuration.
//!
//! ## Example (YAML)
//! ```yaml
//! method_aliases:
//!   HEAD: [GET]
//!   OPTIONS: [GET, POST]
//! check_formats: true
//! base_path: /api/v1
//! reject_unknown_query_params: false
//! ```

use crate::error::{SpecError, SpecResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options controlling how a specification is compiled and enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorOptions {
    /// Fallback methods tried, in order, when a matched route lacks an operation for
    /// the request method. Keys and values are HTTP method names (any case).
    pub method_aliases: IndexMap<String, Vec<String>>,

    /// Enforce recognised `format` tags (`date-time`, `uuid`, ...).
    pub check_formats: bool,

    /// Server prefix stripped from request paths before route matching.
    pub base_path: Option<String>,

    /// Treat query keys not declared by the operation as invalid.
    pub reject_unknown_query_params: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            method_aliases: IndexMap::new(),
            check_formats: true,
            base_path: None,
            reject_unknown_query_params: false,
        }
    }
}

impl ValidatorOptions {
    /// Parses options from a YAML (or JSON) string.
    pub fn from_yaml_str(content: &str) -> SpecResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| SpecError::Parse(format!("Failed to parse validator options: {}", e)))
    }

    /// Loads options from a file. `.json` files are parsed as JSON, everything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> SpecResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&content).map_err(|e| {
                SpecError::Parse(format!(
                    "Failed to parse validator options '{}': {}",
                    path.display(),
                    e
                ))
            })
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Adds a method alias, e.g. `alias("HEAD", ["GET"])`.
    pub fn alias<I, S>(mut self, method: &str, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.method_aliases.insert(
            method.to_string(),
            fallbacks.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Sets the server prefix stripped before matching.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let opts = ValidatorOptions::from_yaml_str("{}").unwrap();
        assert_eq!(opts, ValidatorOptions::default());
        assert!(opts.check_formats);
        assert!(opts.method_aliases.is_empty());
    }

    #[test]
    fn test_parse_aliases_and_base_path() {
        let yaml = r#"
method_aliases:
  HEAD: [GET]
base_path: /api/v1
check_formats: false
"#;
        let opts = ValidatorOptions::from_yaml_str(yaml).unwrap();
        assert_eq!(opts.method_aliases["HEAD"], vec!["GET".to_string()]);
        assert_eq!(opts.base_path.as_deref(), Some("/api/v1"));
        assert!(!opts.check_formats);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let err = ValidatorOptions::from_yaml_str("check_formats: [1, 2]").unwrap_err();
        assert!(matches!(err, SpecError::Parse(_)));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"reject_unknown_query_params": true}"#).unwrap();
        let opts = ValidatorOptions::from_path(&path).unwrap();
        assert!(opts.reject_unknown_query_params);
        assert!(opts.check_formats);
    }

    #[test]
    fn test_builder_helpers() {
        let opts = ValidatorOptions::default()
            .alias("HEAD", ["GET"])
            .with_base_path("/v2");
        assert_eq!(opts.method_aliases["HEAD"], vec!["GET".to_string()]);
        assert_eq!(opts.base_path.as_deref(), Some("/v2"));
    }
}
