#![deny(missing_docs)]

//! # Route Index
//!
//! Compiled path templates with specificity-ordered matching.
//!
//! Templates are grouped by segment count. Within a group they are tried from the most
//! literal segments to the fewest, so `/users/me` wins over `/users/{id}`. Two templates
//! that could match the same path with the same number of literals are rejected while
//! building, which keeps matching free of tie-breaking rules.

use crate::error::{SpecError, SpecResult};
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use std::collections::{HashMap, HashSet};

/// One `/`-separated piece of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request segment (compared after percent-decoding).
    Literal(String),
    /// Binds the request segment to a name.
    Param(String),
}

/// A parsed path template such as `/users/{id}/orders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl RouteTemplate {
    /// Parses a template. Placeholders must span a whole segment.
    pub fn parse(template: &str) -> SpecResult<Self> {
        if !template.starts_with('/') {
            return Err(SpecError::General(format!(
                "Path template '{}' must start with '/'",
                template
            )));
        }

        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        for piece in split_path(template) {
            let inner = piece.strip_prefix('{').and_then(|p| p.strip_suffix('}'));
            match inner {
                Some(name) if !name.is_empty() && !name.contains(['{', '}']) => {
                    if !seen.insert(name.to_string()) {
                        return Err(SpecError::InvalidParameter(format!(
                            "Path template '{}' contains duplicate path parameter '{}'",
                            template, name
                        )));
                    }
                    segments.push(Segment::Param(name.to_string()));
                }
                _ if piece.contains(['{', '}']) => {
                    return Err(SpecError::InvalidParameter(format!(
                        "Path template '{}' has unsupported segment '{}': a placeholder must fill the whole segment",
                        template, piece
                    )));
                }
                _ => segments.push(Segment::Literal(decode_segment(piece))),
            }
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    /// The template as written in the specification.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of literal segments (the specificity rank).
    pub fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Placeholder names in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Same literals at the same positions, placeholder names aside.
    fn same_shape(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    (Segment::Param(_), Segment::Param(_)) => true,
                    _ => false,
                })
    }

    /// Some request path could match both templates.
    fn overlaps(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    _ => true,
                })
    }

    /// Matches already split and decoded request segments, returning raw placeholder values.
    fn bind(&self, raw: &[&str], decoded: &[String]) -> Option<IndexMap<String, String>> {
        let mut bindings = IndexMap::new();
        for ((segment, raw), decoded) in self.segments.iter().zip(raw).zip(decoded) {
            match segment {
                Segment::Literal(literal) if literal == decoded => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    bindings.insert(name.clone(), (*raw).to_string());
                }
            }
        }
        Some(bindings)
    }
}

/// A successful match.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    /// The matched template.
    pub template: &'a RouteTemplate,
    /// Value stored with the template.
    pub value: &'a T,
    /// Placeholder name to raw (still percent-encoded) request segment.
    pub bindings: IndexMap<String, String>,
}

/// Templates with attached values, indexed for matching.
#[derive(Debug)]
pub struct RouteIndex<T> {
    entries: Vec<(RouteTemplate, T)>,
    /// Segment count to entry indices, most literals first.
    buckets: HashMap<usize, Vec<usize>>,
}

impl<T> RouteIndex<T> {
    /// Builds the index, rejecting duplicate and ambiguous templates.
    pub fn build(entries: Vec<(RouteTemplate, T)>) -> SpecResult<Self> {
        let mut buckets: HashMap<usize, Vec<usize>> = HashMap::new();
        for (idx, (template, _)) in entries.iter().enumerate() {
            let bucket = buckets.entry(template.segments.len()).or_default();

            for &other_idx in bucket.iter() {
                let other = &entries[other_idx].0;
                if template.same_shape(other) {
                    return Err(SpecError::DuplicateRoute {
                        first: other.raw.clone(),
                        second: template.raw.clone(),
                    });
                }
                if template.literal_count() == other.literal_count() && template.overlaps(other) {
                    return Err(SpecError::AmbiguousRoute {
                        first: other.raw.clone(),
                        second: template.raw.clone(),
                    });
                }
            }
            bucket.push(idx);
        }

        for bucket in buckets.values_mut() {
            // Stable sort keeps declaration order among equal ranks.
            bucket.sort_by_key(|&idx| std::cmp::Reverse(entries[idx].0.literal_count()));
        }

        Ok(Self { entries, buckets })
    }

    /// Finds the most specific template matching `path`.
    pub fn find(&self, path: &str) -> Option<RouteMatch<'_, T>> {
        if !path.starts_with('/') {
            return None;
        }
        let raw: Vec<&str> = split_path(path).collect();
        let decoded: Vec<String> = raw.iter().map(|s| decode_segment(s)).collect();

        self.buckets.get(&raw.len())?.iter().find_map(|&idx| {
            let (template, value) = &self.entries[idx];
            template.bind(&raw, &decoded).map(|bindings| RouteMatch {
                template,
                value,
                bindings,
            })
        })
    }

    /// All templates with their values, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&RouteTemplate, &T)> {
        self.entries.iter().map(|(t, v)| (t, v))
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no template is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Splits a path into segments after dropping one trailing slash (`/` itself stays one
/// empty segment).
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = match path.strip_suffix('/') {
        Some(rest) if !rest.is_empty() => rest,
        _ => path,
    };
    trimmed.split('/').skip(1)
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}
