#![deny(missing_docs)]

//! # Schema Model
//!
//! Immutable, arena-allocated representation of JSON Schema fragments.
//!
//! Schemas reference each other by [`SchemaId`] rather than by ownership, so recursive
//! definitions (a `Node` with `children: [Node]`) are a plain cycle of indices. The
//! arena is filled once by the compiler and never mutated afterwards.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Index of a schema inside a [`SchemaArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(pub(crate) usize);

impl SchemaId {
    /// Position of the schema within its arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Owner of every compiled schema of a specification.
#[derive(Debug, Default)]
pub struct SchemaArena {
    nodes: Vec<SchemaNode>,
}

impl SchemaArena {
    /// Returns the node for `id`.
    ///
    /// Ids are only minted by the arena itself, so lookups cannot miss.
    pub fn get(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    /// Number of compiled nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing has been compiled.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reserves a slot (filled with an accept-anything node) and returns its id.
    pub(crate) fn reserve(&mut self) -> SchemaId {
        self.nodes.push(SchemaNode::any());
        SchemaId(self.nodes.len() - 1)
    }

    /// Stores `node` into a previously reserved slot.
    pub(crate) fn fill(&mut self, id: SchemaId, node: SchemaNode) {
        self.nodes[id.0] = node;
    }

    /// Allocates a new node.
    pub(crate) fn push(&mut self, node: SchemaNode) -> SchemaId {
        self.nodes.push(node);
        SchemaId(self.nodes.len() - 1)
    }

    pub(crate) fn nodes(&self) -> &[SchemaNode] {
        &self.nodes
    }

    /// Follows wrapper nodes (`$ref` chains, `allOf`, `$ref` with sibling keywords) to the
    /// node that names the value's type.
    ///
    /// `anyOf`/`oneOf` are followed only when every alternative resolves to the same type.
    /// Returns `id` itself when no single type can be determined.
    pub fn typed(&self, id: SchemaId) -> SchemaId {
        self.find_typed(id, &mut HashMap::new()).unwrap_or(id)
    }

    /// Type tag of [`SchemaArena::typed`].
    pub fn type_tag_of(&self, id: SchemaId) -> TypeTag {
        self.get(self.typed(id)).type_tag()
    }

    /// `seen` memoises results; a node still being resolved reads as untyped, which also
    /// stops combinator cycles that have not been rejected yet.
    fn find_typed(&self, id: SchemaId, seen: &mut HashMap<SchemaId, Option<SchemaId>>) -> Option<SchemaId> {
        if let Some(known) = seen.get(&id) {
            return *known;
        }
        let node = self.get(id);
        if !matches!(node.kind, SchemaKind::Any) {
            return Some(id);
        }
        seen.insert(id, None);

        let mut found = node.all_of.iter().find_map(|sub| self.find_typed(*sub, seen));
        for alternatives in [&node.one_of, &node.any_of] {
            if found.is_some() {
                break;
            }
            let resolved: Option<Vec<SchemaId>> =
                alternatives.iter().map(|sub| self.find_typed(*sub, seen)).collect();
            if let Some((first, rest)) = resolved.as_deref().and_then(<[SchemaId]>::split_first) {
                let tag = self.get(*first).type_tag();
                if rest.iter().all(|other| self.get(*other).type_tag() == tag) {
                    found = Some(*first);
                }
            }
        }
        seen.insert(id, found);
        found
    }
}

/// A single compiled schema.
///
/// Evaluation order: `nullable` short-circuit, then combinators (`allOf`, `anyOf`,
/// `oneOf`, `not`), then the direct type and its constraints, then `enum`/`format`.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Direct type and type-specific constraints.
    pub kind: SchemaKind,
    /// A JSON `null` is accepted.
    pub nullable: bool,
    /// Allowed literal values (`enum`, or `const` as a single value).
    pub enum_values: Option<Vec<Value>>,
    /// Advisory `format` tag.
    pub format: Option<Format>,
    /// Every sub-schema must pass.
    pub all_of: Vec<SchemaId>,
    /// At least one sub-schema must pass.
    pub any_of: Vec<SchemaId>,
    /// Exactly one sub-schema must pass.
    pub one_of: Vec<SchemaId>,
    /// The sub-schema must fail.
    pub not: Option<SchemaId>,
    /// Boolean schema `false`: nothing is accepted.
    pub never: bool,
}

impl SchemaNode {
    /// A node without any constraint.
    pub fn any() -> Self {
        Self::of(SchemaKind::Any)
    }

    /// A node of the given kind with no other constraint.
    pub fn of(kind: SchemaKind) -> Self {
        Self {
            kind,
            nullable: false,
            enum_values: None,
            format: None,
            all_of: Vec::new(),
            any_of: Vec::new(),
            one_of: Vec::new(),
            not: None,
            never: false,
        }
    }

    /// True when any combinator keyword is present.
    pub fn has_combinators(&self) -> bool {
        !self.all_of.is_empty() || !self.any_of.is_empty() || !self.one_of.is_empty() || self.not.is_some()
    }

    /// The primitive type tag, used by parameter coercion.
    pub fn type_tag(&self) -> TypeTag {
        self.kind.tag()
    }
}

/// Type tag of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// `string`
    String,
    /// `integer`
    Integer,
    /// `number`
    Number,
    /// `boolean`
    Boolean,
    /// `array`
    Array,
    /// `object`
    Object,
    /// No `type` keyword.
    Any,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::String => "string",
            TypeTag::Integer => "integer",
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
            TypeTag::Any => "any",
        };
        f.write_str(name)
    }
}

/// Direct type of a schema with its type-specific constraints.
#[derive(Debug, Clone)]
pub enum SchemaKind {
    /// Accepts any JSON value.
    Any,
    /// `type: string`
    String(StringRules),
    /// `type: integer`
    Integer(NumericRules),
    /// `type: number`
    Number(NumericRules),
    /// `type: boolean`
    Boolean,
    /// `type: array`
    Array(ArrayRules),
    /// `type: object`
    Object(ObjectRules),
}

impl SchemaKind {
    /// The tag of this kind.
    pub fn tag(&self) -> TypeTag {
        match self {
            SchemaKind::Any => TypeTag::Any,
            SchemaKind::String(_) => TypeTag::String,
            SchemaKind::Integer(_) => TypeTag::Integer,
            SchemaKind::Number(_) => TypeTag::Number,
            SchemaKind::Boolean => TypeTag::Boolean,
            SchemaKind::Array(_) => TypeTag::Array,
            SchemaKind::Object(_) => TypeTag::Object,
        }
    }
}

/// Constraints of a `string` schema.
#[derive(Debug, Clone, Default)]
pub struct StringRules {
    /// `minLength`, counted in characters.
    pub min_length: Option<u64>,
    /// `maxLength`, counted in characters.
    pub max_length: Option<u64>,
    /// `pattern`, compiled once.
    pub pattern: Option<Pattern>,
}

/// Constraints shared by `integer` and `number` schemas.
#[derive(Debug, Clone, Default)]
pub struct NumericRules {
    /// Lower bound.
    pub minimum: Option<Bound>,
    /// Upper bound.
    pub maximum: Option<Bound>,
    /// `multipleOf`
    pub multiple_of: Option<f64>,
}

/// A numeric bound, inclusive unless `exclusive`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    /// Limit value.
    pub value: f64,
    /// The limit itself is not allowed.
    pub exclusive: bool,
}

/// Constraints of an `array` schema.
#[derive(Debug, Clone, Default)]
pub struct ArrayRules {
    /// Schema every element must satisfy.
    pub items: Option<SchemaId>,
    /// `minItems`
    pub min_items: Option<u64>,
    /// `maxItems`
    pub max_items: Option<u64>,
    /// `uniqueItems`
    pub unique_items: bool,
}

/// Constraints of an `object` schema.
#[derive(Debug, Clone, Default)]
pub struct ObjectRules {
    /// Declared properties.
    pub properties: IndexMap<String, SchemaId>,
    /// Names that must be present.
    pub required: Vec<String>,
    /// Policy for properties not listed in `properties`.
    pub additional: AdditionalProperties,
    /// `minProperties`
    pub min_properties: Option<u64>,
    /// `maxProperties`
    pub max_properties: Option<u64>,
}

/// `additionalProperties` policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdditionalProperties {
    /// Unknown properties are ignored.
    #[default]
    Allow,
    /// Unknown properties are an error.
    Deny,
    /// Unknown properties must satisfy the schema.
    Schema(SchemaId),
}

/// A compiled `pattern` keyword.
#[derive(Clone)]
pub struct Pattern {
    /// Source text as written in the specification.
    pub source: String,
    /// Compiled expression (unanchored, as in JSON Schema).
    pub regex: Regex,
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

/// Recognised `format` tags. Unknown tags are kept but never enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    /// RFC 3339 timestamp.
    DateTime,
    /// RFC 3339 full-date.
    Date,
    /// RFC 4122 UUID.
    Uuid,
    /// Simplified `local@domain` address.
    Email,
    /// Dotted-quad IPv4 address.
    Ipv4,
    /// IPv6 address.
    Ipv6,
    /// Absolute URI.
    Uri,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Anything else, not enforced.
    Other(String),
}

impl Format {
    /// Maps a `format` keyword value to a tag.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "date-time" => Format::DateTime,
            "date" => Format::Date,
            "uuid" => Format::Uuid,
            "email" => Format::Email,
            "ipv4" => Format::Ipv4,
            "ipv6" => Format::Ipv6,
            "uri" => Format::Uri,
            "int32" => Format::Int32,
            "int64" => Format::Int64,
            other => Format::Other(other.to_string()),
        }
    }

    /// The keyword value as written in a specification.
    pub fn as_str(&self) -> &str {
        match self {
            Format::DateTime => "date-time",
            Format::Date => "date",
            Format::Uuid => "uuid",
            Format::Email => "email",
            Format::Ipv4 => "ipv4",
            Format::Ipv6 => "ipv6",
            Format::Uri => "uri",
            Format::Int32 => "int32",
            Format::Int64 => "int64",
            Format::Other(tag) => tag,
        }
    }
}
