//! # Schema Nodes
//!
//! A typed, pre-resolved view of a request-body schema, restricted to the
//! properties along one property path (for the resolver, `context` then
//! `action`). Built once per operation when a document is loaded, so that
//! matching a payload's action never probes raw JSON.
//!
//! `$ref`s are followed during construction. A reference that is already
//! being expanded further up the same branch becomes an unconstrained leaf,
//! as does a reference that cannot be resolved. Self-referencing schemas
//! therefore produce a finite tree and simply do not match.

use serde_json::Value;

use crate::document::{DocumentSet, Located};

/// Keywords that still shape a schema when they sit beside a `$ref`.
const SHAPE_KEYWORDS: [&str; 4] = ["properties", "allOf", "const", "enum"];

/// Value restriction declared directly on a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `const`
    Const(Value),
    /// `enum`
    Enum(Vec<Value>),
    /// Neither.
    Unconstrained,
}

impl Constraint {
    fn of(schema: &Value) -> Self {
        if let Some(value) = schema.get("const") {
            Self::Const(value.clone())
        } else if let Some(Value::Array(values)) = schema.get("enum") {
            Self::Enum(values.clone())
        } else {
            Self::Unconstrained
        }
    }

    /// Whether the string `value` satisfies this constraint.
    pub fn admits(&self, value: &str) -> bool {
        match self {
            Self::Const(c) => c.as_str() == Some(value),
            Self::Enum(values) => values.iter().any(|v| v.as_str() == Some(value)),
            Self::Unconstrained => false,
        }
    }

    /// String values this constraint allows, in declaration order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Const(c) => c.as_str().into_iter().collect(),
            Self::Enum(values) => values.iter().filter_map(Value::as_str).collect(),
            Self::Unconstrained => Vec::new(),
        }
    }
}

/// A schema, as seen along one property path.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Object schema. Only the property on the path is kept.
    Object {
        /// `(name, schema)` of the path property, if declared.
        properties: Vec<(String, SchemaNode)>,
        /// `allOf` members, plus any constraint declared beside `properties`.
        all_of: Vec<SchemaNode>,
    },
    /// `allOf` composition without own properties.
    AllOf(Vec<SchemaNode>),
    /// Anything else.
    Leaf(Constraint),
}

impl SchemaNode {
    /// Build the node for `schema`, keeping properties along `path`.
    pub fn build(schema: Located<'_>, path: &[&str], documents: &DocumentSet) -> Self {
        let mut expanding = Vec::new();
        Self::build_inner(schema, path, documents, &mut expanding)
    }

    fn build_inner(
        schema: Located<'_>,
        path: &[&str],
        documents: &DocumentSet,
        expanding: &mut Vec<String>,
    ) -> Self {
        let Some(reference) = schema.reference() else {
            return Self::build_local(&schema, path, documents, expanding);
        };

        let target = match documents.resolve(&schema.base, reference) {
            Some(target) if !expanding.contains(&target.uri()) => target,
            _ => return Self::Leaf(Constraint::Unconstrained),
        };
        expanding.push(target.uri());
        let resolved = Self::build_inner(target, path, documents, expanding);
        expanding.pop();

        let has_siblings = SHAPE_KEYWORDS.iter().any(|k| schema.value.get(*k).is_some());
        if has_siblings {
            let local = Self::build_local(&schema, path, documents, expanding);
            Self::AllOf(vec![resolved, local])
        } else {
            resolved
        }
    }

    fn build_local(
        schema: &Located<'_>,
        path: &[&str],
        documents: &DocumentSet,
        expanding: &mut Vec<String>,
    ) -> Self {
        let mut all_of = Vec::new();
        if let Some(members) = schema.child("allOf") {
            let count = members.value.as_array().map_or(0, Vec::len);
            for index in 0..count {
                if let Some(member) = members.item(index) {
                    all_of.push(Self::build_inner(member, path, documents, expanding));
                }
            }
        }
        let has_members = !all_of.is_empty();
        let constraint = Constraint::of(schema.value);
        if !has_members && schema.value.get("properties").is_none() {
            return Self::Leaf(constraint);
        }
        if constraint != Constraint::Unconstrained {
            all_of.push(Self::Leaf(constraint));
        }

        if schema.value.get("properties").is_some() {
            let properties = path
                .split_first()
                .and_then(|(head, rest)| {
                    let property = schema.child("properties")?.child(head)?;
                    let node = Self::build_inner(property, rest, documents, expanding);
                    Some(vec![((*head).to_string(), node)])
                })
                .unwrap_or_default();
            return Self::Object { properties, all_of };
        }
        Self::AllOf(all_of)
    }

    /// Every node that declares property `name` for this schema: the direct
    /// property and those of `allOf` members at any depth.
    pub fn property_candidates<'a>(&'a self, name: &str) -> Vec<&'a SchemaNode> {
        let mut out = Vec::new();
        self.collect_property(name, &mut out);
        out
    }

    fn collect_property<'a>(&'a self, name: &str, out: &mut Vec<&'a SchemaNode>) {
        match self {
            Self::Object { properties, all_of } => {
                out.extend(properties.iter().filter(|(n, _)| n == name).map(|(_, node)| node));
                for member in all_of {
                    member.collect_property(name, out);
                }
            }
            Self::AllOf(members) => {
                for member in members {
                    member.collect_property(name, out);
                }
            }
            Self::Leaf(_) => {}
        }
    }

    /// Constraints that apply to a value of this schema.
    pub fn constraints(&self) -> Vec<&Constraint> {
        let mut out = Vec::new();
        self.collect_constraints(&mut out);
        out
    }

    fn collect_constraints<'a>(&'a self, out: &mut Vec<&'a Constraint>) {
        match self {
            Self::Leaf(Constraint::Unconstrained) => {}
            Self::Leaf(c) => out.push(c),
            Self::Object { all_of: members, .. } | Self::AllOf(members) => {
                for member in members {
                    member.collect_constraints(out);
                }
            }
        }
    }
}
