//! # Violations
//!
//! Structural validation produces a tree: a failing keyword may wrap a
//! deeper cause (its *origin*), and one validation pass yields a collection
//! of such failures, which can itself nest when composition keywords report
//! per-branch results. Callers only ever see the flat form: an ordered list
//! of `{path, message}` pairs produced by [`ViolationTree::flatten`].
//!
//! ## Path Format
//!
//! A violation's path is the instance JSON pointer with its segments joined
//! by `/` and no leading slash (`message/order`). When the pointer is empty
//! (the failure is at the document root and names no property) the failing
//! schema keyword is used instead, so the path is never blank for a leaf.

use std::fmt;

use jsonschema::error::ValidationErrorKind;
use serde::Serialize;

/// A single structural violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Slash-joined instance pointer, or the schema keyword when the
    /// pointer is empty.
    pub path: String,
    /// Human-readable reason.
    pub message: String,
}

impl Violation {
    /// Create a violation from a path and a message.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "  (root): {}", self.message)
        } else {
            write!(f, "  {}: {}", self.path, self.message)
        }
    }
}

/// Ordered collection of violations from one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationViolations {
    violations: Vec<Violation>,
}

impl ValidationViolations {
    /// Returns the number of violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Returns true if there are no violations.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns a slice of all violations.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Consumes self and returns the inner Vec.
    pub fn into_inner(self) -> Vec<Violation> {
        self.violations
    }

    /// Whether any violation's path mentions `segment` as a whole segment.
    pub fn touches(&self, segment: &str) -> bool {
        self.violations
            .iter()
            .any(|v| v.path.split('/').any(|s| s == segment))
    }
}

impl From<Vec<Violation>> for ValidationViolations {
    fn from(violations: Vec<Violation>) -> Self {
        Self { violations }
    }
}

impl fmt::Display for ValidationViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// One failing keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafViolation {
    /// Instance pointer segments, unescaped.
    pub pointer: Vec<String>,
    /// The schema keyword that failed (`required`, `type`, ...).
    pub field: String,
    /// Reason text.
    pub reason: String,
    /// Deeper cause, if the keyword failed because a nested check did.
    pub origin: Option<Box<ViolationTree>>,
}

/// Raw validator output before flattening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationTree {
    /// A single failing keyword.
    Leaf(LeafViolation),
    /// Several independent failures, in encounter order.
    Collection(Vec<ViolationTree>),
    /// A failure with no structure beyond its text.
    Opaque(String),
}

impl ViolationTree {
    /// Build the tree for every error a compiled validator reports.
    pub fn from_errors<'a, I>(errors: I) -> Self
    where
        I: IntoIterator<Item = jsonschema::ValidationError<'a>>,
    {
        Self::Collection(errors.into_iter().map(|e| Self::from_error(&e)).collect())
    }

    fn from_error(err: &jsonschema::ValidationError<'_>) -> Self {
        let mut pointer = pointer_segments(&err.instance_path.to_string());
        let field = schema_keyword(&err.schema_path.to_string());
        let origin = match &err.kind {
            ValidationErrorKind::PropertyNames { error } => Some(Box::new(Self::from_error(error))),
            _ => None,
        };
        // A missing property is reported on its parent; point at the property.
        if let ValidationErrorKind::Required { property } = &err.kind {
            if let Some(name) = property.as_str() {
                pointer.push(name.to_string());
            }
        }
        Self::Leaf(LeafViolation {
            pointer,
            field,
            reason: err.to_string(),
            origin,
        })
    }

    /// Whether the tree holds no failure at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(_) | Self::Opaque(_) => false,
            Self::Collection(members) => members.iter().all(Self::is_empty),
        }
    }

    /// Flatten into `{path, message}` pairs, depth first.
    ///
    /// A leaf with an origin is replaced by its origin's violations; the
    /// wrapper's own text is dropped.
    pub fn flatten(&self) -> ValidationViolations {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        ValidationViolations::from(out)
    }

    fn flatten_into(&self, out: &mut Vec<Violation>) {
        match self {
            Self::Leaf(leaf) => match &leaf.origin {
                Some(origin) => origin.flatten_into(out),
                None => {
                    let path = if leaf.pointer.is_empty() {
                        leaf.field.clone()
                    } else {
                        leaf.pointer.join("/")
                    };
                    out.push(Violation::new(path, leaf.reason.clone()));
                }
            },
            Self::Collection(members) => {
                for member in members {
                    member.flatten_into(out);
                }
            }
            Self::Opaque(text) => out.push(Violation::new("", text.clone())),
        }
    }
}

/// Split a JSON pointer into unescaped segments.
fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// The keyword a schema path ends in.
fn schema_keyword(schema_path: &str) -> String {
    schema_path
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn leaf(pointer: &[&str], field: &str, reason: &str) -> ViolationTree {
        ViolationTree::Leaf(LeafViolation {
            pointer: pointer.iter().map(|s| s.to_string()).collect(),
            field: field.to_string(),
            reason: reason.to_string(),
            origin: None,
        })
    }

    #[test]
    fn leaf_path_joins_pointer_segments() {
        let flat = leaf(&["message", "order"], "type", "value must be an object").flatten();
        assert_eq!(
            flat.violations(),
            &[Violation::new("message/order", "value must be an object")]
        );
    }

    #[test]
    fn empty_pointer_falls_back_to_keyword() {
        let flat = leaf(&[], "type", "value must be an object").flatten();
        assert_eq!(flat.violations()[0].path, "type");
    }

    #[test]
    fn origin_replaces_wrapper() {
        let inner = leaf(&["context", "domain"], "pattern", "does not match");
        let outer = ViolationTree::Leaf(LeafViolation {
            pointer: vec!["context".into()],
            field: "allOf".into(),
            reason: "doesn't match all schemas".into(),
            origin: Some(Box::new(inner)),
        });
        let flat = outer.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat.violations()[0], Violation::new("context/domain", "does not match"));
    }

    #[test]
    fn nested_collections_concatenate_in_order() {
        let tree = ViolationTree::Collection(vec![
            leaf(&["a"], "type", "first"),
            ViolationTree::Collection(vec![
                leaf(&["b"], "type", "second"),
                ViolationTree::Collection(vec![leaf(&["c"], "type", "third")]),
            ]),
            ViolationTree::Opaque("fourth".into()),
        ]);
        let flat = tree.flatten();
        let messages: Vec<&str> = flat.violations().iter().map(|v| v.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third", "fourth"]);
        assert_eq!(flat.violations()[3].path, "");
    }

    #[test]
    fn empty_collection_flattens_to_nothing() {
        let tree = ViolationTree::Collection(vec![ViolationTree::Collection(vec![])]);
        assert!(tree.is_empty());
        assert!(tree.flatten().is_empty());
    }

    #[test]
    fn pointer_segments_unescape() {
        assert_eq!(pointer_segments(""), Vec::<String>::new());
        assert_eq!(pointer_segments("/a~1b/c~0d"), vec!["a/b", "c~d"]);
    }

    #[test]
    fn from_errors_points_at_missing_property() {
        let schema = json!({
            "type": "object",
            "required": ["context", "message"],
            "properties": { "context": { "type": "object" } }
        });
        let validator = jsonschema::validator_for(&schema).unwrap();
        let instance = json!({ "context": {} });
        let tree = ViolationTree::from_errors(validator.iter_errors(&instance));
        let flat = tree.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat.violations()[0].path, "message");
        assert!(flat.violations()[0].message.contains("message"));
    }

    #[test]
    fn from_errors_keeps_nested_instance_paths() {
        let schema = json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "object",
                    "properties": { "count": { "type": "integer" } }
                }
            }
        });
        let validator = jsonschema::validator_for(&schema).unwrap();
        let instance = json!({ "message": { "count": "three" } });
        let flat = ViolationTree::from_errors(validator.iter_errors(&instance)).flatten();
        assert_eq!(flat.violations()[0].path, "message/count");
    }

    #[test]
    fn touches_matches_whole_segments_only() {
        let v = ValidationViolations::from(vec![Violation::new("message/order", "missing")]);
        assert!(v.touches("order"));
        assert!(!v.touches("ord"));
    }

    #[test]
    fn violation_display_root() {
        let v = Violation::new("", "bad");
        assert!(v.to_string().contains("(root)"));
    }

    fn arb_tree() -> impl Strategy<Value = ViolationTree> {
        let leaf = (
            prop::collection::vec("[a-z]{1,6}", 0..3),
            "[a-z]{1,8}",
            "[a-z ]{0,12}",
        )
            .prop_map(|(pointer, field, reason)| {
                ViolationTree::Leaf(LeafViolation {
                    pointer,
                    field,
                    reason,
                    origin: None,
                })
            });
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(ViolationTree::Collection),
                inner.prop_map(|origin| {
                    ViolationTree::Leaf(LeafViolation {
                        pointer: vec!["wrapper".into()],
                        field: "allOf".into(),
                        reason: "wrapper".into(),
                        origin: Some(Box::new(origin)),
                    })
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn flatten_is_deterministic(tree in arb_tree()) {
            prop_assert_eq!(tree.flatten(), tree.flatten());
        }

        #[test]
        fn flatten_never_emits_wrapper_text(tree in arb_tree()) {
            prop_assert!(tree.flatten().violations().iter().all(|v| v.message != "wrapper"));
        }

        #[test]
        fn collection_of_leaves_flattens_one_to_one(
            leaves in prop::collection::vec(("[a-z]{1,6}", "[a-z]{1,10}"), 0..12)
        ) {
            let tree = ViolationTree::Collection(
                leaves.iter().map(|(p, m)| leaf(&[p.as_str()], "type", m)).collect(),
            );
            let flat = tree.flatten();
            prop_assert_eq!(flat.len(), leaves.len());
            for (v, (p, m)) in flat.violations().iter().zip(&leaves) {
                prop_assert_eq!(&v.path, p);
                prop_assert_eq!(&v.message, m);
            }
        }
    }
}
