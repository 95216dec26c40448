//! # Action Resolution
//!
//! Picks the operation whose request-body schema pins `context.action` to
//! the payload's action, through either `const` or `enum`, directly or via
//! `allOf` members at any depth.
//!
//! Operations are searched in document order (paths as declared, methods in
//! [`Method::TRAVERSAL_ORDER`](crate::document::Method::TRAVERSAL_ORDER)) and
//! the first match wins. Documents are expected to give each action to one
//! operation; if two operations claim the same action, the earlier one is
//! used and the later one is never reached.

use crate::document::{Operation, SchemaDocument, DISCRIMINATOR_PATH};
use crate::node::{Constraint, SchemaNode};

/// Find the operation that handles `action`, if any.
pub fn resolve_action<'a>(document: &'a SchemaDocument, action: &str) -> Option<&'a Operation> {
    document
        .operations()
        .iter()
        .find(|op| schema_matches_action(op.node(), action))
}

/// Whether a request-body schema constrains `context.action` to admit `action`.
pub fn schema_matches_action(schema: &SchemaNode, action: &str) -> bool {
    discriminator_constraints(schema)
        .into_iter()
        .any(|c| c.admits(action))
}

/// Every action value a request-body schema declares, in declaration order.
pub fn declared_actions(schema: &SchemaNode) -> Vec<String> {
    discriminator_constraints(schema)
        .into_iter()
        .flat_map(Constraint::values)
        .map(str::to_string)
        .collect()
}

fn discriminator_constraints(schema: &SchemaNode) -> Vec<&Constraint> {
    let [context, action] = DISCRIMINATOR_PATH;
    schema
        .property_candidates(context)
        .into_iter()
        .flat_map(|ctx| ctx.property_candidates(action))
        .flat_map(SchemaNode::constraints)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_document, DocumentSet, Method};
    use url::Url;

    const SPEC: &str = r#"
openapi: 3.1.0
info:
  title: Test API
  version: 1.0.0
paths:
  /search:
    post:
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [context, message]
              properties:
                context:
                  type: object
                  required: [action]
                  properties:
                    action:
                      const: search
                message:
                  type: object
  /select:
    post:
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [context, message]
              properties:
                context:
                  allOf:
                    - type: object
                      properties:
                        action:
                          enum: [select]
                message:
                  type: object
  /duplicate:
    get:
      requestBody:
        content:
          application/json:
            schema:
              properties:
                context:
                  properties:
                    action: { const: select }
    post:
      requestBody:
        content:
          application/json:
            schema:
              properties:
                context:
                  properties:
                    action: { const: init }
"#;

    fn document() -> SchemaDocument {
        let base = Url::parse("https://example.com/spec.yaml").unwrap();
        let mut docs = DocumentSet::default();
        docs.insert(&base, parse_document(SPEC.as_bytes(), "test").unwrap());
        SchemaDocument::build(base, docs).unwrap()
    }

    #[test]
    fn resolves_const_and_nested_enum_to_distinct_operations() {
        let doc = document();
        let search = resolve_action(&doc, "search").unwrap();
        let select = resolve_action(&doc, "select").unwrap();
        assert_eq!(search.path(), "/search");
        assert_eq!(select.path(), "/select");
        assert_ne!(search.schema_uri(), select.schema_uri());
    }

    #[test]
    fn unknown_action_is_not_found() {
        assert!(resolve_action(&document(), "unknown").is_none());
    }

    #[test]
    fn matching_is_exact() {
        let doc = document();
        assert!(resolve_action(&doc, "Search").is_none());
        assert!(resolve_action(&doc, " search ").is_none());
        assert!(resolve_action(&doc, "").is_none());
    }

    #[test]
    fn first_match_wins_on_duplicate_actions() {
        let doc = document();
        // "/select" is declared before "/duplicate", so it wins.
        assert_eq!(resolve_action(&doc, "select").unwrap().path(), "/select");
    }

    #[test]
    fn methods_are_searched_post_first() {
        let doc = document();
        let ops: Vec<Method> = doc
            .operations()
            .iter()
            .filter(|op| op.path() == "/duplicate")
            .map(Operation::method)
            .collect();
        assert_eq!(ops, [Method::Post, Method::Get]);
        assert_eq!(resolve_action(&doc, "init").unwrap().method(), Method::Post);
    }

    #[test]
    fn declared_actions_lists_constraints() {
        let doc = document();
        let all: Vec<Vec<String>> = doc
            .operations()
            .iter()
            .map(|op| declared_actions(op.node()))
            .collect();
        assert_eq!(all[0], ["search"]);
        assert_eq!(all[1], ["select"]);
    }
}
