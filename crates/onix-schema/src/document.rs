//! # Schema Document
//!
//! In-memory form of a loaded OpenAPI document: the root document plus every
//! document it references, prepared for request validation, and a list of
//! operations whose JSON request bodies have been compiled into structural
//! validators.
//!
//! A [`SchemaDocument`] is built once per load and never mutated afterwards;
//! a refresh replaces it wholesale.
//!
//! ## Reference Resolution
//!
//! Documents are keyed by their absolute URI without fragment. `$ref` values
//! are resolved relative to the URI of the document they appear in, and the
//! fragment is read as a JSON pointer. The same [`DocumentSet`] backs the
//! structural validator through [`jsonschema::Retrieve`], so compiled
//! validators never perform I/O.
//!
//! ## Request Mode
//!
//! Payloads are validated as requests: a property marked `readOnly: true` is
//! removed from its parent's `required` list before compilation, since
//! clients never send server-owned fields.
//!
//! ## OpenAPI 3.0 Dialect
//!
//! When the root declares `openapi: 3.0.x`, every loaded document is
//! rewritten into its Draft 2020-12 equivalent before compilation:
//!
//! - `nullable: true` adds `"null"` to `type` and to `enum`; a `const`
//!   becomes a two-value `enum`. A nullable schema with no `type` but with
//!   composition, `$ref` or `not` is wrapped as
//!   `anyOf: [<schema>, {type: null}]`.
//! - Boolean `exclusiveMinimum`/`exclusiveMaximum` take the value of the
//!   sibling `minimum`/`maximum`, which is dropped. `false` is removed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use jsonschema::{Retrieve, Uri, Validator};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Map, Value};
use url::Url;

use crate::error::LoadError;
use crate::node::SchemaNode;
use crate::violation::ViolationTree;

/// The media type whose schema is used for validation.
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Most `$ref` hops followed when locating a request body.
const MAX_REF_HOPS: usize = 32;

/// Bytes escaped when a JSON pointer is written as a URI fragment.
const FRAGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// Keywords whose values are instance data, not schemas.
const DATA_KEYWORDS: [&str; 5] = ["default", "example", "examples", "enum", "const"];

/// Keywords whose values map names to schemas.
const SCHEMA_MAPS: [&str; 5] = [
    "properties",
    "patternProperties",
    "schemas",
    "definitions",
    "$defs",
];

/// Property path, from the body root, of the discriminator field.
pub(crate) const DISCRIMINATOR_PATH: [&str; 2] = ["context", "action"];

/// HTTP methods searched for request bodies, in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `post`
    Post,
    /// `get`
    Get,
    /// `put`
    Put,
    /// `patch`
    Patch,
    /// `delete`
    Delete,
}

impl Method {
    /// Fixed order in which a path item's operations are searched.
    pub const TRAVERSAL_ORDER: [Method; 5] = [
        Method::Post,
        Method::Get,
        Method::Put,
        Method::Patch,
        Method::Delete,
    ];

    /// Key of this method in an OpenAPI path item.
    pub fn key(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Get => "get",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.key().to_ascii_uppercase())
    }
}

/// Every document reachable from the root, keyed by fragment-less URI.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    documents: HashMap<String, Value>,
}

impl DocumentSet {
    /// Add a document, preparing it for request validation.
    pub fn insert(&mut self, uri: &Url, mut document: Value) {
        prepare_for_requests(&mut document);
        self.documents.insert(document_key(uri), document);
    }

    /// Whether a document is already present.
    pub fn contains(&self, uri: &Url) -> bool {
        self.documents.contains_key(&document_key(uri))
    }

    /// Look up a document by URI. Any fragment is ignored.
    pub fn get(&self, uri: &Url) -> Option<&Value> {
        self.documents.get(&document_key(uri))
    }

    /// Number of documents held.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if no document is held.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Rewrite OpenAPI 3.0 schema keywords in every document.
    pub fn normalize_openapi30(&mut self) {
        for document in self.documents.values_mut() {
            normalize_openapi30(document, false);
        }
    }

    /// Resolve `reference` relative to `base`.
    ///
    /// Returns `None` when the target document is unknown or the fragment
    /// is not a JSON pointer into it.
    pub fn resolve<'a>(&'a self, base: &Url, reference: &str) -> Option<Located<'a>> {
        let target = base.join(reference).ok()?;
        let pointer = target
            .fragment()
            .map(percent_decode)
            .unwrap_or_default();
        let document = self.documents.get(&document_key(&target))?;
        let value = if pointer.is_empty() {
            document
        } else {
            document.pointer(&pointer)?
        };
        let mut base = target;
        base.set_fragment(None);
        Some(Located {
            base,
            pointer,
            value,
        })
    }

    /// Position of the root of the document at `uri`.
    pub fn root<'a>(&'a self, uri: &Url) -> Option<Located<'a>> {
        let value = self.get(uri)?;
        let mut base = uri.clone();
        base.set_fragment(None);
        Some(Located {
            base,
            pointer: String::new(),
            value,
        })
    }
}

/// Serves loaded documents to the structural validator.
struct DocumentRetriever {
    documents: Arc<DocumentSet>,
}

impl Retrieve for DocumentRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri_str = uri.as_str();
        let key = uri_str.split('#').next().unwrap_or(uri_str);
        self.documents
            .documents
            .get(key)
            .cloned()
            .ok_or_else(|| format!("document '{key}' was not loaded").into())
    }
}

/// A value inside one of the loaded documents, with its address.
#[derive(Debug, Clone)]
pub struct Located<'a> {
    /// URI of the containing document, without fragment.
    pub base: Url,
    /// JSON pointer of the value within that document.
    pub pointer: String,
    /// The value itself.
    pub value: &'a Value,
}

impl<'a> Located<'a> {
    /// Member `key` of an object value.
    pub fn child(&self, key: &str) -> Option<Located<'a>> {
        let value = self.value.get(key)?;
        Some(Located {
            base: self.base.clone(),
            pointer: format!("{}/{}", self.pointer, escape_pointer_segment(key)),
            value,
        })
    }

    /// Element `index` of an array value.
    pub fn item(&self, index: usize) -> Option<Located<'a>> {
        let value = self.value.get(index)?;
        Some(Located {
            base: self.base.clone(),
            pointer: format!("{}/{index}", self.pointer),
            value,
        })
    }

    /// The `$ref` string of this value, if it is a reference object.
    pub fn reference(&self) -> Option<&'a str> {
        self.value.get("$ref").and_then(Value::as_str)
    }

    /// Follow `$ref` chains until a non-reference value is reached.
    pub fn deref(self, documents: &'a DocumentSet) -> Option<Located<'a>> {
        let mut current = self;
        for _ in 0..MAX_REF_HOPS {
            match current.reference() {
                Some(reference) => current = documents.resolve(&current.base, reference)?,
                None => return Some(current),
            }
        }
        None
    }

    /// Absolute URI of this value.
    pub fn uri(&self) -> String {
        format!("{}#{}", self.base, encode_fragment(&self.pointer))
    }
}

/// One operation whose JSON request body can be validated.
pub struct Operation {
    path: String,
    method: Method,
    schema_uri: String,
    node: SchemaNode,
    validator: Validator,
}

impl Operation {
    /// Path key as declared in the document.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Absolute URI of the request-body schema.
    pub fn schema_uri(&self) -> &str {
        &self.schema_uri
    }

    /// Typed view of the schema along the discriminator path.
    pub fn node(&self) -> &SchemaNode {
        &self.node
    }

    /// Validate a decoded body, collecting every violation.
    pub fn validate(&self, instance: &Value) -> Result<(), ViolationTree> {
        let tree = ViolationTree::from_errors(self.validator.iter_errors(instance));
        if tree.is_empty() {
            Ok(())
        } else {
            Err(tree)
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("schema_uri", &self.schema_uri)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

/// A parsed, prepared, and compiled schema document.
#[derive(Debug)]
pub struct SchemaDocument {
    base_uri: Url,
    documents: Arc<DocumentSet>,
    operations: Vec<Operation>,
    findings: Vec<String>,
}

impl SchemaDocument {
    /// Build from the root document's URI and every loaded document.
    ///
    /// Operations are collected in path declaration order, and within a
    /// path in [`Method::TRAVERSAL_ORDER`]. Only operations with an
    /// `application/json` request-body schema are kept.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Parse`] if the root document is missing or not
    /// a mapping, and [`LoadError::Compile`] if any request-body schema
    /// cannot be compiled.
    pub fn build(base_uri: Url, mut documents: DocumentSet) -> Result<Self, LoadError> {
        if declares_openapi30(documents.get(&base_uri)) {
            documents.normalize_openapi30();
        }
        let documents = Arc::new(documents);
        let root = documents
            .root(&base_uri)
            .filter(|root| root.value.is_object())
            .ok_or_else(|| LoadError::Parse {
                location: base_uri.to_string(),
                reason: "document root must be a mapping".into(),
            })?;
        let findings = lint(root.value);

        let mut operations = Vec::new();
        if let Some(paths) = root.child("paths") {
            if let Some(entries) = paths.value.as_object() {
                for path in entries.keys() {
                    let Some(item) = paths.child(path).and_then(|i| i.deref(&documents)) else {
                        continue;
                    };
                    for method in Method::TRAVERSAL_ORDER {
                        let Some(schema) = request_body_schema(&item, method, &documents) else {
                            continue;
                        };
                        operations.push(compile_operation(path, method, schema, &documents)?);
                    }
                }
            }
        }

        Ok(Self {
            base_uri,
            documents,
            operations,
            findings,
        })
    }

    /// URI the root document was loaded from.
    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    /// The root document, prepared for request validation.
    pub fn root(&self) -> Option<&Value> {
        self.documents.get(&self.base_uri)
    }

    /// Number of documents loaded, including the root.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Operations in traversal order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Non-fatal structural findings about the document.
    pub fn findings(&self) -> &[String] {
        &self.findings
    }

    /// `info.title`, if declared.
    pub fn title(&self) -> Option<&str> {
        self.root()?.pointer("/info/title")?.as_str()
    }

    /// `info.version`, if declared.
    pub fn version(&self) -> Option<&str> {
        self.root()?.pointer("/info/version")?.as_str()
    }
}

fn request_body_schema<'a>(
    item: &Located<'a>,
    method: Method,
    documents: &'a DocumentSet,
) -> Option<Located<'a>> {
    let body = item
        .child(method.key())?
        .deref(documents)?
        .child("requestBody")?
        .deref(documents)?;
    body.child("content")?
        .child(JSON_MEDIA_TYPE)?
        .deref(documents)?
        .child("schema")
}

fn compile_operation(
    path: &str,
    method: Method,
    schema: Located<'_>,
    documents: &Arc<DocumentSet>,
) -> Result<Operation, LoadError> {
    let schema_uri = schema.uri();
    let node = SchemaNode::build(schema, &DISCRIMINATOR_PATH, documents);

    let mut opts = jsonschema::options();
    opts.with_draft(jsonschema::Draft::Draft202012);
    opts.should_validate_formats(true);
    opts.with_retriever(DocumentRetriever {
        documents: Arc::clone(documents),
    });
    let validator = opts
        .build(&json!({ "$ref": schema_uri }))
        .map_err(|e| LoadError::Compile {
            path: path.to_string(),
            method: method.to_string(),
            reason: e.to_string(),
        })?;

    Ok(Operation {
        path: path.to_string(),
        method,
        schema_uri,
        node,
        validator,
    })
}

/// Parse document bytes as JSON, falling back to YAML.
///
/// # Errors
///
/// Returns [`LoadError::Parse`] if the bytes are neither.
pub fn parse_document(bytes: &[u8], location: &str) -> Result<Value, LoadError> {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return Ok(value);
    }
    let yaml: serde_yaml::Value =
        serde_yaml::from_slice(bytes).map_err(|e| LoadError::Parse {
            location: location.to_string(),
            reason: format!("invalid JSON or YAML: {e}"),
        })?;
    yaml_to_json_value(&yaml).map_err(|reason| LoadError::Parse {
        location: location.to_string(),
        reason: format!("YAML-to-JSON conversion failed: {reason}"),
    })
}

/// Convert a `serde_yaml::Value` to a `serde_json::Value`, keeping mapping
/// order.
fn yaml_to_json_value(yaml: &serde_yaml::Value) -> Result<Value, String> {
    match yaml {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Number(serde_json::Number::from(i)))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::Number(serde_json::Number::from(u)))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("cannot represent float {f} in JSON"))
            } else {
                Err(format!("unsupported YAML number: {n:?}"))
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s.clone())),
        serde_yaml::Value::Sequence(seq) => {
            let items: Result<Vec<Value>, String> = seq.iter().map(yaml_to_json_value).collect();
            Ok(Value::Array(items?))
        }
        serde_yaml::Value::Mapping(map) => {
            let mut json_map = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported YAML map key type: {other:?}")),
                };
                json_map.insert(key, yaml_to_json_value(v)?);
            }
            Ok(Value::Object(json_map))
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json_value(&tagged.value),
    }
}

/// URIs of other documents referenced from `document`, in encounter order.
pub fn referenced_documents(document: &Value, base: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    collect_references(document, base, &mut seen, &mut out);
    out
}

fn collect_references(value: &Value, base: &Url, seen: &mut HashSet<String>, out: &mut Vec<Url>) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if !reference.starts_with('#') {
                    if let Ok(mut target) = base.join(reference) {
                        target.set_fragment(None);
                        if document_key(&target) != document_key(base)
                            && seen.insert(target.to_string())
                        {
                            out.push(target);
                        }
                    }
                }
            }
            for child in map.values() {
                collect_references(child, base, seen, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, base, seen, out);
            }
        }
        _ => {}
    }
}

/// Drop `readOnly` properties from every `required` list.
fn prepare_for_requests(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let read_only: Vec<String> = map
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| {
                    props
                        .iter()
                        .filter(|(_, schema)| {
                            schema.get("readOnly").and_then(Value::as_bool) == Some(true)
                        })
                        .map(|(name, _)| name.clone())
                        .collect()
                })
                .unwrap_or_default();
            if !read_only.is_empty() {
                if let Some(Value::Array(required)) = map.get_mut("required") {
                    required.retain(|r| {
                        r.as_str()
                            .map_or(true, |name| !read_only.iter().any(|ro| ro == name))
                    });
                }
            }
            for child in map.values_mut() {
                prepare_for_requests(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                prepare_for_requests(item);
            }
        }
        _ => {}
    }
}

fn declares_openapi30(root: Option<&Value>) -> bool {
    root.and_then(|r| r.get("openapi"))
        .and_then(Value::as_str)
        .is_some_and(|v| v == "3.0" || v.starts_with("3.0."))
}

/// Rewrite `nullable` and boolean exclusive bounds, recursively.
/// `names` is set when `value` maps names to schemas.
fn normalize_openapi30(value: &mut Value, names: bool) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if names {
                    normalize_openapi30(child, false);
                } else if !DATA_KEYWORDS.contains(&key.as_str()) {
                    normalize_openapi30(child, SCHEMA_MAPS.contains(&key.as_str()));
                }
            }
            if names {
                return;
            }
            convert_exclusive_bound(map, "exclusiveMinimum", "minimum");
            convert_exclusive_bound(map, "exclusiveMaximum", "maximum");
            if let Some(wrapped) = apply_nullable(map) {
                *value = wrapped;
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_openapi30(item, false);
            }
        }
        _ => {}
    }
}

fn convert_exclusive_bound(map: &mut Map<String, Value>, exclusive: &str, inclusive: &str) {
    match map.get(exclusive) {
        Some(Value::Bool(true)) => match map.shift_remove(inclusive) {
            Some(bound) => {
                map.insert(exclusive.to_string(), bound);
            }
            None => {
                map.shift_remove(exclusive);
            }
        },
        Some(Value::Bool(false)) => {
            map.shift_remove(exclusive);
        }
        _ => {}
    }
}

/// Returns a replacement when the schema must be wrapped in `anyOf`.
fn apply_nullable(map: &mut Map<String, Value>) -> Option<Value> {
    match map.get("nullable") {
        Some(Value::Bool(true)) => {}
        Some(Value::Bool(false)) => {
            map.shift_remove("nullable");
            return None;
        }
        _ => return None,
    }
    map.shift_remove("nullable");

    if let Some(Value::Array(values)) = map.get_mut("enum") {
        if !values.contains(&Value::Null) {
            values.push(Value::Null);
        }
    } else if let Some(value) = map.get("const").filter(|v| !v.is_null()).cloned() {
        map.shift_remove("const");
        map.insert("enum".to_string(), json!([value, null]));
    }

    if let Some(type_val) = map.get_mut("type") {
        match type_val {
            Value::String(ty) => {
                if ty != "null" {
                    *type_val = json!([ty.clone(), "null"]);
                }
            }
            Value::Array(types) => {
                if !types.iter().any(|t| t.as_str() == Some("null")) {
                    types.push(json!("null"));
                }
            }
            _ => {}
        }
        return None;
    }

    let rejects_null = ["$ref", "allOf", "anyOf", "oneOf", "not"]
        .iter()
        .any(|k| map.contains_key(*k));
    if !rejects_null {
        return None;
    }
    let original = Value::Object(std::mem::take(map));
    Some(json!({ "anyOf": [original, { "type": "null" }] }))
}

/// Structural checks a strict OpenAPI validator would make. Never fatal:
/// documents may lean on JSON Schema keywords a strict checker rejects.
pub fn lint(root: &Value) -> Vec<String> {
    let mut findings = Vec::new();

    match root.get("openapi").and_then(Value::as_str) {
        None => findings.push("missing 'openapi' version field".to_string()),
        Some(v) if !v.starts_with("3.") => {
            findings.push(format!("unsupported openapi version '{v}'"));
        }
        Some(_) => {}
    }

    match root.get("info") {
        Some(info) if info.is_object() => {
            for field in ["title", "version"] {
                if info.get(field).and_then(Value::as_str).is_none() {
                    findings.push(format!("info.{field} is missing"));
                }
            }
        }
        _ => findings.push("missing 'info' object".to_string()),
    }

    match root.get("paths").map(Value::as_object) {
        None => findings.push("missing 'paths' object".to_string()),
        Some(None) => findings.push("'paths' must be a mapping".to_string()),
        Some(Some(paths)) => {
            for (path, item) in paths {
                if !path.starts_with('/') {
                    findings.push(format!("path '{path}' must start with '/'"));
                }
                for method in Method::TRAVERSAL_ORDER {
                    let Some(content) = item
                        .get(method.key())
                        .and_then(|op| op.get("requestBody"))
                        .and_then(|body| body.get("content"))
                    else {
                        continue;
                    };
                    if content.as_object().map_or(true, serde_json::Map::is_empty) {
                        findings.push(format!(
                            "{method} {path}: requestBody.content declares no media type"
                        ));
                    }
                }
            }
        }
    }

    findings
}

fn document_key(uri: &Url) -> String {
    let mut key = uri.clone();
    key.set_fragment(None);
    key.to_string()
}

fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Percent-encode a JSON pointer for use as a URI fragment.
fn encode_fragment(pointer: &str) -> String {
    utf8_percent_encode(pointer, FRAGMENT).to_string()
}

fn percent_decode(fragment: &str) -> String {
    percent_decode_str(fragment).decode_utf8_lossy().into_owned()
}
