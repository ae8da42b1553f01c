//! Sample records and models
//!
//! Compiled for unit tests and, through the `test-fixtures` feature, for the
//! integration tests and benches. Shaped like a small OpenAPI document:
//! `info`, `tags`, and a `paths` record whose path items live in an
//! embedded map next to its extensions.

use serde::{Deserialize, Serialize};

use crate::extensions::{CoreExtensions, Extensions};
use crate::hooks::Plain;
use crate::record::RecordMeta;
use crate::sequenced_map::SequencedMap;
use crate::slot::Slot;
use crate::{model, record, string_enum};

/// Four required scalars, no extensions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimitiveCore {
    pub meta: RecordMeta,
    pub string_field: Slot<String>,
    pub bool_field: Slot<bool>,
    pub int_field: Slot<i64>,
    pub float_field: Slot<f64>,
}

record! {
    PrimitiveCore {
        string_field: "stringField",
        bool_field: "boolField",
        int_field: "intField",
        float_field: "floatField",
    }
}

#[derive(Debug, Clone, Default)]
pub struct Primitive {
    pub string_field: String,
    pub bool_field: bool,
    pub int_field: i32,
    pub float_field: f64,
    pub core: PrimitiveCore,
}

model! {
    Primitive => PrimitiveCore { string_field, bool_field, int_field, float_field }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaggedCore {
    pub meta: RecordMeta,
    pub name: Slot<String>,
    pub description: Slot<Option<String>>,
    pub aliases: Slot<Vec<String>>,
    pub priority: Slot<Option<i64>>,
    pub extensions: CoreExtensions,
}

record! {
    TaggedCore {
        name: "name",
        description: "description",
        aliases: "aliases",
        priority: "priority",
    }
    extensions: extensions;
}

#[derive(Debug, Clone, Default)]
pub struct Tagged {
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub priority: Option<i32>,
    pub extensions: Extensions,
    pub core: TaggedCore,
}

model! {
    Tagged => TaggedCore { name, description, aliases, priority }
    extensions: extensions;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoCore {
    pub meta: RecordMeta,
    pub title: Slot<String>,
    pub version: Slot<String>,
    pub summary: Slot<Option<String>>,
    pub contact: Slot<Option<Plain<Contact>>>,
    pub extensions: CoreExtensions,
}

record! {
    InfoCore {
        title: "title",
        version: "version",
        summary: "summary",
        contact: "contact",
    }
    extensions: extensions;
}

#[derive(Debug, Clone, Default)]
pub struct Info {
    pub title: String,
    pub version: String,
    pub summary: Option<String>,
    pub contact: Option<Plain<Contact>>,
    pub extensions: Extensions,
    pub core: InfoCore,
}

model! {
    Info => InfoCore { title, version, summary, contact }
    extensions: extensions;
}

string_enum! {
    pub enum Method {
        #[default]
        Get => "get",
        Put => "put",
        Post => "post",
        Delete => "delete",
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathItemCore {
    pub meta: RecordMeta,
    pub summary: Slot<Option<String>>,
    pub methods: Slot<Vec<String>>,
    pub responses: Slot<SequencedMap<String, String>>,
    pub extensions: CoreExtensions,
}

record! {
    PathItemCore {
        summary: "summary",
        methods: "methods",
        responses: "responses",
    }
    extensions: extensions;
}

#[derive(Debug, Clone, Default)]
pub struct PathItem {
    pub summary: Option<String>,
    pub methods: Vec<Method>,
    /// Status code → description
    pub responses: SequencedMap<i64, String>,
    pub extensions: Extensions,
    pub core: PathItemCore,
}

model! {
    PathItem => PathItemCore { summary, methods, responses }
    extensions: extensions;
}

/// Path items keyed by path template, plus `x-` extensions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathsCore {
    pub meta: RecordMeta,
    pub items: SequencedMap<String, PathItemCore>,
    pub extensions: CoreExtensions,
}

record! {
    PathsCore {}
    extensions: extensions;
    embedded: items;
}

#[derive(Debug, Clone, Default)]
pub struct Paths {
    pub items: SequencedMap<String, PathItem>,
    pub extensions: Extensions,
    pub core: PathsCore,
}

model! {
    Paths => PathsCore {}
    extensions: extensions;
    embedded: items;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentCore {
    pub meta: RecordMeta,
    pub openapi: Slot<String>,
    pub info: Slot<InfoCore>,
    pub tags: Slot<Vec<TaggedCore>>,
    pub paths: Slot<Option<PathsCore>>,
    pub extensions: CoreExtensions,
}

record! {
    DocumentCore {
        openapi: "openapi",
        info: "info",
        tags: "tags",
        paths: "paths",
    }
    extensions: extensions;
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub openapi: String,
    pub info: Info,
    pub tags: Vec<Tagged>,
    pub paths: Option<Paths>,
    pub extensions: Extensions,
    pub core: DocumentCore,
}

model! {
    Document => DocumentCore { openapi, info, tags, paths }
    extensions: extensions;
}

/// A valid document exercising every fixture type
pub const SAMPLE_DOCUMENT: &str = r#"openapi: 3.1.0
info:
  title: 'Pet Store'
  version: "1.0"
  contact:
    name: API team
    email: api@example.com
  x-audience: internal
tags:
  - name: pets
    description: Everything about pets
    aliases: [animals]
  - name: store
    priority: 2
paths:
  /pets:
    summary: All pets
    methods: [get, post]
    responses:
      200: ok
      404: not found
  /pets/{id}:
    methods: [get, delete]
  x-paths-owner: platform
x-generated: true
"#;
