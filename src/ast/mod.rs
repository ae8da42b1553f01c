//! Document AST
//!
//! Contains the in-memory YAML/JSON node tree that records bind to:
//! - `node`: `NodeRef` handle, `Node` payload, `Kind`, `Style`, mapping splicing
//! - `scalar`: core-schema tag resolution and scalar text helpers
//! - `parser`: libyaml event stream with marks and styles
//! - `load`: text → AST (duplicate keys, anchors, comments, positions kept)
//! - `writer`: AST → text, honouring styles and comments
//! - `emit`: AST ⇄ `serde_yaml::Value` for serde-backed values

mod emit;
mod load;
mod node;
mod parser;
pub mod scalar;
mod writer;

pub use emit::{from_value, same_shape, to_value};
pub(crate) use emit::empty_mapping;
pub use load::{load_slice, load_str};
pub use node::{Comments, Kind, Node, NodeRef, Style};
pub use scalar::Tag;
pub use writer::to_yaml_string;
