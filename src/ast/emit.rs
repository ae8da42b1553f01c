//! AST ⇄ `serde_yaml::Value`
//!
//! Used where a value crosses into serde (plain structs, extensions, CLI
//! input). Node styles and comments are not representable there; structure,
//! key order, tags and the distinction between `{}` and an absent value are.

use serde_yaml::value::{Tag as YamlTag, TaggedValue};
use serde_yaml::{Mapping, Number, Value};

use super::node::{Kind, NodeRef, Style};
use super::scalar::{self, Tag};
use crate::error::{BindError, Result};

/// Convert a node (following aliases) into a `serde_yaml::Value`
///
/// Duplicate mapping keys collapse to the last occurrence.
pub fn to_value(node: &NodeRef) -> Result<Value> {
    to_value_at(node, 0)
}

fn to_value_at(node: &NodeRef, depth: usize) -> Result<Value> {
    if depth > 512 {
        return Err(BindError::DepthExceeded { depth });
    }
    let node = node.resolve();
    match node.kind() {
        Some(Kind::Document) => match node.content().first() {
            Some(root) => to_value_at(root, depth + 1),
            None => Ok(Value::Null),
        },
        Some(Kind::Mapping) => {
            let mut mapping = Mapping::new();
            for (key, value) in node.pairs() {
                mapping.insert(to_value_at(&key, depth + 1)?, to_value_at(&value, depth + 1)?);
            }
            Ok(Value::Mapping(mapping))
        }
        Some(Kind::Sequence) => node
            .content()
            .iter()
            .map(|item| to_value_at(item, depth + 1))
            .collect::<Result<Vec<_>>>()
            .map(Value::Sequence),
        Some(Kind::Scalar) => scalar_value(&node),
        Some(Kind::Alias) | None => Ok(Value::Null),
    }
}

fn scalar_value(node: &NodeRef) -> Result<Value> {
    let text = node.value();
    let malformed = |tag: &Tag| BindError::MalformedScalar {
        tag: tag.as_str().to_string(),
        value: text.clone(),
        line: node.line(),
        column: node.column(),
    };
    let tag = node.resolved_tag();
    Ok(match &tag {
        Tag::Null => Value::Null,
        Tag::Bool => Value::Bool(scalar::parse_bool(&text).ok_or_else(|| malformed(&tag))?),
        Tag::Int => {
            let int = scalar::parse_int(&text).ok_or_else(|| malformed(&tag))?;
            if let Ok(v) = i64::try_from(int) {
                Value::Number(Number::from(v))
            } else if let Ok(v) = u64::try_from(int) {
                Value::Number(Number::from(v))
            } else {
                Value::String(text)
            }
        }
        Tag::Float => Value::Number(Number::from(
            scalar::parse_float(&text).ok_or_else(|| malformed(&tag))?,
        )),
        Tag::Str => Value::String(text),
        Tag::Custom(custom) => Value::Tagged(Box::new(TaggedValue {
            tag: YamlTag::new(custom.trim_start_matches('!')),
            value: Value::String(text),
        })),
    })
}

/// Build a fresh node tree from a `serde_yaml::Value`
pub fn from_value(value: &Value) -> NodeRef {
    match value {
        Value::Null => NodeRef::null(),
        Value::Bool(b) => NodeRef::scalar(b.to_string()),
        Value::Number(n) => {
            if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
                NodeRef::scalar(scalar::format_float(f))
            } else {
                NodeRef::scalar(n.to_string())
            }
        }
        Value::String(s) => NodeRef::string(s.as_str()),
        Value::Sequence(items) => NodeRef::sequence(items.iter().map(from_value)),
        Value::Mapping(mapping) => {
            NodeRef::mapping_nodes(mapping.iter().map(|(k, v)| (from_value(k), from_value(v))))
        }
        Value::Tagged(tagged) => {
            let node = from_value(&tagged.value);
            let tag = tagged.tag.to_string();
            let tag = if tag.starts_with('!') { tag } else { format!("!{}", tag) };
            node.with_tag(tag)
        }
    }
}

/// Structural equality (kinds, resolved scalar values, order); ignores
/// positions and styles
pub fn same_shape(a: &NodeRef, b: &NodeRef) -> bool {
    let (a, b) = (a.resolve(), b.resolve());
    if a.kind() != b.kind() {
        return false;
    }
    match a.kind() {
        Some(Kind::Scalar) => a.resolved_tag() == b.resolved_tag() && a.value() == b.value(),
        _ => {
            let (ac, bc) = (a.content(), b.content());
            ac.len() == bc.len() && ac.iter().zip(bc.iter()).all(|(x, y)| same_shape(x, y))
        }
    }
}

/// Style a freshly built collection the way an empty literal would be written
pub(crate) fn empty_mapping() -> NodeRef {
    NodeRef::mapping(Vec::<(String, NodeRef)>::new()).with_style(Style::Flow)
}
