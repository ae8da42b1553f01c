//! Shared, mutable document nodes
//!
//! A `NodeRef` is a cheap handle onto a node that may be referenced from
//! several places at once (a record's root, a slot's value, a parent's
//! content list). Identity is pointer identity: two handles are "the same
//! node" iff `NodeRef::ptr_eq` holds, and sync mutates nodes in place so
//! that identity survives edits.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::scalar::{self, Tag};

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Document,
    Mapping,
    Sequence,
    Scalar,
    Alias,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Document => write!(f, "document"),
            Kind::Mapping => write!(f, "mapping"),
            Kind::Sequence => write!(f, "sequence"),
            Kind::Scalar => write!(f, "scalar"),
            Kind::Alias => write!(f, "alias"),
        }
    }
}

/// Presentation style, preserved across sync updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
    /// Flow collection (`{a: 1}` / `[1, 2]`)
    Flow,
}

impl Style {
    pub fn is_quoted(self) -> bool {
        matches!(self, Style::SingleQuoted | Style::DoubleQuoted)
    }
}

/// Comment and blank lines attached to a node
///
/// Head lines sit above a mapping key or sequence item; the line comment
/// follows the node on its own line. Lines are stored unindented, blank
/// lines as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comments {
    pub head: Vec<String>,
    pub line: Option<String>,
    /// Trailing lines of a document
    pub foot: Vec<String>,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.line.is_none() && self.foot.is_empty()
    }
}

/// Node payload
#[derive(Clone, Default)]
pub struct Node {
    pub kind: Option<Kind>,
    pub style: Style,
    /// Explicit tag (`!!str`, `!custom`); empty when implicit
    pub tag: String,
    pub value: String,
    pub anchor: String,
    pub alias: Option<NodeRef>,
    /// Mapping: alternating key/value nodes. Sequence/Document: items.
    pub content: Vec<NodeRef>,
    /// 1-based; 0 when unknown
    pub line: usize,
    pub column: usize,
    /// Source spelling of a quoted scalar; cleared on the first write
    pub raw: Option<String>,
    pub comments: Comments,
    /// Document opened with an explicit `---`
    pub explicit_start: bool,
}

/// Shared handle to a [`Node`]
#[derive(Clone)]
pub struct NodeRef(Arc<RwLock<Node>>);

impl NodeRef {
    pub fn new(node: Node) -> Self {
        Self(Arc::new(RwLock::new(node)))
    }

    fn of_kind(kind: Kind) -> Self {
        Self::new(Node {
            kind: Some(kind),
            ..Node::default()
        })
    }

    /// Plain scalar; style is left as given, tag implicit
    pub fn scalar(value: impl Into<String>) -> Self {
        let node = Self::of_kind(Kind::Scalar);
        node.write().value = value.into();
        node
    }

    /// Scalar holding a string, quoted when the plain form would resolve to
    /// another type (`"true"`, `"42"`, `""`)
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        let node = Self::scalar(value);
        let needs_quotes = scalar::needs_quotes(&node.read().value);
        if needs_quotes {
            node.write().style = Style::DoubleQuoted;
        }
        node
    }

    pub fn null() -> Self {
        Self::scalar("null")
    }

    /// Mapping from key/value pairs, keys given as plain strings
    pub fn mapping<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, NodeRef)>,
    {
        let node = Self::of_kind(Kind::Mapping);
        {
            let mut guard = node.write();
            for (key, value) in pairs {
                guard.content.push(NodeRef::string(key));
                guard.content.push(value);
            }
        }
        node
    }

    /// Mapping from explicit key/value nodes (allows duplicate keys)
    pub fn mapping_nodes<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NodeRef, NodeRef)>,
    {
        let node = Self::of_kind(Kind::Mapping);
        {
            let mut guard = node.write();
            for (key, value) in pairs {
                guard.content.push(key);
                guard.content.push(value);
            }
        }
        node
    }

    pub fn sequence<I>(items: I) -> Self
    where
        I: IntoIterator<Item = NodeRef>,
    {
        let node = Self::of_kind(Kind::Sequence);
        node.write().content = items.into_iter().collect();
        node
    }

    pub fn document(root: NodeRef) -> Self {
        let node = Self::of_kind(Kind::Document);
        {
            let mut guard = node.write();
            guard.line = root.line();
            guard.column = root.column();
            guard.content.push(root);
        }
        node
    }

    /// Alias (`*anchor`) pointing at `target`
    pub fn alias(target: &NodeRef) -> Self {
        let node = Self::of_kind(Kind::Alias);
        {
            let mut guard = node.write();
            guard.value = target.anchor();
            guard.alias = Some(target.clone());
        }
        node
    }

    pub fn at(self, line: usize, column: usize) -> Self {
        {
            let mut guard = self.write();
            guard.line = line;
            guard.column = column;
        }
        self
    }

    pub fn with_style(self, style: Style) -> Self {
        {
            let mut guard = self.write();
            guard.style = style;
            guard.raw = None;
        }
        self
    }

    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        self.write().tag = tag.into();
        self
    }

    pub fn with_anchor(self, anchor: impl Into<String>) -> Self {
        self.write().anchor = anchor.into();
        self
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Node> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Node> {
        self.0.write()
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity key, stable for the lifetime of the node
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn kind(&self) -> Option<Kind> {
        self.read().kind
    }

    pub fn is_kind(&self, kind: Kind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn value(&self) -> String {
        self.read().value.clone()
    }

    pub fn tag(&self) -> String {
        self.read().tag.clone()
    }

    pub fn style(&self) -> Style {
        self.read().style
    }

    pub fn anchor(&self) -> String {
        self.read().anchor.clone()
    }

    pub fn line(&self) -> usize {
        self.read().line
    }

    pub fn comments(&self) -> Comments {
        self.read().comments.clone()
    }

    pub fn column(&self) -> usize {
        self.read().column
    }

    pub fn content(&self) -> Vec<NodeRef> {
        self.read().content.clone()
    }

    pub fn len(&self) -> usize {
        self.read().content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().content.is_empty()
    }

    pub fn alias_target(&self) -> Option<NodeRef> {
        self.read().alias.clone()
    }

    /// Follow alias links to the anchored node
    ///
    /// Cyclic alias chains stop at the first repeated node.
    pub fn resolve(&self) -> NodeRef {
        let mut current = self.clone();
        let mut hops = 0usize;
        while let Some(target) = current.alias_target() {
            current = target;
            hops += 1;
            if hops > 64 || current.ptr_eq(self) {
                break;
            }
        }
        current
    }

    /// Tag after implicit resolution (`!!str`, `!!int`, ...)
    pub fn resolved_tag(&self) -> Tag {
        let guard = self.read();
        scalar::resolve(&guard.tag, &guard.value, guard.style)
    }

    /// Null scalar, explicit or implicit
    pub fn is_null(&self) -> bool {
        self.is_kind(Kind::Scalar) && self.resolved_tag() == Tag::Null
    }

    /// Key/value pairs of a mapping node (empty for other kinds)
    pub fn pairs(&self) -> Vec<(NodeRef, NodeRef)> {
        let guard = self.read();
        if guard.kind != Some(Kind::Mapping) {
            return Vec::new();
        }
        guard
            .content
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }

    /// Last entry whose key text equals `key` (last occurrence wins)
    pub fn get(&self, key: &str) -> Option<(NodeRef, NodeRef)> {
        self.pairs()
            .into_iter()
            .rev()
            .find(|(k, _)| k.resolve().value() == key)
    }

    /// Replace the value for `key` in place, or append a new entry
    ///
    /// An existing key node is reused so its style and position survive;
    /// returns the key node.
    pub fn upsert(&self, key: &str, value: NodeRef) -> NodeRef {
        let mut guard = self.write();
        let position = (0..guard.content.len() / 2)
            .rev()
            .find(|i| guard.content[i * 2].resolve().value() == key);
        match position {
            Some(i) => {
                if !guard.content[i * 2 + 1].ptr_eq(&value) {
                    guard.content[i * 2 + 1] = value;
                }
                guard.content[i * 2].clone()
            }
            None => {
                let key_node = NodeRef::string(key);
                guard.content.push(key_node.clone());
                guard.content.push(value);
                key_node
            }
        }
    }

    /// Put a key/value pair into a mapping
    ///
    /// The entry is located by key node identity first, then by key text;
    /// unmatched pairs are appended.
    pub fn splice(&self, key: &NodeRef, value: NodeRef) {
        let text = key.resolve().value();
        let mut guard = self.write();
        let count = guard.content.len() / 2;
        let position = (0..count)
            .find(|i| guard.content[i * 2].ptr_eq(key))
            .or_else(|| (0..count).rev().find(|i| guard.content[i * 2].resolve().value() == text));
        match position {
            Some(i) => {
                if !guard.content[i * 2].ptr_eq(key) {
                    guard.content[i * 2] = key.clone();
                }
                if !guard.content[i * 2 + 1].ptr_eq(&value) {
                    guard.content[i * 2 + 1] = value;
                }
            }
            None => {
                guard.content.push(key.clone());
                guard.content.push(value);
            }
        }
    }

    /// Remove every entry with key text `key`; true if anything was removed
    pub fn remove(&self, key: &str) -> bool {
        let mut guard = self.write();
        let before = guard.content.len();
        let content = std::mem::take(&mut guard.content);
        let mut kept = Vec::with_capacity(content.len());
        for pair in content.chunks(2) {
            if pair.len() == 2 && pair[0].resolve().value() == key {
                continue;
            }
            kept.extend(pair.iter().cloned());
        }
        guard.content = kept;
        guard.content.len() != before
    }

    /// Overwrite a scalar's value and tag, keeping style where it still fits
    pub fn set_scalar(&self, value: &str, tag: Tag) {
        let mut guard = self.write();
        guard.kind = Some(Kind::Scalar);
        guard.value = value.to_string();
        guard.raw = None;
        guard.alias = None;
        guard.content.clear();
        if !guard.tag.is_empty() {
            guard.tag = tag.as_str().to_string();
        }
        let fits = scalar::resolve("", value, guard.style) == tag;
        if !fits && tag == Tag::Str && !guard.style.is_quoted() {
            guard.style = Style::DoubleQuoted;
        } else if !fits && guard.style.is_quoted() {
            guard.style = Style::Plain;
        }
    }
}

/// Identity comparison: two handles are equal iff they share one node
impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for NodeRef {}

impl Default for NodeRef {
    fn default() -> Self {
        NodeRef::null()
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.read();
        match guard.kind {
            Some(Kind::Scalar) => write!(f, "Scalar({:?}@{}:{})", guard.value, guard.line, guard.column),
            Some(Kind::Alias) => write!(f, "Alias(*{})", guard.value),
            Some(Kind::Mapping) => {
                let mut map = f.debug_map();
                for pair in guard.content.chunks(2) {
                    if let [k, v] = pair {
                        map.entry(k, v);
                    }
                }
                map.finish()
            }
            Some(Kind::Sequence) | Some(Kind::Document) => {
                f.debug_list().entries(guard.content.iter()).finish()
            }
            None => write!(f, "Empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_in_place() {
        let map = NodeRef::mapping([("a", NodeRef::scalar("1")), ("b", NodeRef::scalar("2"))]);
        let original_key = map.pairs()[0].0.clone();

        let key = map.upsert("a", NodeRef::scalar("9"));

        assert!(key.ptr_eq(&original_key));
        assert_eq!(map.get("a").unwrap().1.value(), "9");
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn upsert_appends_new_key() {
        let map = NodeRef::mapping([("a", NodeRef::scalar("1"))]);
        map.upsert("c", NodeRef::scalar("3"));

        let keys: Vec<String> = map.pairs().iter().map(|(k, _)| k.value()).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn splice_prefers_key_identity() {
        let map = NodeRef::mapping([("a", NodeRef::scalar("1")), ("b", NodeRef::scalar("2"))]);
        let key_b = map.pairs()[1].0.clone();

        map.splice(&key_b, NodeRef::scalar("20"));
        map.splice(&NodeRef::string("c"), NodeRef::scalar("3"));

        let pairs = map.pairs();
        assert_eq!(pairs.len(), 3);
        assert!(pairs[1].0.ptr_eq(&key_b));
        assert_eq!(pairs[1].1.value(), "20");
        assert_eq!(pairs[2].0.value(), "c");
    }

    #[test]
    fn remove_drops_all_occurrences() {
        let map = NodeRef::mapping_nodes([
            (NodeRef::scalar("a"), NodeRef::scalar("1")),
            (NodeRef::scalar("b"), NodeRef::scalar("2")),
            (NodeRef::scalar("a"), NodeRef::scalar("3")),
        ]);

        assert!(map.remove("a"));
        assert_eq!(map.pairs().len(), 1);
        assert!(!map.remove("missing"));
    }

    #[test]
    fn alias_resolves_to_anchor() {
        let anchored = NodeRef::scalar("shared").with_anchor("s");
        let alias = NodeRef::alias(&anchored);

        assert!(alias.resolve().ptr_eq(&anchored));
        assert_eq!(alias.value(), "s");
    }

    #[test]
    fn string_builder_quotes_ambiguous_values() {
        assert_eq!(NodeRef::string("true").style(), Style::DoubleQuoted);
        assert_eq!(NodeRef::string("42").style(), Style::DoubleQuoted);
        assert_eq!(NodeRef::string("hello").style(), Style::Plain);
    }

    #[test]
    fn set_scalar_keeps_quoted_style_for_strings() {
        let node = NodeRef::scalar("old").with_style(Style::SingleQuoted);
        node.set_scalar("new", Tag::Str);
        assert_eq!(node.style(), Style::SingleQuoted);
        assert_eq!(node.value(), "new");
    }
}
