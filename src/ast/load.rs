//! Text → AST loading
//!
//! Builds the node tree from the libyaml event stream. Every node gets its
//! start mark as position, scalars keep their style and source spelling,
//! anchors and aliases stay linked instead of being expanded, and duplicate
//! mapping keys survive. Full-line comments and blank lines are attached to
//! the mapping key or sequence item below them; `# ...` at the end of a line
//! is attached to the scalar or flow collection it follows.

use rustc_hash::FxHashMap;

use super::node::{Kind, Node, NodeRef, Style};
use super::parser::{CollectionStart, Event, EventKind, Mark, Parser, ScalarEvent};
use crate::error::{BindError, Result};

const CORE_TAG_PREFIX: &str = "tag:yaml.org,2002:";

/// Load a single YAML (or JSON) document into a `Document` node
///
/// Empty input yields a document without a root.
pub fn load_str(text: &str) -> Result<NodeRef> {
    Builder::new(text).run()
}

pub fn load_slice(bytes: &[u8]) -> Result<NodeRef> {
    let text = std::str::from_utf8(bytes).map_err(|e| BindError::Structural {
        reason: format!("document is not valid UTF-8: {}", e),
    })?;
    load_str(text)
}

/// `tag:yaml.org,2002:int` → `!!int`; local and verbatim tags unchanged
fn short_tag(tag: Option<String>) -> String {
    match tag {
        Some(tag) => match tag.strip_prefix(CORE_TAG_PREFIX) {
            Some(suffix) => format!("!!{}", suffix),
            None => tag,
        },
        None => String::new(),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Root,
    Key,
    Value,
    Item,
}

struct Frame {
    node: NodeRef,
    flow: bool,
    mapping: bool,
    /// Mapping only: the next child is a key
    expect_key: bool,
}

struct Builder<'a> {
    text: &'a str,
    lines: Vec<&'a str>,
    /// Lines already owned by a node (content, or comments handed out)
    claimed: Vec<bool>,
    anchors: FxHashMap<String, NodeRef>,
    stack: Vec<Frame>,
    document: Option<NodeRef>,
    documents: usize,
}

impl<'a> Builder<'a> {
    fn new(text: &'a str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let claimed = vec![false; lines.len()];
        Self {
            text,
            lines,
            claimed,
            anchors: FxHashMap::default(),
            stack: Vec::new(),
            document: None,
            documents: 0,
        }
    }

    fn run(mut self) -> Result<NodeRef> {
        let mut parser = Parser::new(self.text.as_bytes())?;
        loop {
            let event = parser.next_event()?;
            if matches!(event.kind, EventKind::StreamEnd) {
                break;
            }
            self.handle(event)?;
        }

        let document = match self.document.take() {
            Some(document) => document,
            None => NodeRef::new(Node {
                kind: Some(Kind::Document),
                ..Node::default()
            }),
        };
        self.attach_document_comments(&document);
        Ok(document)
    }

    fn handle(&mut self, event: Event) -> Result<()> {
        let Event { kind, start, end } = event;
        match kind {
            EventKind::StreamStart | EventKind::DocumentEnd => {}
            EventKind::DocumentStart { explicit } => {
                self.documents += 1;
                if self.documents > 1 {
                    return Err(BindError::Syntax {
                        problem: "expected a single document in the stream".to_string(),
                        line: start.line + 1,
                        column: start.column + 1,
                    });
                }
                let document = NodeRef::new(Node {
                    kind: Some(Kind::Document),
                    explicit_start: explicit,
                    ..Node::default()
                })
                .at(start.line + 1, start.column + 1);
                if explicit {
                    self.claim(start.line);
                }
                self.document = Some(document);
            }
            EventKind::Scalar(scalar) => {
                let node = self.scalar_node(scalar, start, end);
                let role = self.attach(&node, start)?;
                // a block scalar ends where the next token starts
                let block = matches!(node.style(), Style::Literal | Style::Folded);
                let last = if block && end.line > start.line { end.line - 1 } else { end.line };
                for line in start.line..=last {
                    self.claim(line);
                }
                if role != Role::Root && !block && !self.in_flow() {
                    self.trailing_comment(&node, end, role == Role::Key);
                }
            }
            EventKind::Alias(name) => {
                let target = self.anchors.get(&name).cloned().ok_or_else(|| BindError::Syntax {
                    problem: format!("unknown anchor '{}'", name),
                    line: start.line + 1,
                    column: start.column + 1,
                })?;
                let node = NodeRef::alias(&target).at(start.line + 1, start.column + 1);
                let role = self.attach(&node, start)?;
                self.claim(start.line);
                if !self.in_flow() {
                    self.trailing_comment(&node, end, role == Role::Key);
                }
            }
            EventKind::SequenceStart(open) => self.open(Kind::Sequence, open, start, end)?,
            EventKind::MappingStart(open) => self.open(Kind::Mapping, open, start, end)?,
            EventKind::SequenceEnd | EventKind::MappingEnd => {
                if let Some(frame) = self.stack.pop() {
                    if frame.flow && !self.in_flow() {
                        self.trailing_comment(&frame.node, end, false);
                    }
                }
            }
            EventKind::StreamEnd => {}
        }
        Ok(())
    }

    fn scalar_node(&mut self, scalar: ScalarEvent, start: Mark, end: Mark) -> NodeRef {
        let ScalarEvent {
            anchor,
            tag,
            value,
            style,
        } = scalar;
        let raw = if style.is_quoted() && start.line == end.line {
            let quote = if style == Style::SingleQuoted { '\'' } else { '"' };
            self.text
                .get(start.index..end.index)
                .and_then(|source| source.find(quote).map(|i| source[i..].to_string()))
        } else {
            None
        };
        let node = NodeRef::new(Node {
            kind: Some(Kind::Scalar),
            style,
            tag: short_tag(tag),
            value,
            anchor: anchor.clone().unwrap_or_default(),
            raw,
            ..Node::default()
        })
        .at(start.line + 1, start.column + 1);
        if let Some(anchor) = anchor {
            self.anchors.insert(anchor, node.clone());
        }
        node
    }

    fn open(&mut self, kind: Kind, open: CollectionStart, start: Mark, end: Mark) -> Result<()> {
        let CollectionStart { anchor, tag, flow } = open;
        // a block collection with properties starts at its first key or dash
        let mut at = if !flow && (anchor.is_some() || tag.is_some()) { end } else { start };
        if kind == Kind::Sequence && !flow && at.index > 0 && self.text.as_bytes().get(at.index - 1) == Some(&b'-') {
            at.index -= 1;
            at.column = at.column.saturating_sub(1);
        }
        let node = NodeRef::new(Node {
            kind: Some(kind),
            style: if flow { Style::Flow } else { Style::Plain },
            tag: short_tag(tag),
            anchor: anchor.clone().unwrap_or_default(),
            ..Node::default()
        })
        .at(at.line + 1, at.column + 1);
        if let Some(anchor) = anchor {
            self.anchors.insert(anchor, node.clone());
        }
        self.attach(&node, start)?;
        self.claim(start.line);
        self.claim(at.line);
        self.stack.push(Frame {
            node,
            flow,
            mapping: kind == Kind::Mapping,
            expect_key: true,
        });
        Ok(())
    }

    fn in_flow(&self) -> bool {
        self.stack.last().map_or(false, |frame| frame.flow)
    }

    /// Add `node` to its parent and hand it the comments above it
    fn attach(&mut self, node: &NodeRef, start: Mark) -> Result<Role> {
        let (role, flow) = match self.stack.last_mut() {
            Some(frame) if frame.mapping => {
                let role = if frame.expect_key { Role::Key } else { Role::Value };
                frame.expect_key = !frame.expect_key;
                frame.node.write().content.push(node.clone());
                (role, frame.flow)
            }
            Some(frame) => {
                frame.node.write().content.push(node.clone());
                (Role::Item, frame.flow)
            }
            None => {
                let document = self.document.as_ref().ok_or_else(|| {
                    BindError::structural("node outside of a document")
                })?;
                document.write().content.push(node.clone());
                (Role::Root, false)
            }
        };
        if !flow && matches!(role, Role::Key | Role::Item) {
            let head = self.head_lines(start.line);
            if !head.is_empty() {
                node.write().comments.head = head;
            }
        }
        Ok(role)
    }

    fn is_trivia(line: &str) -> bool {
        let trimmed = line.trim_start();
        trimmed.is_empty() || trimmed.starts_with('#')
    }

    /// Unclaimed comment and blank lines directly above `line`
    fn head_lines(&mut self, line: usize) -> Vec<String> {
        let mut first = line;
        while first > 0 && !self.claimed[first - 1] && Self::is_trivia(self.lines[first - 1]) {
            first -= 1;
        }
        let mut head = Vec::with_capacity(line - first);
        for index in first..line {
            self.claimed[index] = true;
            head.push(self.lines[index].trim().to_string());
        }
        head
    }

    fn claim(&mut self, line: usize) {
        if let Some(claimed) = self.claimed.get_mut(line) {
            *claimed = true;
        }
    }

    /// `# ...` after `end` on the same line; keys may be followed by `:`
    fn trailing_comment(&mut self, node: &NodeRef, end: Mark, key: bool) {
        let Some(rest) = self.text.get(end.index..) else {
            return;
        };
        let rest = rest.split('\n').next().unwrap_or_default();
        let mut rest = rest.trim_start();
        if key {
            match rest.strip_prefix(':') {
                Some(after) => rest = after.trim_start(),
                None => return,
            }
        }
        if rest.starts_with('#') {
            node.write().comments.line = Some(rest.trim_end().to_string());
        }
    }

    /// Leftover lines before the root become the document's head, lines
    /// after the last node its foot
    fn attach_document_comments(&mut self, document: &NodeRef) {
        let first_content = self.claimed.iter().position(|c| *c).unwrap_or(self.lines.len());
        let head: Vec<String> = (0..first_content)
            .filter(|i| !self.claimed[*i] && Self::is_trivia(self.lines[*i]))
            .map(|i| self.lines[i].trim().to_string())
            .collect();

        let mut foot_start = self.lines.len();
        while foot_start > first_content
            && !self.claimed[foot_start - 1]
            && Self::is_trivia(self.lines[foot_start - 1])
        {
            foot_start -= 1;
        }
        let mut foot: Vec<String> = (foot_start..self.lines.len())
            .map(|i| self.lines[i].trim().to_string())
            .collect();
        while foot.last().map_or(false, String::is_empty) {
            foot.pop();
        }

        let mut guard = document.write();
        guard.comments.head = head;
        guard.comments.foot = foot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Tag;

    fn root(text: &str) -> NodeRef {
        load_str(text).unwrap().content()[0].clone()
    }

    #[test]
    fn load_keeps_duplicate_keys() {
        let root = root("a: 1\nb: 2\na: 3\n");

        let keys: Vec<String> = root.pairs().iter().map(|(k, _)| k.value()).collect();
        assert_eq!(keys, vec!["a", "b", "a"]);
    }

    #[test]
    fn load_takes_positions_from_marks() {
        let root = root("name: demo\nnested:\n  inner: true\n");
        let pairs = root.pairs();

        assert_eq!((pairs[0].0.line(), pairs[0].0.column()), (1, 1));
        assert_eq!((pairs[0].1.line(), pairs[0].1.column()), (1, 7));
        assert_eq!(pairs[1].0.line(), 2);
        let (inner_key, inner_value) = pairs[1].1.pairs()[0].clone();
        assert_eq!((inner_key.line(), inner_key.column()), (3, 3));
        assert_eq!((inner_value.line(), inner_value.column()), (3, 10));
        assert_eq!((pairs[1].1.line(), pairs[1].1.column()), (3, 3));
    }

    #[test]
    fn positions_ignore_matching_text_in_comments() {
        let root = root("# the name comes first\nname: a\nother: name\n");
        let (key, _) = root.get("name").unwrap();
        assert_eq!((key.line(), key.column()), (2, 1));
        assert_eq!((root.line(), root.column()), (2, 1));
    }

    #[test]
    fn scalars_keep_style_and_spelling() {
        let root = root("title: 'Old'\nversion: \"1.0\"\ncount: 0x1F\nratio: 1.50\nbody: |\n  line\n");

        assert_eq!(root.get("title").unwrap().1.style(), Style::SingleQuoted);
        assert_eq!(root.get("version").unwrap().1.resolved_tag(), Tag::Str);
        assert_eq!(root.get("count").unwrap().1.value(), "0x1F");
        assert_eq!(root.get("count").unwrap().1.resolved_tag(), Tag::Int);
        assert_eq!(root.get("ratio").unwrap().1.value(), "1.50");
        let body = root.get("body").unwrap().1;
        assert_eq!(body.style(), Style::Literal);
        assert_eq!(body.value(), "line\n");
    }

    #[test]
    fn anchors_and_aliases_stay_linked() {
        let root = root("base: &shared\n  k: v\ncopy: *shared\n");
        let base = root.get("base").unwrap().1;
        let copy = root.get("copy").unwrap().1;

        assert_eq!(base.anchor(), "shared");
        assert!(copy.is_kind(Kind::Alias));
        assert!(copy.resolve().ptr_eq(&base));
        assert_eq!(copy.line(), 3);
    }

    #[test]
    fn unknown_alias_is_a_syntax_error() {
        let err = load_str("a: *missing\n").unwrap_err();
        assert!(matches!(err, BindError::Syntax { line: 1, .. }));
    }

    #[test]
    fn core_tags_are_shortened() {
        let root = root("a: !!int 7\nb: !custom x\n");
        assert_eq!(root.get("a").unwrap().1.tag(), "!!int");
        assert_eq!(root.get("b").unwrap().1.tag(), "!custom");
    }

    #[test]
    fn comments_attach_to_the_following_entry() {
        let document = load_str("# top\nname: a # trailing\n\n# about tags\ntags:\n  # first\n  - x\n# end\n").unwrap();
        let root = document.content()[0].clone();
        let pairs = root.pairs();

        assert_eq!(pairs[0].0.comments().head, vec!["# top"]);
        assert_eq!(pairs[0].1.comments().line.as_deref(), Some("# trailing"));
        assert_eq!(pairs[1].0.comments().head, vec!["", "# about tags"]);
        assert_eq!(pairs[1].1.content()[0].comments().head, vec!["# first"]);
        assert_eq!(document.comments().foot, vec!["# end"]);
    }

    #[test]
    fn block_scalar_lines_are_not_comments() {
        let root = root("text: |\n  # not a comment\nnext: 1\n");
        assert!(root.get("next").unwrap().0.comments().head.is_empty());
        assert_eq!(root.get("text").unwrap().1.value(), "# not a comment\n");
    }

    #[test]
    fn load_empty_text_yields_empty_document() {
        let doc = load_str("   \n").unwrap();
        assert!(doc.is_kind(Kind::Document));
        assert!(doc.is_empty());
    }

    #[test]
    fn load_reports_syntax_errors() {
        assert!(matches!(load_str("a: [1, 2"), Err(BindError::Syntax { .. })));
    }

    #[test]
    fn multiple_documents_are_rejected() {
        assert!(load_str("a: 1\n---\nb: 2\n").is_err());
    }
}
