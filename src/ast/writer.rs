//! AST → YAML text
//!
//! Writes block style by default and honours each node's `Style`: quoted
//! scalars keep their quotes (and their source spelling until rewritten),
//! literal and folded scalars stay block scalars, flow collections stay on
//! one line. Anchors, aliases, tags and attached comments are written back.
//! Nested indentation follows the columns nodes were loaded from; new nodes
//! indent by two spaces.

use super::node::{Comments, Kind, NodeRef, Style};
use crate::error::{BindError, Result};

const MAX_DEPTH: usize = 512;
const INDENT: usize = 2;

/// Serialize a document (or any node as a document root) to YAML text
pub fn to_yaml_string(node: &NodeRef) -> Result<String> {
    let mut writer = Writer::default();
    if node.is_kind(Kind::Document) {
        writer.document(node)?;
    } else {
        writer.tail(node, Parent::Root, 0, None, 0)?;
    }
    Ok(writer.out)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Parent {
    Root,
    Key,
    Item,
}

#[derive(Default)]
struct Writer {
    out: String,
}

impl Writer {
    fn document(&mut self, document: &NodeRef) -> Result<()> {
        let (explicit, comments, content) = {
            let guard = document.read();
            (guard.explicit_start, guard.comments.clone(), guard.content.clone())
        };
        if explicit {
            self.out.push_str("---\n");
        }
        self.comment_lines(&comments.head, 0);
        if let Some(root) = content.first() {
            let line = root.comments().line;
            self.tail(root, Parent::Root, 0, line, 0)?;
        }
        self.comment_lines(&comments.foot, 0);
        Ok(())
    }

    /// Everything after `key:` or `-` through the end of the node
    fn tail(
        &mut self,
        node: &NodeRef,
        parent: Parent,
        indent: usize,
        comment: Option<String>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(BindError::DepthExceeded { depth });
        }
        let props = props(node);
        let sep = if parent == Parent::Root { "" } else { " " };

        if let Some(kind) = block_collection(node) {
            let child = child_indent(node, kind, parent, indent);
            if parent == Parent::Item && props.is_empty() && comment.is_none() {
                self.spaces(child - indent - 1);
                return self.collection(node, kind, child, true, depth + 1);
            }
            if !props.is_empty() {
                self.out.push_str(sep);
                self.out.push_str(&props);
            }
            self.line_comment(comment.as_deref());
            if parent != Parent::Root || !props.is_empty() || comment.is_some() {
                self.out.push('\n');
            }
            return self.collection(node, kind, child, false, depth + 1);
        }

        let (style, value) = {
            let guard = node.read();
            (guard.style, guard.value.clone())
        };
        if node.is_kind(Kind::Scalar) {
            if let Some(block) = block_style(&value, style) {
                self.out.push_str(sep);
                if !props.is_empty() {
                    self.out.push_str(&props);
                    self.out.push(' ');
                }
                self.block_scalar(&value, block, comment.as_deref(), indent + INDENT);
                return Ok(());
            }
        }

        let text = inline(node, false, false, depth)?;
        let text = join_props(&props, &text);
        if !text.is_empty() {
            self.out.push_str(sep);
            self.out.push_str(&text);
        }
        self.line_comment(comment.as_deref());
        self.out.push('\n');
        Ok(())
    }

    fn collection(&mut self, node: &NodeRef, kind: Kind, indent: usize, compact: bool, depth: usize) -> Result<()> {
        match kind {
            Kind::Mapping => self.entries(node, indent, compact, depth),
            _ => self.items(node, indent, compact, depth),
        }
    }

    fn entries(&mut self, node: &NodeRef, indent: usize, compact: bool, depth: usize) -> Result<()> {
        for (i, (key, value)) in node.pairs().into_iter().enumerate() {
            let Comments { head, line, .. } = key.comments();
            if !(compact && i == 0) {
                self.comment_lines(&head, indent);
                self.spaces(indent);
            }
            let text = inline(&key, false, true, depth)?;
            self.out.push_str(&join_props(&props(&key), &text));
            self.out.push(':');
            let comment = value.comments().line.or(line);
            self.tail(&value, Parent::Key, indent, comment, depth)?;
        }
        Ok(())
    }

    fn items(&mut self, node: &NodeRef, indent: usize, compact: bool, depth: usize) -> Result<()> {
        for (i, item) in node.content().into_iter().enumerate() {
            let Comments { head, line, .. } = item.comments();
            if !(compact && i == 0) {
                self.comment_lines(&head, indent);
                self.spaces(indent);
            }
            self.out.push('-');
            self.tail(&item, Parent::Item, indent, line, depth)?;
        }
        Ok(())
    }

    /// Header on the current line, content lines at `indent`
    fn block_scalar(&mut self, value: &str, style: Style, comment: Option<&str>, indent: usize) {
        let body = value.trim_end_matches('\n');
        let breaks = value.len() - body.len();
        self.out.push(if style == Style::Folded { '>' } else { '|' });
        match breaks {
            0 => self.out.push('-'),
            1 if !body.is_empty() => {}
            _ => self.out.push('+'),
        }
        self.line_comment(comment);
        self.out.push('\n');

        if !body.is_empty() {
            for (i, line) in body.split('\n').enumerate() {
                if style == Style::Folded && i > 0 {
                    // one empty line folds back into one newline
                    self.out.push('\n');
                    if line.is_empty() {
                        continue;
                    }
                }
                if line.is_empty() {
                    self.out.push('\n');
                } else {
                    self.spaces(indent);
                    self.out.push_str(line);
                    self.out.push('\n');
                }
            }
        }
        let kept = if body.is_empty() { breaks } else { breaks.saturating_sub(1) };
        if breaks > 1 || body.is_empty() {
            for _ in 0..kept {
                self.out.push('\n');
            }
        }
    }

    fn comment_lines(&mut self, lines: &[String], indent: usize) {
        for line in lines {
            if !line.is_empty() {
                self.spaces(indent);
                self.out.push_str(line);
            }
            self.out.push('\n');
        }
    }

    fn line_comment(&mut self, comment: Option<&str>) {
        if let Some(comment) = comment {
            self.out.push(' ');
            self.out.push_str(comment);
        }
    }

    fn spaces(&mut self, count: usize) {
        self.out.extend(std::iter::repeat(' ').take(count));
    }
}

/// Kind of a non-empty block-style collection
fn block_collection(node: &NodeRef) -> Option<Kind> {
    let guard = node.read();
    match guard.kind {
        Some(kind @ (Kind::Mapping | Kind::Sequence)) if guard.style != Style::Flow && !guard.content.is_empty() => {
            Some(kind)
        }
        _ => None,
    }
}

/// Indentation of a nested block collection, taken from its loaded column
/// when that still nests under `indent`
fn child_indent(node: &NodeRef, kind: Kind, parent: Parent, indent: usize) -> usize {
    let column = node.column();
    let hinted = column.checked_sub(1);
    match parent {
        Parent::Root => 0,
        Parent::Key if kind == Kind::Sequence && hinted == Some(indent) => indent,
        Parent::Key => match hinted {
            Some(hinted) if hinted > indent => hinted,
            _ => indent + INDENT,
        },
        Parent::Item => match hinted {
            Some(hinted) if hinted >= indent + INDENT => hinted,
            _ => indent + INDENT,
        },
    }
}

/// `&anchor !tag`, empty when the node has neither
fn props(node: &NodeRef) -> String {
    let guard = node.read();
    if guard.kind == Some(Kind::Alias) {
        return String::new();
    }
    let mut parts = Vec::new();
    if !guard.anchor.is_empty() {
        parts.push(format!("&{}", guard.anchor));
    }
    if !guard.tag.is_empty() {
        parts.push(if guard.tag.starts_with('!') {
            guard.tag.clone()
        } else {
            format!("!<{}>", guard.tag)
        });
    }
    parts.join(" ")
}

fn join_props(props: &str, text: &str) -> String {
    match (props.is_empty(), text.is_empty()) {
        (true, _) => text.to_string(),
        (false, true) => props.to_string(),
        (false, false) => format!("{} {}", props, text),
    }
}

/// Single-line rendering: scalars, aliases and flow collections
fn inline(node: &NodeRef, in_flow: bool, key: bool, depth: usize) -> Result<String> {
    if depth > MAX_DEPTH {
        return Err(BindError::DepthExceeded { depth });
    }
    match node.kind() {
        Some(Kind::Alias) => Ok(format!("*{}", alias_name(node))),
        Some(Kind::Mapping) => {
            let mut entries = Vec::new();
            for (k, v) in node.pairs() {
                let k = join_props(&props(&k), &inline(&k, true, true, depth + 1)?);
                let v = join_props(&props(&v), &inline(&v, true, false, depth + 1)?);
                entries.push(format!("{}: {}", k, v));
            }
            Ok(if entries.is_empty() {
                "{}".to_string()
            } else {
                format!("{{{}}}", entries.join(", "))
            })
        }
        Some(Kind::Sequence) => {
            let mut items = Vec::new();
            for item in node.content() {
                items.push(join_props(&props(&item), &inline(&item, true, false, depth + 1)?));
            }
            Ok(format!("[{}]", items.join(", ")))
        }
        Some(Kind::Scalar) => Ok(scalar_text(node, in_flow, key)),
        Some(Kind::Document) => match node.content().first() {
            Some(root) => inline(root, in_flow, key, depth + 1),
            None => Ok(String::new()),
        },
        None => Ok(String::new()),
    }
}

fn alias_name(node: &NodeRef) -> String {
    let guard = node.read();
    if !guard.value.is_empty() {
        return guard.value.clone();
    }
    guard.alias.as_ref().map(NodeRef::anchor).unwrap_or_default()
}

fn scalar_text(node: &NodeRef, in_flow: bool, key: bool) -> String {
    let guard = node.read();
    let value = guard.value.as_str();
    match guard.style {
        Style::SingleQuoted | Style::DoubleQuoted if guard.raw.is_some() => guard.raw.clone().unwrap_or_default(),
        Style::SingleQuoted if !value.chars().any(char::is_control) => single_quoted(value),
        Style::SingleQuoted | Style::DoubleQuoted | Style::Literal | Style::Folded => double_quoted(value),
        Style::Plain | Style::Flow => {
            if value.is_empty() {
                if in_flow || key { "~".to_string() } else { String::new() }
            } else if plain_safe(value, in_flow) {
                value.to_string()
            } else {
                double_quoted(value)
            }
        }
    }
}

/// Block style a scalar can be written in, `None` when it has to be quoted
fn block_style(value: &str, style: Style) -> Option<Style> {
    if !matches!(style, Style::Literal | Style::Folded) {
        return None;
    }
    if value.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return None;
    }
    let body = value.trim_end_matches('\n');
    if body.starts_with([' ', '\t']) {
        return None;
    }
    if style == Style::Folded && body.split('\n').any(|line| line.starts_with([' ', '\t'])) {
        return Some(Style::Literal);
    }
    Some(style)
}

fn plain_safe(value: &str, in_flow: bool) -> bool {
    let Some(first) = value.chars().next() else {
        return false;
    };
    if value.starts_with([' ', '\t']) || value.ends_with([' ', '\t', ':']) {
        return false;
    }
    if "&*!|>'\"%@`#,[]{}".contains(first) {
        return false;
    }
    if "-?:".contains(first) && value[1..].chars().next().map_or(true, |c| c == ' ') {
        return false;
    }
    if value.contains(": ") || value.contains(" #") || value.chars().any(|c| c.is_control() && c != '\t') {
        return false;
    }
    !(in_flow && value.contains([',', '[', ']', '{', '}']))
}

fn single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\x{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
