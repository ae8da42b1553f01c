//! Minimal JSON Pointer (RFC 6901) over the document AST
//!
//! Supports:
//! - "" (whole document), "/a/b/0" (mapping keys and sequence indexes)
//! - `~0` / `~1` escapes
//!
//! Used for diagnostics only: [`locate`] turns a node back into the pointer
//! that reaches it, [`resolve`] follows a pointer down from the root.

use crate::ast::{Kind, NodeRef};
use crate::error::{BindError, Result};

/// Split a pointer into unescaped reference tokens
///
/// Examples:
/// - "" → []
/// - "/paths/~1pets/get" → ["paths", "/pets", "get"]
pub fn parse(pointer: &str) -> Result<Vec<String>> {
    if pointer.is_empty() {
        return Ok(vec![]);
    }
    let rest = pointer
        .strip_prefix('/')
        .ok_or_else(|| BindError::structural(format!("JSON pointer '{}' must start with '/'", pointer)))?;
    rest.split('/').map(|token| unescape(token, pointer)).collect()
}

fn unescape(token: &str, pointer: &str) -> Result<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(BindError::structural(format!(
                    "JSON pointer '{}' has an invalid '~' escape",
                    pointer
                )))
            }
        }
    }
    Ok(out)
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Join reference tokens into a pointer
pub fn format<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens.iter().map(|t| format!("/{}", escape(t.as_ref()))).collect()
}

fn root_of(document: &NodeRef) -> Option<NodeRef> {
    if document.is_kind(Kind::Document) {
        document.content().first().cloned()
    } else {
        Some(document.clone())
    }
}

/// Follow `pointer` from the document root
pub fn resolve(document: &NodeRef, pointer: &str) -> Result<Option<NodeRef>> {
    let tokens = parse(pointer)?;
    let Some(mut current) = root_of(document) else {
        return Ok(None);
    };

    for token in &tokens {
        let node = current.resolve();
        let next = match node.kind() {
            Some(Kind::Mapping) => node.get(token).map(|(_, value)| value),
            Some(Kind::Sequence) => token.parse::<usize>().ok().and_then(|i| node.content().get(i).cloned()),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Pointer to the first node (in document order) that is `target`
///
/// An alias whose anchor is `target` also counts as a match. Aliases are
/// not followed, so a node reachable only through one is not found.
pub fn locate(document: &NodeRef, target: &NodeRef) -> Option<String> {
    let root = root_of(document)?;
    let mut path = Vec::new();
    if search(&root, target, &mut path) {
        Some(format(&path))
    } else {
        None
    }
}

fn search(node: &NodeRef, target: &NodeRef, path: &mut Vec<String>) -> bool {
    if node.ptr_eq(target) || node.alias_target().is_some_and(|t| t.ptr_eq(target)) {
        return true;
    }
    match node.kind() {
        Some(Kind::Mapping) => {
            for (key, value) in node.pairs() {
                path.push(key.resolve().value());
                if search(&value, target, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        Some(Kind::Sequence) => {
            for (index, item) in node.content().iter().enumerate() {
                path.push(index.to_string());
                if search(item, target, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::load_str;

    #[test]
    fn parse_unescapes_tokens() {
        assert_eq!(parse("").unwrap(), Vec::<String>::new());
        assert_eq!(parse("/paths/~1pets/a~0b").unwrap(), vec!["paths", "/pets", "a~b"]);
        assert_eq!(parse("/").unwrap(), vec![""]);
    }

    #[test]
    fn parse_rejects_bad_pointers() {
        assert!(parse("paths").is_err());
        assert!(parse("/a~2").is_err());
        assert!(parse("/a~").is_err());
    }

    #[test]
    fn format_escapes_tokens() {
        assert_eq!(format(&["paths", "/pets/{id}", "get"]), "/paths/~1pets~1{id}/get");
        assert_eq!(format::<&str>(&[]), "");
    }

    #[test]
    fn resolve_walks_mappings_and_sequences() {
        let doc = load_str("paths:\n  /pets:\n    tags: [a, b]\n").unwrap();

        let tag = resolve(&doc, "/paths/~1pets/tags/1").unwrap().unwrap();
        assert_eq!(tag.value(), "b");
        assert!(resolve(&doc, "/paths/missing").unwrap().is_none());
        assert!(resolve(&doc, "/paths/~1pets/tags/x").unwrap().is_none());
    }

    #[test]
    fn locate_finds_nested_nodes() {
        let doc = load_str("info:\n  title: t\ntags:\n  - name: a\n  - name: b\n").unwrap();
        let second = resolve(&doc, "/tags/1").unwrap().unwrap();

        assert_eq!(locate(&doc, &second).as_deref(), Some("/tags/1"));
        assert_eq!(locate(&doc, &doc.content()[0]).as_deref(), Some(""));
        assert!(locate(&doc, &NodeRef::scalar("elsewhere")).is_none());
    }

    #[test]
    fn locate_matches_aliases_of_the_target() {
        let anchored = NodeRef::mapping([("type", NodeRef::scalar("string"))]).with_anchor("s");
        let root = NodeRef::mapping([("a", NodeRef::alias(&anchored)), ("b", anchored.clone())]);

        assert_eq!(locate(&root, &anchored).as_deref(), Some("/a"));
    }
}
