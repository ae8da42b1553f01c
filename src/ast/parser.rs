//! Safe event stream over libyaml
//!
//! Wraps the same C-port parser serde_yaml sits on, but hands out every
//! event with its start and end marks, scalar style, collection style,
//! anchor and tag. Nothing is resolved or normalized here.

use std::borrow::Cow;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::slice;

use unsafe_libyaml as sys;

use super::node::Style;
use crate::error::{BindError, Result};

/// Byte offset plus 0-based line and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Mark {
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Mark {
    fn from_sys(mark: sys::yaml_mark_t) -> Self {
        Self {
            index: mark.index as usize,
            line: mark.line as usize,
            column: mark.column as usize,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ScalarEvent {
    pub anchor: Option<String>,
    pub tag: Option<String>,
    pub value: String,
    pub style: Style,
}

#[derive(Debug)]
pub(crate) struct CollectionStart {
    pub anchor: Option<String>,
    pub tag: Option<String>,
    pub flow: bool,
}

#[derive(Debug)]
pub(crate) enum EventKind {
    StreamStart,
    StreamEnd,
    DocumentStart { explicit: bool },
    DocumentEnd,
    Alias(String),
    Scalar(ScalarEvent),
    SequenceStart(CollectionStart),
    SequenceEnd,
    MappingStart(CollectionStart),
    MappingEnd,
}

#[derive(Debug)]
pub(crate) struct Event {
    pub kind: EventKind,
    pub start: Mark,
    pub end: Mark,
}

/// Pull parser over a UTF-8 buffer
///
/// libyaml keeps a pointer to itself once input is set, so the state lives
/// behind a box and never moves.
pub(crate) struct Parser<'input> {
    sys: Box<MaybeUninit<sys::yaml_parser_t>>,
    input: PhantomData<&'input [u8]>,
    finished: bool,
}

impl<'input> Parser<'input> {
    pub fn new(input: &'input [u8]) -> Result<Self> {
        let mut state = Box::new(MaybeUninit::<sys::yaml_parser_t>::uninit());
        let parser = state.as_mut_ptr();
        unsafe {
            if sys::yaml_parser_initialize(parser).fail {
                return Err(BindError::structural("could not allocate the YAML parser"));
            }
            sys::yaml_parser_set_encoding(parser, sys::YAML_UTF8_ENCODING);
            sys::yaml_parser_set_input_string(parser, input.as_ptr(), input.len() as u64);
        }
        Ok(Self {
            sys: state,
            input: PhantomData,
            finished: false,
        })
    }

    pub fn next_event(&mut self) -> Result<Event> {
        if self.finished {
            return Ok(Event {
                kind: EventKind::StreamEnd,
                start: Mark::default(),
                end: Mark::default(),
            });
        }
        let mut event = MaybeUninit::<sys::yaml_event_t>::uninit();
        unsafe {
            let parser = self.sys.as_mut_ptr();
            if (&(*parser)).error != sys::YAML_NO_ERROR {
                return Err(syntax_error(parser));
            }
            let event = event.as_mut_ptr();
            if sys::yaml_parser_parse(parser, event).fail {
                return Err(syntax_error(parser));
            }
            let converted = Event {
                kind: convert(&*event),
                start: Mark::from_sys((*event).start_mark),
                end: Mark::from_sys((*event).end_mark),
            };
            sys::yaml_event_delete(event);
            if matches!(converted.kind, EventKind::StreamEnd) {
                self.finished = true;
            }
            Ok(converted)
        }
    }
}

impl Drop for Parser<'_> {
    fn drop(&mut self) {
        unsafe { sys::yaml_parser_delete(self.sys.as_mut_ptr()) }
    }
}

unsafe fn syntax_error(parser: *const sys::yaml_parser_t) -> BindError {
    let problem = unsafe { optional_string((&(*parser)).problem as *const u8) }
        .unwrap_or_else(|| "libyaml parser failed without a reason".to_string());
    let context = unsafe { optional_string((&(*parser)).context as *const u8) };
    let mark = unsafe { (&(*parser)).problem_mark };
    BindError::Syntax {
        problem: match context {
            Some(context) => format!("{}, {}", problem, context),
            None => problem,
        },
        line: mark.line as usize + 1,
        column: mark.column as usize + 1,
    }
}

unsafe fn convert(event: &sys::yaml_event_t) -> EventKind {
    match event.type_ {
        sys::YAML_STREAM_START_EVENT => EventKind::StreamStart,
        sys::YAML_DOCUMENT_START_EVENT => EventKind::DocumentStart {
            explicit: !unsafe { event.data.document_start.implicit },
        },
        sys::YAML_DOCUMENT_END_EVENT => EventKind::DocumentEnd,
        sys::YAML_ALIAS_EVENT => {
            EventKind::Alias(unsafe { optional_string(event.data.alias.anchor) }.unwrap_or_default())
        }
        sys::YAML_SCALAR_EVENT => {
            let scalar = unsafe { event.data.scalar };
            let bytes = if scalar.value.is_null() {
                &[][..]
            } else {
                unsafe { slice::from_raw_parts(scalar.value, scalar.length as usize) }
            };
            EventKind::Scalar(ScalarEvent {
                anchor: unsafe { optional_string(scalar.anchor) },
                tag: unsafe { optional_string(scalar.tag) },
                value: lossy(bytes),
                style: match scalar.style {
                    sys::YAML_SINGLE_QUOTED_SCALAR_STYLE => Style::SingleQuoted,
                    sys::YAML_DOUBLE_QUOTED_SCALAR_STYLE => Style::DoubleQuoted,
                    sys::YAML_LITERAL_SCALAR_STYLE => Style::Literal,
                    sys::YAML_FOLDED_SCALAR_STYLE => Style::Folded,
                    _ => Style::Plain,
                },
            })
        }
        sys::YAML_SEQUENCE_START_EVENT => {
            let start = unsafe { event.data.sequence_start };
            EventKind::SequenceStart(CollectionStart {
                anchor: unsafe { optional_string(start.anchor) },
                tag: unsafe { optional_string(start.tag) },
                flow: start.style == sys::YAML_FLOW_SEQUENCE_STYLE,
            })
        }
        sys::YAML_SEQUENCE_END_EVENT => EventKind::SequenceEnd,
        sys::YAML_MAPPING_START_EVENT => {
            let start = unsafe { event.data.mapping_start };
            EventKind::MappingStart(CollectionStart {
                anchor: unsafe { optional_string(start.anchor) },
                tag: unsafe { optional_string(start.tag) },
                flow: start.style == sys::YAML_FLOW_MAPPING_STYLE,
            })
        }
        sys::YAML_MAPPING_END_EVENT => EventKind::MappingEnd,
        _ => EventKind::StreamEnd,
    }
}

unsafe fn optional_string(ptr: *const u8) -> Option<String> {
    let ptr = NonNull::new(ptr as *mut u8)?;
    let text = unsafe { CStr::from_ptr(ptr.as_ptr().cast()) };
    Some(lossy(text.to_bytes()))
}

fn lossy(bytes: &[u8]) -> String {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(text: &str) -> Vec<Event> {
        let mut parser = Parser::new(text.as_bytes()).unwrap();
        let mut out = Vec::new();
        loop {
            let event = parser.next_event().unwrap();
            let done = matches!(event.kind, EventKind::StreamEnd);
            out.push(event);
            if done {
                return out;
            }
        }
    }

    #[test]
    fn scalars_carry_style_and_marks() {
        let events = events("a: 'x'\nb: 0x1F\n");
        let scalars: Vec<(&str, Style, Mark)> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Scalar(s) => Some((s.value.as_str(), s.style, e.start)),
                _ => None,
            })
            .collect();

        assert_eq!(scalars[1].0, "x");
        assert_eq!(scalars[1].1, Style::SingleQuoted);
        assert_eq!((scalars[1].2.line, scalars[1].2.column, scalars[1].2.index), (0, 3, 3));
        assert_eq!(scalars[3].0, "0x1F");
        assert_eq!(scalars[3].1, Style::Plain);
    }

    #[test]
    fn flow_collections_are_flagged() {
        let events = events("a: [1]\nb:\n  - 2\n");
        let flows: Vec<bool> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::SequenceStart(start) => Some(start.flow),
                _ => None,
            })
            .collect();
        assert_eq!(flows, vec![true, false]);
    }

    #[test]
    fn anchors_and_aliases_are_reported() {
        let events = events("a: &x 1\nb: *x\n");
        assert!(events.iter().any(|e| matches!(&e.kind, EventKind::Scalar(s) if s.anchor.as_deref() == Some("x"))));
        assert!(events.iter().any(|e| matches!(&e.kind, EventKind::Alias(name) if name == "x")));
    }

    #[test]
    fn syntax_errors_carry_positions() {
        let mut parser = Parser::new(b"a: [1, 2\n").unwrap();
        let err = loop {
            match parser.next_event() {
                Ok(event) if matches!(event.kind, EventKind::StreamEnd) => panic!("expected an error"),
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert!(matches!(err, BindError::Syntax { line, .. } if line >= 1));
    }
}
