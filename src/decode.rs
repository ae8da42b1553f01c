//! Decode engine: AST nodes into typed values
//!
//! Every decodable type implements [`Bind`]. Decoding never stops at the
//! first problem: shape disagreements become [`ValidationError`]s that are
//! collected in document order, and only malformed input (or depth/cancel)
//! aborts the call with a [`BindError`].
//!
//! Containers fan their entries out on the rayon pool when [`BindLimits`]
//! allows it. Each task returns its own result; results are collected into
//! a vector indexed like the input, so error order never depends on task
//! completion order.

use std::any::type_name;

use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::ast::{scalar, Kind, NodeRef, Tag};
use crate::error::{BindError, Result};
use crate::errors::{ValidationError, ValidationErrorKind};
use crate::limits::BindLimits;
use crate::registry::Registry;
use crate::sequenced_map::{MapKey, SequencedMap};

/// A decoded value plus its non-fatal diagnostics
pub type Decoded<T> = (T, Vec<ValidationError>);

/// Structural category of a bindable type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Optional,
    Sequence,
    Map,
    Record,
    /// Serde-decoded struct without field descriptors
    Plain,
    /// Raw AST node
    Raw,
    Union,
}

impl Shape {
    /// Fields are required unless their type can express absence
    pub fn implicitly_required(self) -> bool {
        !matches!(self, Shape::Optional | Shape::Sequence | Shape::Map)
    }
}

/// A type the decode engine can produce from an AST node
pub trait Bind: Sized + Default + Clone + Send + Sync + 'static {
    const SHAPE: Shape;

    /// Decode from `node`, which has already been alias-resolved
    fn decode(ctx: &Decoder<'_>, node: &NodeRef) -> Result<Decoded<Self>>;

    /// Backing AST node, for record-like values
    fn root_node(&self) -> Option<NodeRef> {
        None
    }

    /// True for the zero value of the type (sync skips empty-to-empty)
    fn is_empty_value(&self) -> bool;
}

pub(crate) fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn kind_name(node: &NodeRef) -> String {
    node.kind().map_or_else(|| "empty node".to_string(), |k| k.to_string())
}

pub(crate) fn kind_mismatch<T>(node: &NodeRef, expected: Kind) -> ValidationError {
    ValidationError::type_mismatch(
        format!(
            "expected a {} for {}, got {}",
            expected,
            short_type_name::<T>(),
            kind_name(node)
        ),
        node,
    )
}

/// Decoding context: registry, limits, cancellation and current depth
#[derive(Clone)]
pub struct Decoder<'r> {
    registry: &'r Registry,
    limits: BindLimits,
    token: CancellationToken,
    depth: usize,
}

impl<'r> Decoder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            limits: BindLimits::default(),
            token: CancellationToken::new(),
            depth: 0,
        }
    }

    pub fn with_limits(mut self, limits: BindLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Abort the decode when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn limits(&self) -> BindLimits {
        self.limits
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Decode a document (or any node) into `T`
    ///
    /// A document node is unwrapped to its root first.
    pub fn decode<T: Bind>(&self, node: &NodeRef) -> Result<Decoded<T>> {
        if self.token.is_cancelled() {
            return Err(BindError::Cancelled);
        }
        let root = document_root(node)?;
        let span = tracing::debug_span!("decode", ty = short_type_name::<T>());
        let _guard = span.enter();

        let (value, errors) = self.decode_value::<T>(&root)?;
        debug!(errors = errors.len(), "decode finished");
        Ok((value, errors))
    }

    /// Parse `text` and decode it into `T`
    pub fn decode_str<T: Bind>(&self, text: &str) -> Result<Decoded<T>> {
        let document = crate::ast::load_str(text)?;
        self.decode(&document)
    }

    /// Decode one nested value: one level deeper, aliases followed
    pub fn decode_value<T: Bind>(&self, node: &NodeRef) -> Result<Decoded<T>> {
        let nested = self.descend()?;
        let resolved = node.resolve();
        T::decode(&nested, &resolved)
    }

    fn descend(&self) -> Result<Decoder<'r>> {
        let depth = self.depth + 1;
        if depth > self.limits.max_depth {
            return Err(BindError::DepthExceeded { depth });
        }
        Ok(Decoder {
            depth,
            ..self.clone()
        })
    }

    /// Run `task` over `items`, in parallel when the limits allow it
    ///
    /// Results come back in input order. The first fatal error cancels the
    /// group's token (checked at every task entry) and is returned once the
    /// group has drained.
    pub(crate) fn fan_out<I, T, F>(&self, items: &[I], task: F) -> Result<Vec<T>>
    where
        I: Sync,
        T: Send,
        F: Fn(&Decoder<'r>, usize, &I) -> Result<T> + Sync,
    {
        let group = Decoder {
            token: self.token.child_token(),
            ..self.clone()
        };
        let first_error: Mutex<Option<BindError>> = Mutex::new(None);

        let run = |index: usize, item: &I| -> Result<T> {
            if group.token.is_cancelled() {
                return Err(BindError::Cancelled);
            }
            task(&group, index, item).map_err(|err| {
                let mut slot = first_error.lock();
                if slot.is_none() {
                    *slot = Some(err);
                }
                group.token.cancel();
                BindError::Cancelled
            })
        };

        let outcome = if self.limits.fan_out(items.len()) {
            trace!(entries = items.len(), depth = self.depth, "fan-out");
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| run(index, item))
                .collect::<Result<Vec<T>>>()
        } else {
            items
                .iter()
                .enumerate()
                .map(|(index, item)| run(index, item))
                .collect::<Result<Vec<T>>>()
        };

        outcome.map_err(|_| first_error.into_inner().unwrap_or(BindError::Cancelled))
    }
}

impl Default for Decoder<'static> {
    fn default() -> Self {
        Decoder::new(Registry::global())
    }
}

/// Root node of a document, or the node itself
pub(crate) fn document_root(node: &NodeRef) -> Result<NodeRef> {
    if !node.is_kind(Kind::Document) {
        return Ok(node.clone());
    }
    node.content()
        .into_iter()
        .next()
        .ok_or_else(|| BindError::structural("document has no root node"))
}

/// Duplicate-key scan over one mapping
pub(crate) struct KeyScan {
    /// Entries overridden by a later occurrence of the same key
    pub(crate) superseded: Vec<bool>,
    pub(crate) warnings: Vec<ValidationError>,
}

/// Find repeated keys: every later occurrence gets a warning pointing at the
/// first one, and only the last occurrence is decoded
pub(crate) fn scan_keys(pairs: &[(NodeRef, NodeRef)]) -> KeyScan {
    let mut seen: FxHashMap<String, (usize, usize)> = FxHashMap::default();
    let mut superseded = vec![false; pairs.len()];
    let mut warnings = Vec::new();

    for (index, (key_node, _)) in pairs.iter().enumerate() {
        let resolved = key_node.resolve();
        if !resolved.is_kind(Kind::Scalar) {
            continue;
        }
        let key = resolved.value();
        match seen.get_mut(&key) {
            Some((first_line, latest)) => {
                debug!(key = %key, line = key_node.line(), first = *first_line, "duplicate mapping key");
                superseded[*latest] = true;
                *latest = index;
                warnings.push(ValidationError::at(
                    ValidationErrorKind::DuplicateKey,
                    format!("mapping key \"{}\" already defined at line {}", key, first_line),
                    key_node,
                ));
            }
            None => {
                seen.insert(key, (key_node.line(), index));
            }
        }
    }

    KeyScan {
        superseded,
        warnings,
    }
}

pub(crate) enum ScalarIssue {
    Mismatch(String),
    Malformed,
}

/// Scalars with a native wire form
pub(crate) trait ScalarValue: Bind + PartialEq {
    const TYPE_NAME: &'static str;

    /// Parse an alias-resolved scalar node
    fn parse_scalar(node: &NodeRef) -> std::result::Result<Self, ScalarIssue>;

    fn to_scalar(&self) -> (String, Tag);
}

fn mismatch_issue(node: &NodeRef, tag: &Tag, target: &str) -> ScalarIssue {
    ScalarIssue::Mismatch(format!(
        "cannot decode {} `{}` into {}",
        tag.as_str(),
        node.value(),
        target
    ))
}

/// Implicitly typed text always parses; a failure means an explicit tag lied
fn unparsable(node: &NodeRef, target: &str) -> ScalarIssue {
    if node.tag().is_empty() {
        ScalarIssue::Mismatch(format!("`{}` is out of range for {}", node.value(), target))
    } else {
        ScalarIssue::Malformed
    }
}

fn decode_scalar<T: ScalarValue>(node: &NodeRef) -> Result<Decoded<T>> {
    if !node.is_kind(Kind::Scalar) {
        return Ok((T::default(), vec![kind_mismatch::<T>(node, Kind::Scalar)]));
    }
    match T::parse_scalar(node) {
        Ok(value) => Ok((value, Vec::new())),
        Err(ScalarIssue::Mismatch(message)) => {
            Ok((T::default(), vec![ValidationError::type_mismatch(message, node)]))
        }
        Err(ScalarIssue::Malformed) => Err(BindError::MalformedScalar {
            tag: node.tag(),
            value: node.value(),
            line: node.line(),
            column: node.column(),
        }),
    }
}

macro_rules! bind_scalar {
    ($ty:ty) => {
        impl Bind for $ty {
            const SHAPE: Shape = Shape::Scalar;

            fn decode(_ctx: &Decoder<'_>, node: &NodeRef) -> Result<Decoded<Self>> {
                decode_scalar(node)
            }

            fn is_empty_value(&self) -> bool {
                *self == <$ty>::default()
            }
        }
    };
}

macro_rules! scalar_int {
    ($($ty:ty),*) => {$(
        impl ScalarValue for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn parse_scalar(node: &NodeRef) -> std::result::Result<Self, ScalarIssue> {
                match node.resolved_tag() {
                    Tag::Null => Ok(0),
                    Tag::Int => {
                        let wide = scalar::parse_int(&node.value())
                            .ok_or_else(|| unparsable(node, Self::TYPE_NAME))?;
                        <$ty>::try_from(wide).map_err(|_| unparsable(node, Self::TYPE_NAME))
                    }
                    tag => Err(mismatch_issue(node, &tag, Self::TYPE_NAME)),
                }
            }

            fn to_scalar(&self) -> (String, Tag) {
                (self.to_string(), Tag::Int)
            }
        }

        bind_scalar!($ty);
    )*};
}

macro_rules! scalar_float {
    ($($ty:ty),*) => {$(
        impl ScalarValue for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn parse_scalar(node: &NodeRef) -> std::result::Result<Self, ScalarIssue> {
                match node.resolved_tag() {
                    Tag::Null => Ok(0.0),
                    Tag::Float | Tag::Int => scalar::parse_float(&node.value())
                        .map(|v| v as $ty)
                        .ok_or_else(|| unparsable(node, Self::TYPE_NAME)),
                    tag => Err(mismatch_issue(node, &tag, Self::TYPE_NAME)),
                }
            }

            fn to_scalar(&self) -> (String, Tag) {
                (scalar::format_float(f64::from(*self)), Tag::Float)
            }
        }

        bind_scalar!($ty);
    )*};
}

scalar_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
scalar_float!(f32, f64);

impl ScalarValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn parse_scalar(node: &NodeRef) -> std::result::Result<Self, ScalarIssue> {
        match node.resolved_tag() {
            Tag::Null => Ok(false),
            Tag::Bool => scalar::parse_bool(&node.value()).ok_or(ScalarIssue::Malformed),
            tag => Err(mismatch_issue(node, &tag, Self::TYPE_NAME)),
        }
    }

    fn to_scalar(&self) -> (String, Tag) {
        (self.to_string(), Tag::Bool)
    }
}

bind_scalar!(bool);

impl ScalarValue for String {
    const TYPE_NAME: &'static str = "string";

    fn parse_scalar(node: &NodeRef) -> std::result::Result<Self, ScalarIssue> {
        match node.resolved_tag() {
            Tag::Null => Ok(String::new()),
            _ => Ok(node.value()),
        }
    }

    fn to_scalar(&self) -> (String, Tag) {
        (self.clone(), Tag::Str)
    }
}

bind_scalar!(String);

/// Raw capture: the (resolved) node itself
impl Bind for NodeRef {
    const SHAPE: Shape = Shape::Raw;

    fn decode(_ctx: &Decoder<'_>, node: &NodeRef) -> Result<Decoded<Self>> {
        Ok((node.clone(), Vec::new()))
    }

    fn is_empty_value(&self) -> bool {
        self.is_null()
    }
}

impl<T: Bind> Bind for Option<T> {
    const SHAPE: Shape = Shape::Optional;

    fn decode(ctx: &Decoder<'_>, node: &NodeRef) -> Result<Decoded<Self>> {
        if node.is_null() {
            return Ok((None, Vec::new()));
        }
        let (value, errors) = T::decode(ctx, node)?;
        Ok((Some(value), errors))
    }

    fn root_node(&self) -> Option<NodeRef> {
        self.as_ref().and_then(Bind::root_node)
    }

    fn is_empty_value(&self) -> bool {
        self.is_none()
    }
}

impl<T: Bind> Bind for Vec<T> {
    const SHAPE: Shape = Shape::Sequence;

    fn decode(ctx: &Decoder<'_>, node: &NodeRef) -> Result<Decoded<Self>> {
        if node.is_null() {
            return Ok((Vec::new(), Vec::new()));
        }
        if !node.is_kind(Kind::Sequence) {
            return Ok((Vec::new(), vec![kind_mismatch::<Self>(node, Kind::Sequence)]));
        }

        let items = node.content();
        let decoded = ctx.fan_out(&items, |ctx, _, item| ctx.decode_value::<T>(item))?;

        let mut values = Vec::with_capacity(decoded.len());
        let mut errors = Vec::new();
        for (value, item_errors) in decoded {
            values.push(value);
            errors.extend(item_errors);
        }
        Ok((values, errors))
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<K: MapKey, V: Bind> Bind for SequencedMap<K, V> {
    const SHAPE: Shape = Shape::Map;

    fn decode(ctx: &Decoder<'_>, node: &NodeRef) -> Result<Decoded<Self>> {
        if node.is_null() {
            return Ok((SequencedMap::new(), Vec::new()));
        }
        if !node.is_kind(Kind::Mapping) {
            return Ok((SequencedMap::new(), vec![kind_mismatch::<Self>(node, Kind::Mapping)]));
        }
        Self::decode_entries(ctx, &node.pairs())
    }

    fn is_empty_value(&self) -> bool {
        !self.is_initialized()
    }
}

impl<K: MapKey, V: Bind> SequencedMap<K, V> {
    /// Decode mapping entries into an initialized map
    ///
    /// Duplicate-key warnings come first, then entry errors in document
    /// order. Keys that do not parse as `K` are reported and skipped.
    pub(crate) fn decode_entries(ctx: &Decoder<'_>, pairs: &[(NodeRef, NodeRef)]) -> Result<Decoded<Self>> {
        let scan = scan_keys(pairs);
        let superseded = &scan.superseded;

        let outcomes = ctx.fan_out(pairs, |ctx, index, (key_node, value_node)| {
            if superseded[index] {
                return Ok(None);
            }
            let resolved = key_node.resolve();
            if !resolved.is_kind(Kind::Scalar) {
                return Ok(Some((None, vec![kind_mismatch::<K>(key_node, Kind::Scalar)])));
            }
            let key = match K::from_wire(&resolved.value()) {
                Ok(key) => key,
                Err(reason) => {
                    return Ok(Some((None, vec![ValidationError::type_mismatch(reason, key_node)])));
                }
            };
            let (value, errors) = ctx.decode_value::<V>(value_node)?;
            Ok(Some((Some((key, value)), errors)))
        })?;

        let mut map = SequencedMap::empty();
        let mut errors = scan.warnings;
        for (entry, entry_errors) in outcomes.into_iter().flatten() {
            if let Some((key, value)) = entry {
                map.set(key, value);
            }
            errors.extend(entry_errors);
        }
        Ok((map, errors))
    }
}
