//! Sync: write a domain object back into its record and AST
//!
//! Sync walks a domain object alongside its core record and the record's
//! mapping node. Existing nodes are updated in place so styles, comments on
//! untouched entries, anchors and key order survive; new entries are
//! appended and entries the domain no longer has are removed.
//!
//! Sequences of records match elements by identity (the element's root
//! node) before falling back to position, so moving an element in the
//! domain moves its original subtree instead of rewriting every item.

use std::any::type_name;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::ast::{empty_mapping, Kind, NodeRef, Tag};
use crate::decode::{short_type_name, Bind, ScalarValue};
use crate::error::{BindError, Result};
use crate::extensions::{sync_extensions, CoreExtensions, Extensions};
use crate::record::{Model, Record};
use crate::registry::{FieldTable, Registry};
use crate::sequenced_map::{MapKey, SequencedMap};
use crate::slot::Slot;

/// Context shared by one sync pass
#[derive(Clone, Copy)]
pub struct SyncCtx<'r> {
    registry: &'r Registry,
}

impl<'r> SyncCtx<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Fresh core value, via the registry when a constructor is registered
    pub fn create<T: Default + 'static>(&self) -> T {
        self.registry.create::<T>()
    }
}

impl Default for SyncCtx<'static> {
    fn default() -> Self {
        Self::new(Registry::global())
    }
}

/// Domain-side facts sync needs regardless of the core type
pub trait Source {
    /// Zero value of the domain type; empty-to-empty fields are skipped
    fn is_unset(&self) -> bool;

    /// Root node of the record this value was populated from
    fn identity(&self) -> Option<NodeRef> {
        None
    }
}

/// Write `self` into core value `C`
pub trait SyncCore<C: Bind>: Source {
    /// Update `core` from `self` and return the value's node
    ///
    /// `prior` is the node the core value was decoded from, if any; it is
    /// updated in place when its kind still fits. `None` means the value is
    /// absent and its entry should be removed.
    fn sync_core(&mut self, ctx: &SyncCtx<'_>, core: &mut C, prior: Option<&NodeRef>) -> Result<Option<NodeRef>>;
}

fn fresh_scalar(text: &str, tag: &Tag) -> NodeRef {
    match tag {
        Tag::Str => NodeRef::string(text),
        _ => NodeRef::scalar(text),
    }
}

/// Scalar node for `value`, reusing `prior` when possible
///
/// An unchanged value keeps its node untouched (original spelling, alias);
/// a changed one is rewritten in place with its style kept.
pub(crate) fn write_scalar<T: ScalarValue>(value: &T, prior: Option<&NodeRef>) -> NodeRef {
    let (text, tag) = value.to_scalar();
    let Some(prior) = prior else {
        return fresh_scalar(&text, &tag);
    };

    let target = prior.resolve();
    if target.is_kind(Kind::Scalar) {
        if matches!(T::parse_scalar(&target), Ok(current) if current == *value) {
            return prior.clone();
        }
        if !prior.is_kind(Kind::Alias) {
            prior.set_scalar(&text, tag);
            return prior.clone();
        }
    }
    fresh_scalar(&text, &tag).at(prior.line(), prior.column())
}

macro_rules! sync_scalar {
    ($($ty:ty),*) => {$(
        impl Source for $ty {
            fn is_unset(&self) -> bool {
                *self == <$ty>::default()
            }
        }

        impl SyncCore<$ty> for $ty {
            fn sync_core(&mut self, _ctx: &SyncCtx<'_>, core: &mut $ty, prior: Option<&NodeRef>) -> Result<Option<NodeRef>> {
                *core = self.clone();
                Ok(Some(write_scalar(&*self, prior)))
            }
        }
    )*};
}

sync_scalar!(String, bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

macro_rules! widen_int {
    ($core:ty => $($ty:ty),*) => {$(
        impl SyncCore<$core> for $ty {
            fn sync_core(&mut self, ctx: &SyncCtx<'_>, core: &mut $core, prior: Option<&NodeRef>) -> Result<Option<NodeRef>> {
                let mut wide = <$core>::try_from(*self)
                    .map_err(|_| BindError::conversion(stringify!($ty), stringify!($core), *self))?;
                <$core as SyncCore<$core>>::sync_core(&mut wide, ctx, core, prior)
            }
        }
    )*};
}

widen_int!(i64 => i8, i16, i32, isize, u8, u16, u32, u64, usize);
widen_int!(u64 => i64, u32, usize);

impl SyncCore<f64> for f32 {
    fn sync_core(&mut self, ctx: &SyncCtx<'_>, core: &mut f64, prior: Option<&NodeRef>) -> Result<Option<NodeRef>> {
        let mut wide = f64::from(*self);
        <f64 as SyncCore<f64>>::sync_core(&mut wide, ctx, core, prior)
    }
}

impl SyncCore<f32> for f64 {
    fn sync_core(&mut self, ctx: &SyncCtx<'_>, core: &mut f32, prior: Option<&NodeRef>) -> Result<Option<NodeRef>> {
        let mut narrow = *self as f32;
        <f32 as SyncCore<f32>>::sync_core(&mut narrow, ctx, core, prior)
    }
}

impl Source for NodeRef {
    fn is_unset(&self) -> bool {
        self.is_null()
    }
}

/// Raw nodes are written as given; the prior handle is kept when it still
/// points at the same node
impl SyncCore<NodeRef> for NodeRef {
    fn sync_core(&mut self, _ctx: &SyncCtx<'_>, core: &mut NodeRef, prior: Option<&NodeRef>) -> Result<Option<NodeRef>> {
        *core = self.clone();
        match prior {
            Some(prior) if prior.resolve().ptr_eq(self) => Ok(Some(prior.clone())),
            _ => Ok(Some(self.clone())),
        }
    }
}

impl<D: Source> Source for Option<D> {
    fn is_unset(&self) -> bool {
        self.is_none()
    }

    fn identity(&self) -> Option<NodeRef> {
        self.as_ref().and_then(Source::identity)
    }
}

impl<C: Bind, D: SyncCore<C>> SyncCore<Option<C>> for Option<D> {
    fn sync_core(&mut self, ctx: &SyncCtx<'_>, core: &mut Option<C>, prior: Option<&NodeRef>) -> Result<Option<NodeRef>> {
        match self {
            None => {
                *core = None;
                Ok(None)
            }
            Some(source) => {
                let target = core.get_or_insert_with(|| ctx.create::<C>());
                source.sync_core(ctx, target, prior)
            }
        }
    }
}

impl<D: Source> Source for Vec<D> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl<C: Bind, D: SyncCore<C>> SyncCore<Vec<C>> for Vec<D> {
    fn sync_core(&mut self, ctx: &SyncCtx<'_>, core: &mut Vec<C>, prior: Option<&NodeRef>) -> Result<Option<NodeRef>> {
        let sequence = prior.map(NodeRef::resolve).filter(|n| n.is_kind(Kind::Sequence));
        let old_nodes = sequence.as_ref().map(NodeRef::content).unwrap_or_default();
        let mut old: Vec<Option<C>> = std::mem::take(core).into_iter().map(Some).collect();
        let mut targets: Vec<Option<(C, Option<NodeRef>)>> = self.iter().map(|_| None).collect();

        // elements backed by a record follow that record wherever it moved
        for (index, source) in self.iter().enumerate() {
            let Some(identity) = source.identity() else {
                continue;
            };
            let matched = old.iter().position(|element| {
                element
                    .as_ref()
                    .and_then(Bind::root_node)
                    .map_or(false, |root| root.ptr_eq(&identity))
            });
            if let Some(element) = matched.and_then(|position| {
                old[position]
                    .take()
                    .map(|element| (element, old_nodes.get(position).cloned()))
            }) {
                targets[index] = Some(element);
            }
        }

        // the rest reuse their position, unless it holds an unclaimed record
        for (index, source) in self.iter().enumerate() {
            if targets[index].is_some() || source.identity().is_some() {
                continue;
            }
            let reusable = old
                .get(index)
                .and_then(Option::as_ref)
                .map_or(false, |element| element.root_node().is_none());
            if reusable {
                targets[index] = old[index]
                    .take()
                    .map(|element| (element, old_nodes.get(index).cloned()));
            }
        }

        let mut nodes = Vec::with_capacity(self.len());
        for (source, target) in self.iter_mut().zip(targets) {
            let (mut element, prior_node) = target.unwrap_or_else(|| (ctx.create::<C>(), None));
            let node = source.sync_core(ctx, &mut element, prior_node.as_ref())?;
            nodes.push(node.unwrap_or_else(NodeRef::null));
            core.push(element);
        }

        let node = match (prior, sequence) {
            (Some(prior), Some(sequence)) => {
                sequence.write().content = nodes;
                prior.clone()
            }
            _ => NodeRef::sequence(nodes),
        };
        Ok(Some(node))
    }
}

impl<K: MapKey, V: Source> Source for SequencedMap<K, V> {
    fn is_unset(&self) -> bool {
        !self.is_initialized()
    }
}

impl<KC, VC, KD, VD> SyncCore<SequencedMap<KC, VC>> for SequencedMap<KD, VD>
where
    KC: MapKey,
    VC: Bind,
    KD: MapKey,
    VD: SyncCore<VC>,
{
    fn sync_core(
        &mut self,
        ctx: &SyncCtx<'_>,
        core: &mut SequencedMap<KC, VC>,
        prior: Option<&NodeRef>,
    ) -> Result<Option<NodeRef>> {
        if !self.is_initialized() {
            core.reset();
            return Ok(None);
        }

        let resolved = prior.map(NodeRef::resolve).filter(|n| n.is_kind(Kind::Mapping));
        let mapping = match &resolved {
            Some(mapping) => mapping.clone(),
            None if self.is_empty() => empty_mapping(),
            None => NodeRef::mapping(Vec::<(String, NodeRef)>::new()),
        };
        sync_map_entries(ctx, self, core, &mapping)?;

        match (prior, resolved) {
            (Some(prior), Some(_)) => Ok(Some(prior.clone())),
            _ => Ok(Some(mapping)),
        }
    }
}

/// Sync map entries into `mapping`
///
/// Keys are matched by wire form; existing entries are updated in place,
/// new ones appended, and core keys the source no longer has are removed
/// from both the core map and the mapping.
fn sync_map_entries<KC, VC, KD, VD>(
    ctx: &SyncCtx<'_>,
    source: &mut SequencedMap<KD, VD>,
    core: &mut SequencedMap<KC, VC>,
    mapping: &NodeRef,
) -> Result<()>
where
    KC: MapKey,
    VC: Bind,
    KD: MapKey,
    VD: SyncCore<VC>,
{
    core.init();
    let mut seen = FxHashSet::default();

    for (key, value) in source.iter_mut() {
        let wire = key.to_wire();
        let core_key = KC::from_wire(&wire)
            .map_err(|_| BindError::conversion(type_name::<KD>(), type_name::<KC>(), &wire))?;
        let prior = mapping.get(&wire).map(|(_, node)| node);

        let node = match core.get_mut(&core_key) {
            Some(target) => value.sync_core(ctx, target, prior.as_ref())?,
            None => {
                let mut target = ctx.create::<VC>();
                let node = value.sync_core(ctx, &mut target, prior.as_ref())?;
                core.set(core_key.clone(), target);
                node
            }
        };

        match node {
            Some(node) => {
                mapping.upsert(&wire, node);
            }
            None => {
                mapping.remove(&wire);
                core.delete(&core_key);
            }
        }
        seen.insert(wire);
    }

    let stale: Vec<KC> = core
        .keys()
        .filter(|key| !seen.contains(&key.to_wire()))
        .cloned()
        .collect();
    for key in stale {
        mapping.remove(&key.to_wire());
        core.delete(&key);
    }
    Ok(())
}

/// Field-by-field sync of one record, driven by [`model!`](crate::model)
pub struct RecordSync<'c, 'r, R: Record> {
    ctx: &'c SyncCtx<'r>,
    table: Arc<FieldTable<R>>,
    mapping: NodeRef,
    returned: NodeRef,
}

impl<'c, 'r, R: Record> RecordSync<'c, 'r, R> {
    /// Start from `prior`, else the record's root, else a new mapping
    pub fn begin(ctx: &'c SyncCtx<'r>, core: &R, prior: Option<&NodeRef>) -> Self {
        let source = prior.cloned().or_else(|| core.meta().root_node.clone());
        let resolved = source
            .as_ref()
            .map(NodeRef::resolve)
            .filter(|n| n.is_kind(Kind::Mapping));
        let (mapping, returned) = match (source, resolved) {
            (Some(source), Some(mapping)) => (mapping, source),
            _ => {
                let mapping = NodeRef::mapping(Vec::<(String, NodeRef)>::new());
                (mapping.clone(), mapping)
            }
        };
        Self {
            ctx,
            table: ctx.registry().fields::<R>(),
            mapping,
            returned,
        }
    }

    pub fn mapping(&self) -> &NodeRef {
        &self.mapping
    }

    /// Sync one declared field
    pub fn field<C: Bind, D: SyncCore<C>>(&mut self, name: &str, source: &mut D, slot: &mut Slot<C>) -> Result<()> {
        let index = self.table.index_of_name(name).ok_or_else(|| {
            BindError::structural(format!("{} has no field {}", short_type_name::<R>(), name))
        })?;
        let key = self.table.fields[index].key;
        if source.is_unset() && slot.value.is_empty_value() {
            return Ok(());
        }
        if slot.value_node.is_none() {
            if let Some((key_node, value_node)) = self.mapping.get(key) {
                slot.key_node = Some(key_node);
                slot.value_node = Some(value_node);
            }
        }

        match slot.sync(self.ctx, key, source)? {
            Some((key_node, value_node)) => self.mapping.splice(&key_node, value_node),
            None => {
                self.mapping.remove(key);
            }
        }
        Ok(())
    }

    /// Diff the extension map
    pub fn extensions(&mut self, source: &Extensions, core: &mut CoreExtensions) -> Result<()> {
        sync_extensions(&self.mapping, source, core);
        Ok(())
    }

    /// Sync the embedded map into the record's own mapping
    pub fn embedded<KC, VC, KD, VD>(
        &mut self,
        source: &mut SequencedMap<KD, VD>,
        core: &mut SequencedMap<KC, VC>,
    ) -> Result<()>
    where
        KC: MapKey,
        VC: Bind,
        KD: MapKey,
        VD: SyncCore<VC>,
    {
        if !source.is_initialized() {
            for key in core.keys() {
                self.mapping.remove(&key.to_wire());
            }
            core.reset();
            return Ok(());
        }
        sync_map_entries(self.ctx, source, core, &self.mapping)
    }

    /// Store the mapping as the record's root and recompute validity
    pub fn finish(self, core: &mut R) -> NodeRef {
        let missing = self.table.missing_required(core);
        let meta = core.meta_mut();
        meta.root_node = Some(self.mapping);
        meta.valid_syntax = true;
        meta.valid = missing.is_empty();
        self.returned
    }
}

/// Sync a model into its own record, in place
///
/// The model's record is cloned, patched against its root node and stored
/// back into the model; the AST is mutated in place and its root returned.
pub fn sync<M>(model: &mut M) -> Result<NodeRef>
where
    M: Model + SyncCore<<M as Model>::Core>,
{
    sync_in(&SyncCtx::default(), model)
}

/// [`sync`] with an explicit context
pub fn sync_in<M>(ctx: &SyncCtx<'_>, model: &mut M) -> Result<NodeRef>
where
    M: Model + SyncCore<<M as Model>::Core>,
{
    let mut core = model.core().clone();
    let prior = core.meta().root_node.clone();
    sync_with(ctx, model, &mut core, prior.as_ref())
}

/// Sync a model into an explicit record and prior node
pub fn sync_with<M>(ctx: &SyncCtx<'_>, model: &mut M, core: &mut M::Core, prior: Option<&NodeRef>) -> Result<NodeRef>
where
    M: Model + SyncCore<<M as Model>::Core>,
{
    let span = tracing::debug_span!("sync", ty = short_type_name::<M>());
    let _guard = span.enter();

    let node = model
        .sync_core(ctx, core, prior)?
        .ok_or_else(|| BindError::structural("record sync produced no node"))?;
    tracing::debug!(valid = core.meta().valid, "sync finished");
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{load_str, to_yaml_string, Style};

    #[test]
    fn unchanged_scalar_keeps_its_spelling() {
        let node = NodeRef::scalar("0x1F");
        let ctx = SyncCtx::default();
        let mut core = 0i64;

        let out = 31i64.sync_core(&ctx, &mut core, Some(&node)).unwrap().unwrap();
        assert!(out.ptr_eq(&node));
        assert_eq!(node.value(), "0x1F");
        assert_eq!(core, 31);
    }

    #[test]
    fn changed_scalar_is_rewritten_in_place() {
        let node = NodeRef::scalar("old").with_style(Style::DoubleQuoted);
        let ctx = SyncCtx::default();
        let mut core = String::new();

        let out = "new".to_string().sync_core(&ctx, &mut core, Some(&node)).unwrap().unwrap();
        assert!(out.ptr_eq(&node));
        assert_eq!(node.value(), "new");
        assert_eq!(node.style(), Style::DoubleQuoted);
    }

    #[test]
    fn strings_that_look_like_numbers_get_quoted() {
        let ctx = SyncCtx::default();
        let mut core = String::new();
        let node = "42".to_string().sync_core(&ctx, &mut core, None).unwrap().unwrap();
        assert_eq!(to_yaml_string(&node).unwrap().trim(), "\"42\"");
    }

    #[test]
    fn widening_is_range_checked() {
        let ctx = SyncCtx::default();
        let mut core = 0i64;
        assert!(u64::MAX.sync_core(&ctx, &mut core, None).is_err());
        assert!(7u8.sync_core(&ctx, &mut core, None).is_ok());
        assert_eq!(core, 7);
    }

    #[test]
    fn sequences_of_scalars_update_positionally() {
        let node = load_str("- a\n- b\n- c\n").unwrap().content()[0].clone();
        let items = node.content();
        let ctx = SyncCtx::default();
        let mut core = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let mut source = vec!["a".to_string(), "B".to_string()];
        let out = source.sync_core(&ctx, &mut core, Some(&node)).unwrap().unwrap();

        assert!(out.ptr_eq(&node));
        let content = node.content();
        assert_eq!(content.len(), 2);
        assert!(content[0].ptr_eq(&items[0]));
        assert!(content[1].ptr_eq(&items[1]));
        assert_eq!(content[1].value(), "B");
        assert_eq!(core, vec!["a", "B"]);
    }

    #[test]
    fn map_sync_adds_updates_and_removes() {
        let node = load_str("a: 1\nb: 2\nc: 3\n").unwrap().content()[0].clone();
        let b_value = node.get("b").unwrap().1;
        let ctx = SyncCtx::default();
        let mut core: SequencedMap<String, i64> =
            [("a", 1), ("b", 2), ("c", 3)].into_iter().map(|(k, v)| (k.to_string(), v)).collect();

        let mut source: SequencedMap<String, i64> =
            [("b", 20), ("d", 4)].into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        source.sync_core(&ctx, &mut core, Some(&node)).unwrap();

        let keys: Vec<String> = node.pairs().iter().map(|(k, _)| k.value()).collect();
        assert_eq!(keys, vec!["b", "d"]);
        assert!(node.get("b").unwrap().1.ptr_eq(&b_value));
        assert_eq!(b_value.value(), "20");
        assert_eq!(core.keys().cloned().collect::<Vec<_>>(), vec!["b", "d"]);
    }

    #[test]
    fn uninitialized_map_removes_the_entry() {
        let ctx = SyncCtx::default();
        let mut core: SequencedMap<String, i64> = SequencedMap::empty();
        let mut source: SequencedMap<String, i64> = SequencedMap::new();

        assert!(source.sync_core(&ctx, &mut core, None).unwrap().is_none());
        assert!(!core.is_initialized());
    }

    #[test]
    fn initialized_empty_map_is_explicit() {
        let ctx = SyncCtx::default();
        let mut core: SequencedMap<String, i64> = SequencedMap::new();
        let mut source: SequencedMap<String, i64> = SequencedMap::empty();

        let node = source.sync_core(&ctx, &mut core, None).unwrap().unwrap();
        assert_eq!(to_yaml_string(&node).unwrap().trim(), "{}");
        assert!(core.is_initialized());
    }

    #[test]
    fn none_removes_and_clears() {
        let ctx = SyncCtx::default();
        let mut core = Some(5i64);
        let mut source: Option<i64> = None;
        assert!(source.sync_core(&ctx, &mut core, None).unwrap().is_none());
        assert!(core.is_none());
    }
}
