//! Type registry and field descriptor cache
//!
//! Holds constructors for record/value types and one precomputed field table
//! per record type. Both maps are DashMaps: decode reads them concurrently
//! from every fan-out task, registration writes them once up front.
//!
//! A process-wide instance is available through [`Registry::global`];
//! explicit instances can be built for isolation (tests, embedding).

use std::any::{type_name, Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::ast::NodeRef;
use crate::decode::{Bind, Decoder};
use crate::error::Result;
use crate::errors::ValidationError;
use crate::extensions::CoreExtensions;
use crate::record::Record;
use crate::sequenced_map::{MapKey, SequencedMap, UntypedMap};
use crate::slot::Slot;

/// Global registry (thread-safe, lock-free reads)
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

type Constructor = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Result of decoding one field: its diagnostics plus a deferred write
///
/// Fan-out tasks never touch the record; the write is applied afterwards in
/// document order.
pub struct FieldDecoded<R> {
    pub(crate) errors: Vec<ValidationError>,
    pub(crate) assign: Box<dyn FnOnce(&mut R) + Send>,
}

type FieldDecodeFn<R> =
    Box<dyn Fn(&Decoder<'_>, &NodeRef, &NodeRef) -> Result<FieldDecoded<R>> + Send + Sync>;

/// Public, per-field metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Rust field name
    pub name: &'static str,
    /// Wire key
    pub key: &'static str,
    /// Declaration order
    pub index: usize,
    pub required: bool,
    pub is_extension: bool,
}

/// One declared field of record `R`
pub struct FieldDef<R> {
    pub(crate) name: &'static str,
    pub(crate) key: &'static str,
    pub(crate) required: bool,
    pub(crate) is_extension: bool,
    pub(crate) decode: FieldDecodeFn<R>,
    pub(crate) present: Box<dyn Fn(&R) -> bool + Send + Sync>,
}

impl<R: Record> FieldDef<R> {
    /// A regular field backed by `Slot<C>`
    ///
    /// `required: None` applies the implicit rule: required unless the value
    /// type is optional, a sequence or a map.
    pub fn value<C: Bind>(
        name: &'static str,
        key: &'static str,
        required: Option<bool>,
        get: fn(&R) -> &Slot<C>,
        get_mut: fn(&mut R) -> &mut Slot<C>,
    ) -> Self {
        Self {
            name,
            key,
            required: required.unwrap_or_else(|| C::SHAPE.implicitly_required()),
            is_extension: false,
            decode: Box::new(move |ctx: &Decoder<'_>, key: &NodeRef, value: &NodeRef| {
                let (slot, errors) = Slot::<C>::decode(ctx, Some(key), value)?;
                Ok(FieldDecoded {
                    errors,
                    assign: Box::new(move |record: &mut R| *get_mut(record) = slot),
                })
            }),
            present: Box::new(move |record: &R| get(record).present),
        }
    }

    /// The record's extension slot, capturing `x-` keys as raw nodes
    pub fn extensions(
        name: &'static str,
        get: fn(&R) -> &CoreExtensions,
        get_mut: fn(&mut R) -> &mut CoreExtensions,
    ) -> Self {
        Self {
            name,
            key: "x-*",
            required: false,
            is_extension: true,
            decode: Box::new(move |_ctx: &Decoder<'_>, key: &NodeRef, value: &NodeRef| {
                let slot = Slot::capture(key, value);
                Ok(FieldDecoded {
                    errors: Vec::new(),
                    assign: Box::new(move |record: &mut R| {
                        get_mut(record).set(slot.key.clone(), slot);
                    }),
                })
            }),
            present: Box::new(move |record: &R| !get(record).is_empty()),
        }
    }

    pub fn descriptor(&self, index: usize) -> FieldDescriptor {
        FieldDescriptor {
            name: self.name,
            key: self.key,
            index,
            required: self.required,
            is_extension: self.is_extension,
        }
    }
}

/// Access to a record's embedded map (undeclared keys become entries)
pub trait EmbeddedAccess<R>: Send + Sync {
    fn name(&self) -> &'static str;
    fn decode(&self, ctx: &Decoder<'_>, pairs: &[(NodeRef, NodeRef)]) -> Result<FieldDecoded<R>>;
    fn untyped<'a>(&self, record: &'a R) -> &'a dyn UntypedMap;
    fn untyped_mut<'a>(&self, record: &'a mut R) -> &'a mut dyn UntypedMap;
}

pub struct EmbeddedDef<R, K: MapKey, V> {
    name: &'static str,
    get: fn(&R) -> &SequencedMap<K, V>,
    get_mut: fn(&mut R) -> &mut SequencedMap<K, V>,
    _marker: PhantomData<fn() -> R>,
}

impl<R, K: MapKey, V> EmbeddedDef<R, K, V> {
    pub fn new(
        name: &'static str,
        get: fn(&R) -> &SequencedMap<K, V>,
        get_mut: fn(&mut R) -> &mut SequencedMap<K, V>,
    ) -> Self {
        Self {
            name,
            get,
            get_mut,
            _marker: PhantomData,
        }
    }
}

impl<R: Record, K: MapKey, V: Bind> EmbeddedAccess<R> for EmbeddedDef<R, K, V> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode(&self, ctx: &Decoder<'_>, pairs: &[(NodeRef, NodeRef)]) -> Result<FieldDecoded<R>> {
        let (map, errors) = SequencedMap::<K, V>::decode_entries(ctx, pairs)?;
        let get_mut = self.get_mut;
        Ok(FieldDecoded {
            errors,
            assign: Box::new(move |record: &mut R| *get_mut(record) = map),
        })
    }

    fn untyped<'a>(&self, record: &'a R) -> &'a dyn UntypedMap {
        (self.get)(record)
    }

    fn untyped_mut<'a>(&self, record: &'a mut R) -> &'a mut dyn UntypedMap {
        (self.get_mut)(record)
    }
}

/// Precomputed field table for one record type
pub struct FieldTable<R> {
    pub(crate) fields: Vec<FieldDef<R>>,
    by_key: FxHashMap<&'static str, usize>,
    by_name: FxHashMap<&'static str, usize>,
    pub(crate) extensions: Option<usize>,
    pub(crate) embedded: Option<Box<dyn EmbeddedAccess<R>>>,
}

impl<R: Record> FieldTable<R> {
    fn build() -> Self {
        let fields = R::field_defs();
        let mut by_key = FxHashMap::default();
        let mut by_name = FxHashMap::default();
        let mut extensions = None;
        for (index, field) in fields.iter().enumerate() {
            by_name.insert(field.name, index);
            if field.is_extension {
                extensions.get_or_insert(index);
            } else {
                by_key.insert(field.key, index);
            }
        }
        Self {
            fields,
            by_key,
            by_name,
            extensions,
            embedded: R::embedded_def(),
        }
    }

    pub fn index_of_key(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn field(&self, index: usize) -> Option<&FieldDef<R>> {
        self.fields.get(index)
    }

    pub fn descriptors(&self) -> Vec<FieldDescriptor> {
        self.fields
            .iter()
            .enumerate()
            .map(|(index, field)| field.descriptor(index))
            .collect()
    }

    pub fn has_extensions(&self) -> bool {
        self.extensions.is_some()
    }

    pub fn has_embedded_map(&self) -> bool {
        self.embedded.is_some()
    }

    /// Declared-required fields whose slot is not present
    pub fn missing_required(&self, record: &R) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.required && !f.is_extension && !(f.present)(record))
            .map(|f| f.key)
            .collect()
    }
}

/// Type registry / factory plus the field descriptor cache
pub struct Registry {
    constructors: DashMap<TypeId, Constructor>,
    tables: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            constructors: DashMap::new(),
            tables: DashMap::new(),
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static Registry {
        &REGISTRY
    }

    /// Register a constructor used whenever the engine needs a fresh `T`
    pub fn register<T, F>(&self, constructor: F)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.constructors.insert(
            TypeId::of::<T>(),
            Arc::new(move || Box::new(constructor()) as Box<dyn Any + Send>),
        );
    }

    /// Register a record type and build its field table eagerly
    pub fn register_record<R: Record>(&self) {
        self.register::<R, _>(R::default);
        self.fields::<R>();
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.constructors.contains_key(&TypeId::of::<T>())
    }

    /// Construct a `T`, preferring the registered constructor
    pub fn create<T: Default + 'static>(&self) -> T {
        let constructor = self
            .constructors
            .get(&TypeId::of::<T>())
            .map(|entry| Arc::clone(entry.value()));
        if let Some(constructor) = constructor {
            match constructor().downcast::<T>() {
                Ok(value) => return *value,
                Err(_) => {
                    tracing::warn!(ty = type_name::<T>(), "registered constructor returned another type");
                }
            }
        } else if cfg!(debug_assertions) {
            tracing::debug!(ty = type_name::<T>(), "no registered constructor, using Default");
        }
        T::default()
    }

    /// Field table for `R`, built on first use and cached by type identity
    pub fn fields<R: Record>(&self) -> Arc<FieldTable<R>> {
        let erased = self
            .tables
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Arc::new(FieldTable::<R>::build()) as Arc<dyn Any + Send + Sync>)
            .value()
            .clone();
        match erased.downcast::<FieldTable<R>>() {
            Ok(table) => table,
            // TypeId collisions are impossible; rebuild rather than panic
            Err(_) => Arc::new(FieldTable::<R>::build()),
        }
    }

    pub fn is_cached<R: 'static>(&self) -> bool {
        self.tables.contains_key(&TypeId::of::<R>())
    }

    /// Drop every cached field table
    pub fn clear_cache(&self) {
        self.tables.clear();
    }

    pub fn cached_tables(&self) -> usize {
        self.tables.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{PrimitiveCore, TaggedCore};

    #[test]
    fn create_uses_registered_constructor() {
        let registry = Registry::new();
        registry.register::<String, _>(|| "preset".to_string());

        assert!(registry.is_registered::<String>());
        assert_eq!(registry.create::<String>(), "preset");
    }

    #[test]
    fn create_falls_back_to_default() {
        let registry = Registry::new();
        assert!(!registry.is_registered::<Vec<u8>>());
        assert!(registry.create::<Vec<u8>>().is_empty());
    }

    #[test]
    fn register_record_builds_table_eagerly() {
        let registry = Registry::new();
        assert!(!registry.is_cached::<PrimitiveCore>());

        registry.register_record::<PrimitiveCore>();

        assert!(registry.is_registered::<PrimitiveCore>());
        assert!(registry.is_cached::<PrimitiveCore>());
    }

    #[test]
    fn fields_are_cached_by_type() {
        let registry = Registry::new();
        let first = registry.fields::<PrimitiveCore>();
        let second = registry.fields::<PrimitiveCore>();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached_tables(), 1);

        registry.clear_cache();
        assert_eq!(registry.cached_tables(), 0);
        assert!(!Arc::ptr_eq(&first, &registry.fields::<PrimitiveCore>()));
    }

    #[test]
    fn descriptors_follow_declaration_order_and_required_rules() {
        let registry = Registry::new();
        let table = registry.fields::<TaggedCore>();
        let descriptors = table.descriptors();

        let summary: Vec<(&str, bool, bool)> = descriptors
            .iter()
            .map(|d| (d.key, d.required, d.is_extension))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("name", true, false),
                ("description", false, false),
                ("aliases", false, false),
                ("priority", false, false),
                ("x-*", false, true),
            ]
        );
        assert_eq!(table.index_of_key("aliases"), Some(2));
        assert_eq!(table.index_of_name("priority"), Some(3));
        assert!(table.has_extensions());
        assert!(!table.has_embedded_map());
    }

    #[test]
    fn concurrent_reads_share_one_table() {
        use std::thread;

        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.fields::<PrimitiveCore>())
            })
            .collect();

        let tables: Vec<Arc<FieldTable<PrimitiveCore>>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for table in &tables[1..] {
            assert!(Arc::ptr_eq(&tables[0], table));
        }
    }
}
