//! Document-bound records
//!
//! A record is a struct of [`Slot`](crate::Slot) fields plus a
//! [`RecordMeta`]: the mapping node it was decoded from and its validity.
//! Records are declared with the [`record!`](crate::record) macro, which
//! wires the field table and delegates decoding to [`decode_record`].

use tracing::debug;

use crate::ast::{Kind, NodeRef};
use crate::decode::{kind_mismatch, scan_keys, Bind, Decoded, Decoder};
use crate::error::Result;
use crate::errors::{ValidationError, ValidationErrorKind};
use crate::jsonpointer;
use crate::registry::{FieldDecoded, FieldDescriptor, FieldDef, EmbeddedAccess, Registry};
use crate::sequenced_map::UntypedMap;

/// Root node and validity of a decoded record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMeta {
    pub root_node: Option<NodeRef>,
    /// Syntax valid and every required field present
    pub valid: bool,
    /// No type mismatch among this record's own fields
    pub valid_syntax: bool,
    /// Keys with no field, extension or embedded-map home
    pub unknown_properties: Vec<String>,
}

pub trait Record: Bind {
    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Declared fields in order (built once per registry)
    fn field_defs() -> Vec<FieldDef<Self>>;

    fn embedded_def() -> Option<Box<dyn EmbeddedAccess<Self>>> {
        None
    }

    fn is_valid(&self) -> bool {
        self.meta().valid
    }

    fn root(&self) -> Option<NodeRef> {
        self.meta().root_node.clone()
    }

    /// JSON Pointer of this record's root within `document`
    fn json_pointer(&self, document: &NodeRef) -> Option<String> {
        let root = self.meta().root_node.as_ref()?;
        jsonpointer::locate(document, root)
    }

    /// Field metadata, in declaration order
    fn descriptors() -> Vec<FieldDescriptor> {
        Registry::global().fields::<Self>().descriptors()
    }

    /// The embedded map, type-erased
    fn embedded_map(&self) -> Option<&dyn UntypedMap> {
        let table = Registry::global().fields::<Self>();
        let embedded = table.embedded.as_ref()?;
        Some(embedded.untyped(self))
    }
}

/// A plain domain struct backed by a record
///
/// The domain struct owns a clone of its record in a `core` field; populate
/// reads from it and sync writes the patched record back into it. Models
/// declared with [`model!`](crate::model) also implement
/// [`FromCore`](crate::FromCore) and [`SyncCore`](crate::SyncCore) against
/// their core.
pub trait Model: Default + Sized {
    type Core: Record;

    fn core(&self) -> &Self::Core;

    fn core_mut(&mut self) -> &mut Self::Core;
}

enum Entry<R> {
    Superseded,
    Field(FieldDecoded<R>),
    Embedded,
    AnchorOnly,
    Unknown(String),
}

fn has_own_mismatch(errors: &[ValidationError]) -> bool {
    errors.iter().any(|e| e.is_type_mismatch() && !e.nested)
}

/// Decode a mapping node into record `R`
///
/// Entries are decoded concurrently; their results are applied afterwards
/// in document order so the record and its diagnostics are deterministic.
pub fn decode_record<R: Record>(ctx: &Decoder<'_>, node: &NodeRef) -> Result<Decoded<R>> {
    let mut record: R = ctx.registry().create::<R>();
    if !node.is_kind(Kind::Mapping) {
        return Ok((record, vec![kind_mismatch::<R>(node, Kind::Mapping)]));
    }
    record.meta_mut().root_node = Some(node.clone());

    let table = ctx.registry().fields::<R>();
    let pairs = node.pairs();
    let scan = scan_keys(&pairs);
    let superseded = &scan.superseded;
    let fields = &table;

    let entries = ctx.fan_out(&pairs, |ctx, index, (key_node, value_node)| {
        if superseded[index] {
            return Ok(Entry::Superseded);
        }
        let key = key_node.resolve().value();
        if let Some(field) = fields.index_of_key(&key) {
            let decoded = (fields.fields[field].decode)(ctx, key_node, value_node)?;
            return Ok(Entry::Field(decoded));
        }
        if let Some(field) = fields.extensions.filter(|_| key.starts_with("x-")) {
            let decoded = (fields.fields[field].decode)(ctx, key_node, value_node)?;
            return Ok(Entry::Field(decoded));
        }
        if fields.embedded.is_some() {
            // `&anchor` definitions are merge material, not entries
            if !value_node.is_kind(Kind::Alias) && !value_node.anchor().is_empty() {
                return Ok(Entry::AnchorOnly);
            }
            return Ok(Entry::Embedded);
        }
        Ok(Entry::Unknown(key))
    })?;

    let mut errors = scan.warnings;
    let mut own_mismatch = false;
    let mut embedded_pairs = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        match entry {
            Entry::Field(decoded) => {
                own_mismatch |= has_own_mismatch(&decoded.errors);
                errors.extend(decoded.errors);
                (decoded.assign)(&mut record);
            }
            Entry::Embedded => embedded_pairs.push(pairs[index].clone()),
            Entry::Unknown(key) => {
                debug!(record = crate::decode::short_type_name::<R>(), key = %key, "unknown property");
                record.meta_mut().unknown_properties.push(key);
            }
            Entry::Superseded | Entry::AnchorOnly => {}
        }
    }

    if let Some(embedded) = &table.embedded {
        let decoded = embedded.decode(ctx, &embedded_pairs)?;
        own_mismatch |= has_own_mismatch(&decoded.errors);
        errors.extend(decoded.errors);
        (decoded.assign)(&mut record);
    }

    let missing = table.missing_required(&record);
    for key in &missing {
        errors.push(ValidationError::at(
            ValidationErrorKind::MissingRequiredField,
            format!("field {} is missing", key),
            node,
        ));
    }

    let meta = record.meta_mut();
    meta.valid_syntax = !own_mismatch;
    meta.valid = meta.valid_syntax && missing.is_empty();

    // the enclosing record must not count these against its own syntax
    for error in &mut errors {
        error.nested = true;
    }
    Ok((record, errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::BindLimits;
    use crate::test_fixtures::{PathsCore, PrimitiveCore, TaggedCore};
    use pretty_assertions::assert_eq;

    fn decode_text<R: Record>(text: &str) -> Decoded<R> {
        let registry = Registry::new();
        Decoder::new(&registry)
            .with_limits(BindLimits::testing())
            .decode_str::<R>(text)
            .unwrap()
    }

    #[test]
    fn complete_record_is_valid() {
        let (record, errors) = decode_text::<PrimitiveCore>(
            "stringField: hello\nboolField: true\nintField: 42\nfloatField: 1.5\n",
        );
        assert!(errors.is_empty());
        assert!(record.meta.valid);
        assert!(record.meta.valid_syntax);
        assert_eq!(record.string_field.value, "hello");
        assert_eq!(record.int_field.value, 42);
    }

    #[test]
    fn missing_fields_reported_at_record_position() {
        let (record, errors) = decode_text::<PrimitiveCore>("stringField: hello\nboolField: true\n");

        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["field intField is missing", "field floatField is missing"]);
        assert!(errors.iter().all(|e| (e.line, e.column) == (1, 1)));
        assert!(record.meta.valid_syntax);
        assert!(!record.meta.valid);
    }

    #[test]
    fn type_mismatch_invalidates_syntax() {
        let (record, errors) = decode_text::<PrimitiveCore>(
            "stringField: hello\nboolField: maybe\nintField: 1\nfloatField: 2.0\n",
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 2);
        assert!(!record.meta.valid_syntax);
        assert!(!record.meta.valid);
        assert!(record.bool_field.present);
    }

    #[test]
    fn non_mapping_root_is_a_single_mismatch() {
        let (record, errors) = decode_text::<PrimitiveCore>("- a\n- b\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_type_mismatch());
        assert!(record.meta.root_node.is_none());
        assert!(!record.meta.valid);
    }

    #[test]
    fn extensions_and_unknown_keys() {
        let (record, errors) = decode_text::<TaggedCore>(
            "name: pets\nx-owner: team\nstray: 1\nx-rank: 2\n",
        );
        assert!(errors.is_empty());
        let keys: Vec<&String> = record.extensions.keys().collect();
        assert_eq!(keys, vec!["x-owner", "x-rank"]);
        assert_eq!(record.meta.unknown_properties, vec!["stray".to_string()]);
        assert!(record.meta.valid);
    }

    #[test]
    fn duplicate_field_warning_precedes_other_errors() {
        let (record, errors) = decode_text::<TaggedCore>("name: a\npriority: x\nname: b\n");

        assert_eq!(errors[0].kind, ValidationErrorKind::DuplicateKey);
        assert_eq!(errors[0].line, 3);
        assert!(errors[1].is_type_mismatch());
        assert_eq!(record.name.value, "b");
    }

    #[test]
    fn anchored_embedded_entries_are_skipped_but_aliases_kept() {
        let (record, errors) = decode_text::<PathsCore>(
            "/base: &shared\n  summary: shared\n/pets: *shared\n/users:\n  summary: users\n",
        );

        assert!(errors.is_empty());
        let keys: Vec<&String> = record.items.keys().collect();
        assert_eq!(keys, vec!["/pets", "/users"]);
        let pets = record.items.get(&"/pets".to_string()).unwrap();
        assert_eq!(pets.summary.value.as_deref(), Some("shared"));
    }

    #[test]
    fn nested_errors_are_marked_nested() {
        let (_, errors) = decode_text::<PrimitiveCore>("stringField: [1]\n");
        assert!(errors.iter().all(|e| e.nested));
    }
}
