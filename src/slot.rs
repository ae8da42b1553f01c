//! Field slots: a decoded value plus where it came from
//!
//! Every record field is a `Slot<T>`. Besides the value it keeps the AST key
//! and value nodes it was decoded from (so diagnostics can point at them and
//! sync can update them in place) and whether the key appeared at all.

use crate::ast::{Kind, NodeRef, Tag};
use crate::decode::{Bind, Decoded, Decoder};
use crate::error::Result;
use crate::sequenced_map::{MapKey, SequencedMap};
use crate::sync::{SyncCore, SyncCtx};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slot<T> {
    /// Wire key text
    pub key: String,
    pub key_node: Option<NodeRef>,
    pub value: T,
    /// Original value node, alias nodes kept unresolved
    pub value_node: Option<NodeRef>,
    /// True iff the key appeared in the source
    pub present: bool,
}

impl<T> Slot<T> {
    /// Slot holding `value` with no source nodes, marked absent
    pub fn detached(value: T) -> Self {
        Self {
            key: String::new(),
            key_node: None,
            value,
            value_node: None,
            present: false,
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Key node, or `root` when the slot has none (e.g. a missing field)
    pub fn key_node_or(&self, root: &NodeRef) -> NodeRef {
        self.key_node.clone().unwrap_or_else(|| root.clone())
    }

    pub fn value_node_or(&self, root: &NodeRef) -> NodeRef {
        self.value_node.clone().unwrap_or_else(|| root.clone())
    }

    fn clear_nodes(&mut self) {
        self.key_node = None;
        self.value_node = None;
        self.present = false;
    }
}

impl<T: Bind> Slot<T> {
    /// Decode `value` into a present slot
    pub fn decode(ctx: &Decoder<'_>, key: Option<&NodeRef>, value: &NodeRef) -> Result<Decoded<Self>> {
        let (decoded, errors) = ctx.decode_value::<T>(value)?;
        let slot = Self {
            key: key.map(|k| k.resolve().value()).unwrap_or_default(),
            key_node: key.cloned(),
            value: decoded,
            value_node: Some(value.clone()),
            present: true,
        };
        Ok((slot, errors))
    }

    /// Write `source` into this slot and its nodes
    ///
    /// Existing key and value nodes are updated in place (style kept);
    /// missing ones are created. Returns the key/value nodes, or `None` when
    /// the source is unset and the entry should disappear.
    pub fn sync<D: SyncCore<T>>(
        &mut self,
        ctx: &SyncCtx<'_>,
        key: &str,
        source: &mut D,
    ) -> Result<Option<(NodeRef, NodeRef)>> {
        let prior = self.value_node.clone();
        match source.sync_core(ctx, &mut self.value, prior.as_ref())? {
            Some(value_node) => {
                let key_node = match self.key_node.take() {
                    Some(node) if node.resolve().value() == key => node,
                    Some(node) if node.is_kind(Kind::Scalar) => {
                        node.set_scalar(key, Tag::Str);
                        node
                    }
                    _ => NodeRef::string(key),
                };
                self.key = key.to_string();
                self.key_node = Some(key_node.clone());
                self.value_node = Some(value_node.clone());
                self.present = true;
                Ok(Some((key_node, value_node)))
            }
            None => {
                self.clear_nodes();
                Ok(None)
            }
        }
    }
}

impl Slot<NodeRef> {
    /// Raw capture: value is the resolved node, `value_node` the original
    pub fn capture(key: &NodeRef, value: &NodeRef) -> Self {
        Self {
            key: key.resolve().value(),
            key_node: Some(key.clone()),
            value: value.resolve(),
            value_node: Some(value.clone()),
            present: true,
        }
    }
}

impl<T> Slot<Vec<T>> {
    /// Node of element `index`, falling back to the sequence then to `root`
    pub fn index_value_node_or(&self, index: usize, root: &NodeRef) -> NodeRef {
        let Some(sequence) = &self.value_node else {
            return root.clone();
        };
        sequence
            .resolve()
            .content()
            .get(index)
            .cloned()
            .unwrap_or_else(|| sequence.clone())
    }
}

impl<K: MapKey, V> Slot<SequencedMap<K, V>> {
    fn map_entry(&self, key: &K) -> Option<(NodeRef, NodeRef)> {
        self.value_node
            .as_ref()
            .and_then(|mapping| mapping.resolve().get(&key.to_wire()))
    }

    /// Key node of map entry `key`, falling back to the map then to `root`
    pub fn map_key_node_or(&self, key: &K, root: &NodeRef) -> NodeRef {
        self.map_entry(key)
            .map(|(k, _)| k)
            .unwrap_or_else(|| self.value_node_or(root))
    }

    pub fn map_value_node_or(&self, key: &K, root: &NodeRef) -> NodeRef {
        self.map_entry(key)
            .map(|(_, v)| v)
            .unwrap_or_else(|| self.value_node_or(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::load_str;

    fn first_pair(text: &str) -> (NodeRef, NodeRef) {
        let doc = load_str(text).unwrap();
        doc.content()[0].pairs()[0].clone()
    }

    #[test]
    fn decode_marks_present_and_keeps_nodes() {
        let (key, value) = first_pair("title: Demo\n");
        let decoder = Decoder::default();

        let (slot, errors) = Slot::<String>::decode(&decoder, Some(&key), &value).unwrap();

        assert!(errors.is_empty());
        assert!(slot.is_present());
        assert_eq!(slot.key, "title");
        assert_eq!(slot.value, "Demo");
        assert!(slot.value_node.unwrap().ptr_eq(&value));
    }

    #[test]
    fn missing_slot_falls_back_to_root() {
        let root = NodeRef::mapping(Vec::<(String, NodeRef)>::new()).at(4, 2);
        let slot: Slot<String> = Slot::default();

        assert!(!slot.is_present());
        assert!(slot.key_node_or(&root).ptr_eq(&root));
        assert!(slot.value_node_or(&root).ptr_eq(&root));
    }

    #[test]
    fn index_and_map_accessors_locate_children() {
        let doc = load_str("items:\n  - a\n  - b\nmeta:\n  owner: me\n").unwrap();
        let root = doc.content()[0].clone();
        let decoder = Decoder::default();
        let pairs = root.pairs();

        let (items, _) = Slot::<Vec<String>>::decode(&decoder, Some(&pairs[0].0), &pairs[0].1).unwrap();
        assert_eq!(items.index_value_node_or(1, &root).value(), "b");
        assert!(items.index_value_node_or(5, &root).ptr_eq(&pairs[0].1));

        let (meta, _) =
            Slot::<SequencedMap<String, String>>::decode(&decoder, Some(&pairs[1].0), &pairs[1].1).unwrap();
        let owner = "owner".to_string();
        assert_eq!(meta.map_key_node_or(&owner, &root).value(), "owner");
        assert_eq!(meta.map_value_node_or(&owner, &root).value(), "me");
        assert!(meta
            .map_value_node_or(&"missing".to_string(), &root)
            .ptr_eq(&pairs[1].1));
    }

    #[test]
    fn sync_updates_existing_nodes_in_place() {
        let (key, value) = first_pair("title: 'Old'\n");
        let decoder = Decoder::default();
        let (mut slot, _) = Slot::<String>::decode(&decoder, Some(&key), &value).unwrap();
        let ctx = SyncCtx::default();

        let mut source = "New".to_string();
        let (key_node, value_node) = slot.sync(&ctx, "title", &mut source).unwrap().unwrap();

        assert!(key_node.ptr_eq(&key));
        assert!(value_node.ptr_eq(&value));
        assert_eq!(value.value(), "New");
        assert_eq!(value.style(), crate::ast::Style::SingleQuoted);
        assert_eq!(slot.value, "New");
    }

    #[test]
    fn sync_of_unset_optional_clears_slot() {
        let (key, value) = first_pair("note: hi\n");
        let decoder = Decoder::default();
        let (mut slot, _) = Slot::<Option<String>>::decode(&decoder, Some(&key), &value).unwrap();
        let ctx = SyncCtx::default();

        let mut source: Option<String> = None;
        assert!(slot.sync(&ctx, "note", &mut source).unwrap().is_none());
        assert!(!slot.present);
        assert!(slot.value.is_none());
        assert!(slot.value_node.is_none());
    }
}
