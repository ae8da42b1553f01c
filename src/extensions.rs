//! Vendor extensions (`x-` keys)
//!
//! Records capture `x-` entries they do not declare as raw nodes. The core
//! side keeps full slots (key/value nodes for in-place sync); the domain
//! side is a plain ordered map of nodes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ast::{self, NodeRef};
use crate::error::Result;
use crate::sequenced_map::SequencedMap;
use crate::slot::Slot;

/// Extensions as decoded into a record
pub type CoreExtensions = SequencedMap<String, Slot<NodeRef>>;

/// Extensions as seen by a domain object
pub type Extensions = SequencedMap<String, NodeRef>;

/// Deserialize extension `key` into `T`
pub fn get_extension<T: DeserializeOwned>(extensions: &Extensions, key: &str) -> Option<Result<T>> {
    let node = extensions.get(&key.to_string())?;
    Some(ast::to_value(node).and_then(|value| Ok(serde_yaml::from_value(value)?)))
}

/// Serialize `value` into extension `key`
pub fn set_extension<T: Serialize>(extensions: &mut Extensions, key: &str, value: &T) -> Result<()> {
    let value = serde_yaml::to_value(value)?;
    extensions.set(key.to_string(), ast::from_value(&value));
    Ok(())
}

/// Diff `source` into `core` and the record `mapping`
///
/// Surviving keys keep their position and key node, new keys are appended,
/// keys missing from `source` are deleted from both sides.
pub(crate) fn sync_extensions(mapping: &NodeRef, source: &Extensions, core: &mut CoreExtensions) {
    if !source.is_initialized() && !core.is_initialized() {
        return;
    }

    for (key, node) in source.iter() {
        match core.get_mut(key) {
            Some(slot) => {
                let key_node = slot
                    .key_node
                    .clone()
                    .unwrap_or_else(|| NodeRef::string(key.as_str()));
                // an untouched value keeps its original (possibly alias) node
                let value_node = match &slot.value_node {
                    Some(original) if slot.value.ptr_eq(node) => original.clone(),
                    _ => node.clone(),
                };
                mapping.splice(&key_node, value_node.clone());
                slot.value = node.clone();
                slot.value_node = Some(value_node);
                slot.key_node = Some(key_node);
                slot.present = true;
            }
            None => {
                let key_node = NodeRef::string(key.as_str());
                mapping.splice(&key_node, node.clone());
                core.set(
                    key.clone(),
                    Slot {
                        key: key.clone(),
                        key_node: Some(key_node),
                        value: node.clone(),
                        value_node: Some(node.clone()),
                        present: true,
                    },
                );
            }
        }
    }

    let stale: Vec<String> = core
        .keys()
        .filter(|key| !source.contains_key(key))
        .cloned()
        .collect();
    for key in stale {
        core.delete(&key);
        mapping.remove(&key);
    }

    if source.is_initialized() {
        core.init();
    } else {
        core.reset();
    }
}
