//! Order-preserving map with typed and type-erased access
//!
//! Iteration order is insertion order; setting an existing key replaces its
//! value in place (last write wins, position kept). A map distinguishes
//! "never initialized" from "initialized but empty" so sync can tell an
//! absent map from an explicit `{}`.

use std::any::{type_name, Any};
use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::{BindError, Result};

/// Keys usable in a [`SequencedMap`]: anything with a wire-string form
pub trait MapKey: Clone + Eq + Hash + Send + Sync + fmt::Debug + 'static {
    fn from_wire(wire: &str) -> std::result::Result<Self, String>;
    fn to_wire(&self) -> String;
}

impl MapKey for String {
    fn from_wire(wire: &str) -> std::result::Result<Self, String> {
        Ok(wire.to_string())
    }

    fn to_wire(&self) -> String {
        self.clone()
    }
}

impl MapKey for i64 {
    fn from_wire(wire: &str) -> std::result::Result<Self, String> {
        crate::ast::scalar::parse_int(wire)
            .and_then(|v| i64::try_from(v).ok())
            .ok_or_else(|| format!("'{}' is not an integer key", wire))
    }

    fn to_wire(&self) -> String {
        self.to_string()
    }
}

#[derive(Clone, PartialEq)]
pub struct SequencedMap<K: MapKey, V> {
    entries: IndexMap<K, V>,
    initialized: bool,
}

impl<K: MapKey, V> SequencedMap<K, V> {
    /// Uninitialized map (the "absent" state)
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            initialized: false,
        }
    }

    /// Initialized, empty map
    pub fn empty() -> Self {
        let mut map = Self::new();
        map.init();
        map
    }

    /// Mark the map initialized; idempotent
    pub fn init(&mut self) {
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Insert or replace; initializes the map
    pub fn set(&mut self, key: K, value: V) {
        self.initialized = true;
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a key, keeping the order of the rest
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.entries.iter_mut()
    }

    /// Drop all entries and return to the uninitialized state
    pub fn reset(&mut self) {
        self.entries.clear();
        self.initialized = false;
    }

    pub fn key_type(&self) -> &'static str {
        type_name::<K>()
    }

    pub fn value_type(&self) -> &'static str {
        type_name::<V>()
    }
}

impl<K: MapKey, V> Default for SequencedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MapKey, V: fmt::Debug> fmt::Debug for SequencedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.initialized {
            return write!(f, "SequencedMap(nil)");
        }
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K: MapKey, V> FromIterator<(K, V)> for SequencedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::empty();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

impl<K: MapKey, V> IntoIterator for SequencedMap<K, V> {
    type Item = (K, V);
    type IntoIter = indexmap::map::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Type-erased view used by generic algorithms that only know "some map"
pub trait UntypedMap: Send + Sync {
    fn is_initialized(&self) -> bool;
    fn init(&mut self);
    fn len(&self) -> usize;
    /// Entries in order, keys in wire form
    fn all_untyped(&self) -> Vec<(String, &dyn Any)>;
    /// Set from a wire key and a boxed value of the map's value type
    fn set_untyped(&mut self, key: &str, value: Box<dyn Any>) -> Result<()>;
    fn delete_untyped(&mut self, key: &str) -> bool;
    fn key_type(&self) -> &'static str;
    fn value_type(&self) -> &'static str;
}

impl<K: MapKey, V: Send + Sync + 'static> UntypedMap for SequencedMap<K, V> {
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn init(&mut self) {
        SequencedMap::init(self)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn all_untyped(&self) -> Vec<(String, &dyn Any)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_wire(), v as &dyn Any))
            .collect()
    }

    fn set_untyped(&mut self, key: &str, value: Box<dyn Any>) -> Result<()> {
        let key = K::from_wire(key).map_err(|_| BindError::conversion("wire key", type_name::<K>(), key))?;
        let value = value.downcast::<V>().map_err(|_| {
            BindError::structural(format!(
                "set_untyped expected a {} value",
                type_name::<V>()
            ))
        })?;
        self.set(key, *value);
        Ok(())
    }

    fn delete_untyped(&mut self, key: &str) -> bool {
        match K::from_wire(key) {
            Ok(key) => self.delete(&key).is_some(),
            Err(_) => false,
        }
    }

    fn key_type(&self) -> &'static str {
        type_name::<K>()
    }

    fn value_type(&self) -> &'static str {
        type_name::<V>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_follows_insertion_order() {
        let mut map = SequencedMap::new();
        for key in ["zeta", "alpha", "mid"] {
            map.set(key.to_string(), key.len());
        }
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn last_write_wins_in_place() {
        let mut map = SequencedMap::new();
        map.set("a".to_string(), 1);
        map.set("b".to_string(), 2);
        map.set("a".to_string(), 3);

        assert_eq!(map.len(), 2);
        assert_eq!(map.iter().next(), Some((&"a".to_string(), &3)));
    }

    #[test]
    fn delete_keeps_remaining_order() {
        let mut map: SequencedMap<String, i32> =
            [("a", 1), ("b", 2), ("c", 3)].into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        map.delete(&"b".to_string());
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn init_is_idempotent_and_distinct_from_default() {
        let mut map: SequencedMap<String, i32> = SequencedMap::default();
        assert!(!map.is_initialized());
        map.init();
        map.init();
        assert!(map.is_initialized());
        assert!(map.is_empty());
    }

    #[test]
    fn untyped_access_round_trips_through_wire_keys() {
        let mut map: SequencedMap<i64, String> = SequencedMap::new();
        let untyped: &mut dyn UntypedMap = &mut map;

        untyped.set_untyped("42", Box::new("answer".to_string())).unwrap();
        assert!(untyped.set_untyped("x", Box::new("bad".to_string())).is_err());
        assert!(untyped.set_untyped("7", Box::new(7u8)).is_err());

        let all = untyped.all_untyped();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "42");
        assert_eq!(all[0].1.downcast_ref::<String>().unwrap(), "answer");
        assert_eq!(map.get(&42).map(String::as_str), Some("answer"));
    }

    #[test]
    fn type_names_are_exposed() {
        let map: SequencedMap<String, bool> = SequencedMap::new();
        assert!(map.key_type().ends_with("String"));
        assert_eq!(map.value_type(), "bool");
    }
}
