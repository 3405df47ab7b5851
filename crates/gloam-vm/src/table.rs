//! Hybrid array/hash table
//!
//! Positive integer keys that extend the array part contiguously live in a
//! dense vector; everything else lives in an insertion-ordered hash map, so
//! traversal order is deterministic. Clearing a hash entry leaves a nil
//! tombstone in place so a traversal can continue from that key; tombstones
//! are compacted away when a new key is inserted.

use crate::error::VmError;
use crate::sync::{shared, Arc, Shared};
use crate::value::{float_to_integer, Value};
use indexmap::IndexMap;
use std::fmt;
use std::hash::{Hash, Hasher};

pub type TableRef = Shared<Table>;

/// Create a fresh shared table
pub fn new_table() -> TableRef {
    shared(Table::new())
}

/// Normalized hash key: integral floats become integers, nil and NaN are
/// rejected, reference kinds hash by identity
#[derive(Clone)]
pub struct TableKey(Value);

impl TableKey {
    pub fn new(key: Value) -> Result<Self, VmError> {
        match key {
            Value::Nil => Err(VmError::InvalidKey("nil")),
            Value::Float(f) if f.is_nan() => Err(VmError::InvalidKey("NaN")),
            Value::Float(f) => Ok(TableKey(
                float_to_integer(f).map(Value::Integer).unwrap_or(Value::Float(f)),
            )),
            other => Ok(TableKey(other)),
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.raw_equal(&other.0)
    }
}

impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Nil => 0u8.hash(state),
            Value::Boolean(b) => (1u8, b).hash(state),
            Value::Integer(i) => (2u8, i).hash(state),
            Value::Float(f) => (3u8, f.to_bits()).hash(state),
            Value::String(s) => (4u8, &**s).hash(state),
            other => (5u8, other.ptr_id()).hash(state),
        }
    }
}

#[derive(Default)]
pub struct Table {
    array: Vec<Value>,
    hash: IndexMap<TableKey, Value>,
    /// Hash entries holding nil
    tombstones: usize,
    metatable: Option<TableRef>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(array: usize, hash: usize) -> Self {
        Self {
            array: Vec::with_capacity(array),
            hash: IndexMap::with_capacity(hash),
            tombstones: 0,
            metatable: None,
        }
    }

    /// Build a sequence from a list of values
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut table = Table::new();
        for (i, v) in values.into_iter().enumerate() {
            table.set_int(i as i64 + 1, v);
        }
        table
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }

    /// Raw read; missing keys (and nil or NaN keys) read as nil
    pub fn get(&self, key: &Value) -> Value {
        match key {
            Value::Integer(i) => self.get_int(*i),
            Value::Float(f) => match float_to_integer(*f) {
                Some(i) => self.get_int(i),
                None if f.is_nan() => Value::Nil,
                None => self.hash.get(&TableKey(key.clone())).cloned().unwrap_or_default(),
            },
            Value::Nil => Value::Nil,
            _ => self.hash.get(&TableKey(key.clone())).cloned().unwrap_or_default(),
        }
    }

    pub fn get_int(&self, i: i64) -> Value {
        if i >= 1 && (i as u64) <= self.array.len() as u64 {
            return self.array[(i - 1) as usize].clone();
        }
        self.hash
            .get(&TableKey(Value::Integer(i)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.get(&Value::string(key))
    }

    /// Raw write; assigning nil deletes the key
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), VmError> {
        let key = TableKey::new(key)?;
        match key.0 {
            Value::Integer(i) => {
                self.set_int(i, value);
                Ok(())
            }
            _ => {
                self.set_hashed(key, value);
                Ok(())
            }
        }
    }

    pub fn set_str(&mut self, key: &str, value: Value) {
        self.set_hashed(TableKey(Value::string(key)), value);
    }

    pub fn set_int(&mut self, i: i64, value: Value) {
        let len = self.array.len();
        if i >= 1 && (i as u64) <= len as u64 {
            self.array[(i - 1) as usize] = value;
            return;
        }
        if i as u64 == len as u64 + 1 && i >= 1 && !value.is_nil() {
            self.remove_hashed(&TableKey(Value::Integer(i)));
            self.array.push(value);
            self.migrate_from_hash();
            return;
        }
        self.set_hashed(TableKey(Value::Integer(i)), value);
    }

    fn set_hashed(&mut self, key: TableKey, value: Value) {
        match self.hash.get_mut(&key) {
            Some(slot) => {
                match (slot.is_nil(), value.is_nil()) {
                    (false, true) => self.tombstones += 1,
                    (true, false) => self.tombstones -= 1,
                    _ => {}
                }
                *slot = value;
            }
            None if value.is_nil() => {}
            None => {
                if self.tombstones > 0 {
                    self.compact();
                }
                self.hash.insert(key, value);
            }
        }
    }

    /// Drop `key` from the hash part, returning its value unless it was a
    /// tombstone
    fn remove_hashed(&mut self, key: &TableKey) -> Option<Value> {
        let value = self.hash.shift_remove(key)?;
        if value.is_nil() {
            self.tombstones -= 1;
            return None;
        }
        Some(value)
    }

    fn compact(&mut self) {
        self.hash.retain(|_, v| !v.is_nil());
        self.tombstones = 0;
    }

    // Pull keys that now continue the array out of the hash part
    fn migrate_from_hash(&mut self) {
        while !self.hash.is_empty() {
            let next = TableKey(Value::Integer(self.array.len() as i64 + 1));
            match self.remove_hashed(&next) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }

    /// Border of the sequence part (the `#` operator without metamethods)
    pub fn len(&self) -> usize {
        let mut n = self.array.len();
        while n > 0 && self.array[n - 1].is_nil() {
            n -= 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.hash_len() == 0
    }

    pub fn array_len(&self) -> usize {
        self.array.len()
    }

    /// Live entries in the hash part
    pub fn hash_len(&self) -> usize {
        self.hash.len() - self.tombstones
    }

    /// Traversal step: array part in index order, then hash part in
    /// insertion order. `Ok(None)` ends the traversal.
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, VmError> {
        let start = match key {
            Value::Nil => 0,
            _ => self.position_after(key)?,
        };
        for i in start..self.array.len() {
            if !self.array[i].is_nil() {
                return Ok(Some((Value::Integer(i as i64 + 1), self.array[i].clone())));
            }
        }
        let hash_start = start.saturating_sub(self.array.len());
        Ok(self
            .hash
            .iter()
            .skip(hash_start)
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.0.clone(), v.clone())))
    }

    // Combined position (array slots first) of the entry following `key`
    fn position_after(&self, key: &Value) -> Result<usize, VmError> {
        let normalized = TableKey::new(key.clone())?;
        if let Value::Integer(i) = normalized.0 {
            if i >= 1 && (i as u64) <= self.array.len() as u64 {
                return Ok(i as usize);
            }
        }
        match self.hash.get_index_of(&normalized) {
            Some(idx) => Ok(self.array.len() + idx + 1),
            None => Err(VmError::Runtime("invalid key to 'next'".to_string())),
        }
    }

    /// Snapshot of the sequence part `1..=len()`
    pub fn sequence(&self) -> Vec<Value> {
        self.array[..self.len()].to_vec()
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("array", &self.array)
            .field(
                "hash",
                &self
                    .hash
                    .iter()
                    .filter(|(_, v)| !v.is_nil())
                    .map(|(k, v)| (k.0.clone(), v.clone()))
                    .collect::<Vec<_>>(),
            )
            .field("has_metatable", &self.metatable.is_some())
            .finish()
    }
}

/// True when both references name the same table
pub fn same_table(a: &TableRef, b: &TableRef) -> bool {
    Arc::ptr_eq(a, b)
}
