//! Shared value stack
//!
//! One growable arena per execution unit. Frames address it through a base
//! offset; upvalue brokers keep a handle to it while they are open, so the
//! arena is reference counted and never borrowed across a call.

use crate::error::VmError;
use crate::sync::{Arc, Mutex};
use crate::value::Value;

#[derive(Clone)]
pub struct ValueStack {
    slots: Arc<Mutex<Vec<Value>>>,
    max_slots: usize,
}

impl ValueStack {
    pub fn new(initial_slots: usize, max_slots: usize) -> Self {
        let initial = initial_slots.clamp(1, max_slots.max(1));
        Self {
            slots: Arc::new(Mutex::new(vec![Value::Nil; initial])),
            max_slots,
        }
    }

    /// Read a slot; slots past the end read as nil
    #[inline]
    pub fn get(&self, index: usize) -> Value {
        self.slots.lock().get(index).cloned().unwrap_or_default()
    }

    /// Write a slot, growing the arena when needed
    #[inline]
    pub fn set(&self, index: usize, value: Value) -> Result<(), VmError> {
        let mut slots = self.slots.lock();
        Self::grow(&mut slots, index, self.max_slots)?;
        slots[index] = value;
        Ok(())
    }

    /// Make sure `index` is addressable, doubling the arena up to the limit
    pub fn ensure_capacity(&self, index: usize) -> Result<(), VmError> {
        let mut slots = self.slots.lock();
        Self::grow(&mut slots, index, self.max_slots)
    }

    fn grow(slots: &mut Vec<Value>, index: usize, max_slots: usize) -> Result<(), VmError> {
        if index < slots.len() {
            return Ok(());
        }
        if index >= max_slots {
            return Err(VmError::StackOverflow);
        }
        let mut size = slots.len().max(1);
        while size <= index {
            size *= 2;
        }
        let size = size.min(max_slots);
        tracing::trace!(from = slots.len(), to = size, "growing value stack");
        slots.resize(size, Value::Nil);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Copy out `len` slots starting at `start`
    pub fn read_range(&self, start: usize, len: usize) -> Vec<Value> {
        let slots = self.slots.lock();
        (start..start + len)
            .map(|i| slots.get(i).cloned().unwrap_or_default())
            .collect()
    }

    /// Copy `values` into consecutive slots starting at `start`
    pub fn write_range(&self, start: usize, values: &[Value]) -> Result<(), VmError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut slots = self.slots.lock();
        Self::grow(&mut slots, start + values.len() - 1, self.max_slots)?;
        slots[start..start + values.len()].clone_from_slice(values);
        Ok(())
    }

    /// Set slots `start..end` to nil
    pub fn clear_range(&self, start: usize, end: usize) -> Result<(), VmError> {
        if start >= end {
            return Ok(());
        }
        let mut slots = self.slots.lock();
        Self::grow(&mut slots, end - 1, self.max_slots)?;
        for slot in &mut slots[start..end] {
            *slot = Value::Nil;
        }
        Ok(())
    }

    /// True when both handles address the same arena
    pub fn same_arena(&self, other: &ValueStack) -> bool {
        Arc::ptr_eq(&self.slots, &other.slots)
    }
}

impl std::fmt::Debug for ValueStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueStack")
            .field("capacity", &self.capacity())
            .field("max_slots", &self.max_slots)
            .finish()
    }
}
