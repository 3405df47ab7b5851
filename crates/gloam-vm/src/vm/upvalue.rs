//! Upvalue brokers
//!
//! A broker starts open, pointing at a stack slot, and is closed when the
//! owning frame exits (or the enclosing block ends). Closing copies the slot
//! into the broker; every closure holding it keeps sharing the same cell.
//! Lock order is broker first, then stack.

use super::stack::ValueStack;
use crate::sync::{Arc, Mutex};
use crate::value::Value;

pub type UpvalueRef = Arc<Upvalue>;

enum UpvalueState {
    Open { stack: ValueStack, index: usize },
    Closed(Value),
}

pub struct Upvalue {
    state: Mutex<UpvalueState>,
}

impl Upvalue {
    /// Broker aliasing a live stack slot
    pub fn open(stack: ValueStack, index: usize) -> UpvalueRef {
        Arc::new(Self {
            state: Mutex::new(UpvalueState::Open { stack, index }),
        })
    }

    /// Broker that already owns its value
    pub fn closed(value: Value) -> UpvalueRef {
        Arc::new(Self {
            state: Mutex::new(UpvalueState::Closed(value)),
        })
    }

    pub fn get(&self) -> Value {
        match &*self.state.lock() {
            UpvalueState::Open { stack, index } => stack.get(*index),
            UpvalueState::Closed(value) => value.clone(),
        }
    }

    pub fn set(&self, value: Value) -> Result<(), crate::error::VmError> {
        match &mut *self.state.lock() {
            UpvalueState::Open { stack, index } => stack.set(*index, value),
            UpvalueState::Closed(slot) => {
                *slot = value;
                Ok(())
            }
        }
    }

    /// Copy the slot into the broker; closing twice is a no-op
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let UpvalueState::Open { stack, index } = &*state {
            let value = stack.get(*index);
            *state = UpvalueState::Closed(value);
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(&*self.state.lock(), UpvalueState::Open { .. })
    }

    /// Stack slot this broker aliases while open
    pub fn slot(&self) -> Option<usize> {
        match &*self.state.lock() {
            UpvalueState::Open { index, .. } => Some(*index),
            UpvalueState::Closed(_) => None,
        }
    }
}

impl std::fmt::Debug for Upvalue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.state.lock() {
            UpvalueState::Open { index, .. } => write!(f, "Upvalue(open @{})", index),
            UpvalueState::Closed(v) => write!(f, "Upvalue(closed {:?})", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_broker_aliases_slot() {
        let stack = ValueStack::new(8, 64);
        let uv = Upvalue::open(stack.clone(), 3);
        stack.set(3, Value::Integer(1)).unwrap();
        assert_eq!(uv.get(), Value::Integer(1));
        uv.set(Value::Integer(2)).unwrap();
        assert_eq!(stack.get(3), Value::Integer(2));
    }

    #[test]
    fn test_close_freezes_value() {
        let stack = ValueStack::new(8, 64);
        let uv = Upvalue::open(stack.clone(), 0);
        stack.set(0, Value::string("kept")).unwrap();
        uv.close();
        uv.close();
        stack.set(0, Value::Nil).unwrap();
        assert!(!uv.is_open());
        assert_eq!(uv.get(), Value::string("kept"));
        uv.set(Value::Integer(5)).unwrap();
        assert_eq!(stack.get(0), Value::Nil);
        assert_eq!(uv.get(), Value::Integer(5));
    }
}
