//! Metatable protocol
//!
//! Every operator first tries its primitive semantics and only then looks
//! up the event handler, left operand first. Table locks are released before
//! any handler runs.

use super::ops::{self, ArithOp};
use super::Vm;
use crate::error::VmError;
use crate::table::TableRef;
use crate::value::{format_float, Value};
use std::sync::Arc;

/// Longest `__index` / `__newindex` chain followed before giving up
const MAX_META_CHAIN: usize = 2000;

impl Vm {
    pub fn get_metatable(&self, value: &Value) -> Option<TableRef> {
        match value {
            Value::Table(t) => t.read().metatable(),
            Value::String(_) => self.string_metatable.clone(),
            Value::Coroutine(c) => c.metatable(),
            _ => None,
        }
    }

    /// Handler for `event`, or nil
    pub(crate) fn metamethod(&self, value: &Value, event: &str) -> Value {
        match self.get_metatable(value) {
            Some(mt) => mt.read().get_str(event),
            None => Value::Nil,
        }
    }

    fn call_meta(&mut self, handler: Value, args: Vec<Value>) -> Result<Value, VmError> {
        Ok(self
            .call_value(handler, args)?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// `object[key]` with `__index` fallback
    pub fn index(&mut self, object: Value, key: Value) -> Result<Value, VmError> {
        let mut current = object;
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let (raw, metatable) = {
                        let table = t.read();
                        (table.get(&key), table.metatable())
                    };
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    match metatable {
                        Some(mt) => mt.read().get_str("__index"),
                        None => return Ok(Value::Nil),
                    }
                }
                other => {
                    let handler = self.metamethod(other, "__index");
                    if handler.is_nil() {
                        return Err(VmError::type_error("index", other));
                    }
                    handler
                }
            };
            match handler {
                Value::Nil => return Ok(Value::Nil),
                Value::Function(_) => return self.call_meta(handler, vec![current, key]),
                next => current = next,
            }
        }
        Err(VmError::runtime("'__index' chain too long; possible loop"))
    }

    /// `object[key] = value` with `__newindex` fallback
    pub fn new_index(&mut self, object: Value, key: Value, value: Value) -> Result<(), VmError> {
        let mut current = object;
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let handler = {
                        let table = t.read();
                        if !table.get(&key).is_nil() {
                            Value::Nil
                        } else {
                            table
                                .metatable()
                                .map(|mt| mt.read().get_str("__newindex"))
                                .unwrap_or_default()
                        }
                    };
                    if handler.is_nil() {
                        return t.write().set(key, value);
                    }
                    handler
                }
                other => {
                    let handler = self.metamethod(other, "__newindex");
                    if handler.is_nil() {
                        return Err(VmError::type_error("index", other));
                    }
                    handler
                }
            };
            if let Value::Function(_) = handler {
                self.call_value(handler, vec![current, key, value])?;
                return Ok(());
            }
            current = handler;
        }
        Err(VmError::runtime("'__newindex' chain too long; possible loop"))
    }

    /// Binary arithmetic or bitwise operation
    pub fn arith(&mut self, op: ArithOp, left: Value, right: Value) -> Result<Value, VmError> {
        if let Some(value) = ops::arith(op, &left, &right)? {
            return Ok(value);
        }
        let mut handler = self.metamethod(&left, op.event());
        if handler.is_nil() {
            handler = self.metamethod(&right, op.event());
        }
        if handler.is_nil() {
            let culprit = if left.to_number().is_none() { &left } else { &right };
            let operation = if op.is_bitwise() {
                "perform bitwise operation on"
            } else {
                "perform arithmetic on"
            };
            return Err(VmError::type_error(operation, culprit));
        }
        self.call_meta(handler, vec![left, right])
    }

    pub fn negate(&mut self, value: Value) -> Result<Value, VmError> {
        if let Some(result) = ops::negate(&value) {
            return Ok(result);
        }
        self.unary_meta(value, "__unm", "perform arithmetic on")
    }

    pub fn bit_not(&mut self, value: Value) -> Result<Value, VmError> {
        if let Some(result) = ops::bit_not(&value)? {
            return Ok(result);
        }
        self.unary_meta(value, "__bnot", "perform bitwise operation on")
    }

    fn unary_meta(&mut self, value: Value, event: &str, operation: &'static str) -> Result<Value, VmError> {
        let handler = self.metamethod(&value, event);
        if handler.is_nil() {
            return Err(VmError::type_error(operation, &value));
        }
        self.call_meta(handler, vec![value.clone(), value])
    }

    /// The `#` operator
    pub fn length(&mut self, value: Value) -> Result<Value, VmError> {
        if let Value::String(s) = &value {
            return Ok(Value::Integer(s.len() as i64));
        }
        let handler = self.metamethod(&value, "__len");
        if !handler.is_nil() {
            return self.call_meta(handler, vec![value.clone(), value]);
        }
        match &value {
            Value::Table(t) => Ok(Value::Integer(t.read().len() as i64)),
            other => Err(VmError::type_error("get length of", other)),
        }
    }

    /// Concatenate a run of values, right to left
    pub fn concat(&mut self, mut values: Vec<Value>) -> Result<Value, VmError> {
        let mut acc = match values.pop() {
            Some(v) => v,
            None => return Ok(Value::string("")),
        };
        while let Some(left) = values.pop() {
            if is_stringable(&left) && is_stringable(&acc) {
                let mut run = vec![left];
                while values.last().map_or(false, is_stringable) {
                    run.extend(values.pop());
                }
                let mut text = String::new();
                for part in run.iter().rev() {
                    push_stringable(&mut text, part);
                }
                push_stringable(&mut text, &acc);
                acc = Value::String(Arc::from(text));
            } else {
                let mut handler = self.metamethod(&left, "__concat");
                if handler.is_nil() {
                    handler = self.metamethod(&acc, "__concat");
                }
                if handler.is_nil() {
                    let culprit = if is_stringable(&left) { &acc } else { &left };
                    return Err(VmError::type_error("concatenate", culprit));
                }
                acc = self.call_meta(handler, vec![left, acc])?;
            }
        }
        Ok(acc)
    }

    /// Equality with `__eq` for two distinct tables
    pub fn equals(&mut self, left: Value, right: Value) -> Result<bool, VmError> {
        if left.raw_equal(&right) {
            return Ok(true);
        }
        if !matches!((&left, &right), (Value::Table(_), Value::Table(_))) {
            return Ok(false);
        }
        let mut handler = self.metamethod(&left, "__eq");
        if handler.is_nil() {
            handler = self.metamethod(&right, "__eq");
        }
        if handler.is_nil() {
            return Ok(false);
        }
        Ok(self.call_meta(handler, vec![left, right])?.is_truthy())
    }

    pub fn less_than(&mut self, left: Value, right: Value) -> Result<bool, VmError> {
        if let Some(result) = ops::less_than(&left, &right) {
            return Ok(result);
        }
        self.compare_meta(left, right, "__lt")
    }

    pub fn less_equal(&mut self, left: Value, right: Value) -> Result<bool, VmError> {
        if let Some(result) = ops::less_equal(&left, &right) {
            return Ok(result);
        }
        self.compare_meta(left, right, "__le")
    }

    fn compare_meta(&mut self, left: Value, right: Value, event: &str) -> Result<bool, VmError> {
        let mut handler = self.metamethod(&left, event);
        if handler.is_nil() {
            handler = self.metamethod(&right, event);
        }
        if handler.is_nil() {
            return Err(VmError::CompareError {
                left: left.type_name(),
                right: right.type_name(),
            });
        }
        Ok(self.call_meta(handler, vec![left, right])?.is_truthy())
    }

    /// `tostring` semantics: `__tostring`, then `__name`, then the raw form
    pub fn tostring(&mut self, value: Value) -> Result<Value, VmError> {
        let handler = self.metamethod(&value, "__tostring");
        if !handler.is_nil() {
            return match self.call_meta(handler, vec![value])? {
                s @ Value::String(_) => Ok(s),
                _ => Err(VmError::runtime("'__tostring' must return a string")),
            };
        }
        if let Value::String(_) = value {
            return Ok(value);
        }
        if let Some(mt) = self.get_metatable(&value) {
            if let Value::String(name) = mt.read().get_str("__name") {
                return Ok(Value::string(format!("{}: 0x{:08x}", name, value.ptr_id())));
            }
        }
        Ok(Value::string(value.to_string()))
    }
}

fn is_stringable(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Integer(_) | Value::Float(_))
}

fn push_stringable(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&format_float(*f)),
        _ => {}
    }
}
