//! Base library: the global functions every chunk can reach
//!
//! - Errors: assert, error, pcall, xpcall
//! - Types: type, tostring, tonumber
//! - Raw access: rawget, rawset, rawequal, rawlen
//! - Metatables: setmetatable, getmetatable
//! - Traversal: next, pairs, ipairs, select
//! - Output: print

use super::utils::{arg, bad_argument, check_function, check_integer, check_table, opt_integer};
use crate::error::VmError;
use crate::table::TableRef;
use crate::value::{parse_number, Value};
use crate::vm::Vm;
use std::io::Write;

// ============================================================================
// Errors
// ============================================================================

pub fn base_assert(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    if arg(&args, 1).is_truthy() {
        return Ok(args);
    }
    match args.get(1) {
        Some(message) => Err(VmError::Raised(message.clone())),
        None => Err(VmError::runtime("assertion failed!")),
    }
}

/// `error(value [, level])`; string messages get the position of the
/// frame `level` steps up prefixed
pub fn base_error(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let value = arg(&args, 1);
    let level = opt_integer(&args, 2, "error", 1)?;
    if let (Value::String(message), true) = (&value, level > 0) {
        if let Some(location) = vm.location_at(level as usize) {
            return Err(VmError::Raised(Value::string(format!("{}: {}", location, message))));
        }
    }
    Err(VmError::Raised(value))
}

/// Faults become `(false, payload)`; interrupts and cancellation pass through
fn protect(result: Result<Vec<Value>, VmError>) -> Result<Result<Vec<Value>, Value>, VmError> {
    match result {
        Ok(values) => Ok(Ok(values)),
        Err(err) if err.is_interrupt() || err.is_cancelled() => Err(err),
        Err(err) => {
            tracing::debug!(error = %err, "protected call caught fault");
            Ok(Err(err.payload()))
        }
    }
}

pub fn base_pcall(vm: &mut Vm, mut args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let func = args.remove(0);
    match protect(vm.call_value(func, args))? {
        Ok(mut values) => {
            values.insert(0, Value::Boolean(true));
            Ok(values)
        }
        Err(payload) => Ok(vec![Value::Boolean(false), payload]),
    }
}

/// `xpcall(f, handler, ...)`: the handler receives the payload and its
/// first result becomes the second return value
pub fn base_xpcall(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let func = arg(&args, 1);
    let handler = check_function(&args, 2, "xpcall")?;
    let rest = args.into_iter().skip(2).collect();
    match protect(vm.call_value(func, rest))? {
        Ok(mut values) => {
            values.insert(0, Value::Boolean(true));
            Ok(values)
        }
        Err(payload) => {
            let handled = match protect(vm.call_value(handler, vec![payload]))? {
                Ok(values) => values.into_iter().next().unwrap_or_default(),
                Err(nested) => nested,
            };
            Ok(vec![Value::Boolean(false), handled])
        }
    }
}

// ============================================================================
// Types
// ============================================================================

pub fn base_type(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    Ok(vec![Value::string(args[0].type_name())])
}

pub fn base_tostring(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    Ok(vec![vm.tostring(arg(&args, 1))?])
}

/// `tonumber(v [, base])`
pub fn base_tonumber(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let value = arg(&args, 1);
    if arg(&args, 2).is_nil() {
        return Ok(vec![value.to_number().unwrap_or_default()]);
    }
    let base = check_integer(&args, 2, "tonumber")?;
    if !(2..=36).contains(&base) {
        return Err(bad_argument(2, "tonumber", "base out of range"));
    }
    let text = match &value {
        Value::String(s) => s.trim().to_lowercase(),
        other => {
            return Err(bad_argument(
                1,
                "tonumber",
                format!("string expected, got {}", other.type_name()),
            ))
        }
    };
    Ok(vec![parse_in_base(&text, base as u32).unwrap_or_default()])
}

fn parse_in_base(text: &str, base: u32) -> Option<Value> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() {
        return None;
    }
    let mut acc: i64 = 0;
    for c in digits.chars() {
        let digit = c.to_digit(base)?;
        acc = acc.wrapping_mul(base as i64).wrapping_add(digit as i64);
    }
    Some(Value::Integer(if negative { acc.wrapping_neg() } else { acc }))
}

// ============================================================================
// Raw access
// ============================================================================

pub fn base_rawget(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let table = check_table(&args, 1, "rawget")?;
    let value = table.read().get(&arg(&args, 2));
    Ok(vec![value])
}

pub fn base_rawset(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let table = check_table(&args, 1, "rawset")?;
    table.write().set(arg(&args, 2), arg(&args, 3))?;
    Ok(vec![args[0].clone()])
}

pub fn base_rawequal(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    Ok(vec![Value::Boolean(args[0].raw_equal(&args[1]))])
}

pub fn base_rawlen(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let len = match &args[0] {
        Value::Table(t) => t.read().len(),
        Value::String(s) => s.len(),
        _ => return Err(bad_argument(1, "rawlen", "table or string expected")),
    };
    Ok(vec![Value::Integer(len as i64)])
}

// ============================================================================
// Metatables
// ============================================================================

pub fn base_setmetatable(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let table = check_table(&args, 1, "setmetatable")?;
    let metatable = match arg(&args, 2) {
        Value::Nil => None,
        Value::Table(mt) => Some(mt),
        _ => return Err(bad_argument(2, "setmetatable", "nil or table expected")),
    };
    if is_protected(table.read().metatable()) {
        return Err(VmError::runtime("cannot change a protected metatable"));
    }
    table.write().set_metatable(metatable);
    Ok(vec![args[0].clone()])
}

fn is_protected(metatable: Option<TableRef>) -> bool {
    metatable.map_or(false, |mt| !mt.read().get_str("__metatable").is_nil())
}

pub fn base_getmetatable(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let metatable = match vm.get_metatable(&args[0]) {
        Some(mt) => mt,
        None => return Ok(vec![Value::Nil]),
    };
    let guard = metatable.read().get_str("__metatable");
    if !guard.is_nil() {
        return Ok(vec![guard]);
    }
    Ok(vec![Value::Table(metatable)])
}

// ============================================================================
// Traversal
// ============================================================================

pub fn base_next(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let table = check_table(&args, 1, "next")?;
    let entry = table.read().next(&arg(&args, 2))?;
    Ok(match entry {
        Some((key, value)) => vec![key, value],
        None => vec![Value::Nil],
    })
}

/// `pairs(t)`: `__pairs` if present, otherwise `next, t, nil`
pub fn base_pairs(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let subject = args[0].clone();
    let handler = vm.metamethod(&subject, "__pairs");
    if !handler.is_nil() {
        let mut results = vm.call_value(handler, vec![subject])?;
        results.resize(3, Value::Nil);
        return Ok(results);
    }
    check_table(&args, 1, "pairs")?;
    Ok(vec![Value::native("next", base_next), subject, Value::Nil])
}

/// `ipairs(t)`: iterates `t[1], t[2], ...` through `__index` until a nil
pub fn base_ipairs(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    Ok(vec![
        Value::native("ipairs_iterator", ipairs_step),
        args[0].clone(),
        Value::Integer(0),
    ])
}

fn ipairs_step(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let index = check_integer(&args, 2, "ipairs_iterator")?.wrapping_add(1);
    let value = vm.index(arg(&args, 1), Value::Integer(index))?;
    if value.is_nil() {
        return Ok(vec![Value::Nil]);
    }
    Ok(vec![Value::Integer(index), value])
}

/// `select('#', ...)` or `select(n, ...)`; negative `n` counts from the end
pub fn base_select(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let count = args.len() as i64 - 1;
    if args[0].as_str() == Some("#") {
        return Ok(vec![Value::Integer(count)]);
    }
    let n = check_integer(&args, 1, "select")?;
    let start = if n < 0 {
        if -n > count {
            return Err(bad_argument(1, "select", "index out of range"));
        }
        count + n
    } else if n == 0 {
        return Err(bad_argument(1, "select", "index out of range"));
    } else {
        (n - 1).min(count)
    };
    Ok(args.into_iter().skip(1 + start as usize).collect())
}

// ============================================================================
// Output
// ============================================================================

/// Write the `tostring` of each argument, tab separated, to the VM's output
pub fn base_print(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let mut line = String::new();
    for (i, value) in args.into_iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        match vm.tostring(value)? {
            Value::String(s) => line.push_str(&s),
            other => line.push_str(&other.to_string()),
        }
    }
    line.push('\n');
    vm.output
        .write_all(line.as_bytes())
        .and_then(|_| vm.output.flush())
        .map_err(|e| VmError::runtime(format!("print: {}", e)))?;
    Ok(Vec::new())
}
