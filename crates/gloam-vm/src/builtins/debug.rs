//! Debug library

use super::utils::{arg, bad_argument, check_table, opt_integer};
use crate::error::{Interrupt, VmError};
use crate::value::Value;
use crate::vm::Vm;

/// Break into the installed debug hook; execution continues afterwards
pub fn debug_debug(_vm: &mut Vm, _args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    Err(VmError::Interrupt(Interrupt::DebugBreak))
}

/// `traceback([message [, level]])`. Non-string messages are returned as is.
pub fn debug_traceback(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let message = arg(&args, 1);
    if !matches!(message, Value::Nil | Value::String(_)) {
        return Ok(vec![message]);
    }
    let level = opt_integer(&args, 2, "traceback", 1)?.max(1) as usize;

    let mut out = String::new();
    if let Value::String(s) = &message {
        out.push_str(s);
        out.push('\n');
    }
    out.push_str("stack traceback:");
    for entry in vm.traceback().iter().skip(level - 1) {
        out.push_str("\n\t");
        out.push_str(&entry.to_string());
    }
    Ok(vec![Value::string(out)])
}

/// Metatable of any value, ignoring `__metatable`
pub fn debug_getmetatable(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    Ok(vec![vm
        .get_metatable(&arg(&args, 1))
        .map(Value::Table)
        .unwrap_or_default()])
}

/// Set the metatable of a table, a coroutine, or (for all strings) a string,
/// ignoring `__metatable`
pub fn debug_setmetatable(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let metatable = match arg(&args, 2) {
        Value::Nil => None,
        Value::Table(_) => Some(check_table(&args, 2, "setmetatable")?),
        _ => return Err(bad_argument(2, "setmetatable", "nil or table expected")),
    };
    let target = arg(&args, 1);
    match &target {
        Value::Table(t) => t.write().set_metatable(metatable),
        Value::Coroutine(co) => co.set_metatable(metatable),
        Value::String(_) => vm.set_string_metatable(metatable),
        other => {
            return Err(VmError::runtime(format!(
                "cannot set the metatable of a {} value",
                other.type_name()
            )))
        }
    }
    Ok(vec![target])
}
