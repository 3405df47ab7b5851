//! Argument checking shared by the builtin libraries
//!
//! Argument numbers are 1-based, as they appear in error messages.

use crate::error::VmError;
use crate::table::TableRef;
use crate::value::Value;
use crate::vm::CoroutineRef;
use std::fmt::Display;

/// Argument `n`, or nil when absent
pub fn arg(args: &[Value], n: usize) -> Value {
    args.get(n - 1).cloned().unwrap_or_default()
}

pub fn bad_argument(n: usize, function: &str, message: impl Display) -> VmError {
    VmError::runtime(format!("bad argument #{} to '{}' ({})", n, function, message))
}

fn type_mismatch(n: usize, function: &str, expected: &str, got: Option<&Value>) -> VmError {
    let got = got.map_or("no value", Value::type_name);
    bad_argument(n, function, format!("{} expected, got {}", expected, got))
}

pub fn check_table(args: &[Value], n: usize, function: &str) -> Result<TableRef, VmError> {
    match args.get(n - 1) {
        Some(Value::Table(t)) => Ok(t.clone()),
        other => Err(type_mismatch(n, function, "table", other)),
    }
}

pub fn check_function(args: &[Value], n: usize, function: &str) -> Result<Value, VmError> {
    match args.get(n - 1) {
        Some(v @ Value::Function(_)) => Ok(v.clone()),
        other => Err(type_mismatch(n, function, "function", other)),
    }
}

pub fn check_coroutine(args: &[Value], n: usize, function: &str) -> Result<CoroutineRef, VmError> {
    match args.get(n - 1) {
        Some(Value::Coroutine(co)) => Ok(co.clone()),
        other => Err(type_mismatch(n, function, "coroutine", other)),
    }
}

pub fn check_integer(args: &[Value], n: usize, function: &str) -> Result<i64, VmError> {
    let value = args.get(n - 1);
    match value.and_then(Value::to_number) {
        Some(number) => number
            .to_integer()
            .ok_or_else(|| bad_argument(n, function, "number has no integer representation")),
        None => Err(type_mismatch(n, function, "number", value)),
    }
}

pub fn opt_integer(args: &[Value], n: usize, function: &str, default: i64) -> Result<i64, VmError> {
    if arg(args, n).is_nil() {
        Ok(default)
    } else {
        check_integer(args, n, function)
    }
}
