//! Coroutine library
//!
//! Thin bindings over `Vm::create_coroutine`, `Vm::resume`,
//! `Vm::yield_values` and `Vm::close_coroutine`.

use super::utils::{arg, check_coroutine, check_function};
use crate::error::VmError;
use crate::value::Value;
use crate::vm::{CoroutineStatus, Vm};

pub fn co_create(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let entry = check_function(&args, 1, "create")?;
    Ok(vec![Value::Coroutine(vm.create_coroutine(entry)?)])
}

/// `resume(co, ...)` -> `true, ...` or `false, payload`
pub fn co_resume(vm: &mut Vm, mut args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let co = check_coroutine(&args, 1, "resume")?;
    args.remove(0);
    match vm.resume(&co, args) {
        Ok((mut values, _)) => {
            values.insert(0, Value::Boolean(true));
            Ok(values)
        }
        Err(err) if err.is_interrupt() => Err(err),
        Err(err) => Ok(vec![Value::Boolean(false), err.payload()]),
    }
}

pub fn co_yield(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    vm.yield_values(args)
}

pub fn co_status(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let co = check_coroutine(&args, 1, "status")?;
    Ok(vec![Value::string(co.status().name())])
}

/// `close(co)` -> `true` or `false, payload` when a `__close` handler failed
pub fn co_close(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let co = check_coroutine(&args, 1, "close")?;
    match vm.close_coroutine(&co) {
        Ok(()) => Ok(vec![Value::Boolean(true)]),
        Err(err) if err.is_interrupt() => Err(err),
        Err(err) if matches!(co.status(), CoroutineStatus::Dead) => {
            Ok(vec![Value::Boolean(false), err.payload()])
        }
        Err(err) => Err(err),
    }
}

/// `wrap(f)`: a function that resumes a fresh coroutine and re-raises its faults
pub fn co_wrap(vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let entry = check_function(&args, 1, "wrap")?;
    let co = vm.create_coroutine(entry)?;
    let wrapper = Value::native("wrap", move |vm, args| vm.resume(&co, args).map(|(values, _)| values));
    Ok(vec![wrapper])
}

pub fn co_isyieldable(vm: &mut Vm, _args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    Ok(vec![Value::Boolean(vm.is_yieldable())])
}

/// `running()` -> the running coroutine and `false`, or `nil, true` on the
/// main unit
pub fn co_running(vm: &mut Vm, _args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    Ok(match vm.running_coroutine() {
        Some(co) => vec![Value::Coroutine(co), Value::Boolean(false)],
        None => vec![Value::Nil, Value::Boolean(true)],
    })
}
