//! `os.exit`, the one OS binding the VM itself needs
//!
//! Exit travels as an interrupt: every live frame runs its cleanup on the way
//! out and the embedding host decides what to do with the status.

use super::utils::{arg, bad_argument};
use crate::error::{Interrupt, VmError};
use crate::value::Value;
use crate::vm::Vm;

/// `exit([code])`: `true`/nil mean success, `false` failure
pub fn os_exit(_vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
    let code = match arg(&args, 1) {
        Value::Nil | Value::Boolean(true) => 0,
        Value::Boolean(false) => 1,
        other => match other.to_integer() {
            Some(code) => code as i32,
            None => return Err(bad_argument(1, "exit", "number expected")),
        },
    };
    tracing::debug!(code, "exit requested");
    Err(VmError::Interrupt(Interrupt::Exit(code)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let mut vm = Vm::new();
        let code = |vm: &mut Vm, args| os_exit(vm, args).unwrap_err().exit_code();
        assert_eq!(code(&mut vm, vec![]), Some(0));
        assert_eq!(code(&mut vm, vec![Value::Boolean(false)]), Some(1));
        assert_eq!(code(&mut vm, vec![Value::Integer(42)]), Some(42));
        assert!(os_exit(&mut vm, vec![Value::string("x")]).unwrap_err().exit_code().is_none());
    }
}
