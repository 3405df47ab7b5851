//! Function and closure instruction execution

use crate::bytecode::Closure;
use crate::error::VmError;
use crate::opcode::{instruction::*, OpCode};
use crate::sync::Arc;
use crate::value::{Function, Value};
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute function and closure instructions
    pub(crate) fn execute_functions(
        &mut self,
        opcode: OpCode,
        instruction: u32,
    ) -> Result<ExecutionResult, VmError> {
        let a = decode_a(instruction);
        let b = decode_b(instruction);
        let c = decode_c(instruction);

        match opcode {
            OpCode::Call => {
                let func_index = self.base() + a as usize;
                let nargs = self.arg_count(func_index, b);
                let nresults = if c == 0 { None } else { Some(c as usize - 1) };
                self.call_at(func_index, nargs, nresults)?;
            }

            OpCode::TailCall => {
                let func_index = self.base() + a as usize;
                let nargs = self.arg_count(func_index, b);
                match self.state.stack.get(func_index) {
                    Value::Function(Function::Closure(closure)) => {
                        self.tail_call(closure, func_index, nargs)?;
                    }
                    // natives (and __call objects) run as a plain multi-result
                    // call; the RETURN that follows hands the results back
                    _ => self.call_at(func_index, nargs, None)?,
                }
            }

            OpCode::Closure => {
                let closure = self.make_closure(decode_bx(instruction) as usize)?;
                self.set_register(a, Value::Function(Function::Closure(Arc::new(closure))))?;
            }

            OpCode::VarArg => {
                let start = self.base() + a as usize;
                let mut values = self.frame()?.varargs.clone();
                if b == 0 {
                    let count = values.len();
                    self.state.stack.write_range(start, &values)?;
                    self.state.top = start + count;
                } else {
                    values.resize(b as usize - 1, Value::Nil);
                    self.state.stack.write_range(start, &values)?;
                }
            }

            _ => unreachable!("Non-function opcode in function handler"),
        }
        Ok(ExecutionResult::Continue)
    }

    /// Number of arguments of the call at `func_index` (B = 0: up to top)
    fn arg_count(&self, func_index: usize, b: u8) -> usize {
        if b == 0 {
            self.state.top.saturating_sub(func_index + 1)
        } else {
            b as usize - 1
        }
    }

    /// Replace the current frame with a call to `closure`; the frame count
    /// stays the same
    fn tail_call(&mut self, closure: Arc<Closure>, func_index: usize, nargs: usize) -> Result<(), VmError> {
        let args = self.state.stack.read_range(func_index + 1, nargs);
        let frame = self
            .state
            .frames
            .pop()
            .ok_or_else(|| VmError::runtime("no active call frame"))?;
        let (ret_index, nresults) = (frame.ret_index, frame.nresults);
        self.cleanup_frame(frame, None)?;

        self.state
            .stack
            .set(ret_index, Value::Function(Function::Closure(closure.clone())))?;
        self.state.stack.write_range(ret_index + 1, &args)?;
        self.push_frame(closure, ret_index, nargs, nresults)
    }

    /// Instantiate nested prototype `idx`, capturing its upvalues
    fn make_closure(&mut self, idx: usize) -> Result<Closure, VmError> {
        let state = &mut self.state;
        let frame = state
            .frames
            .last_mut()
            .ok_or_else(|| VmError::runtime("no active call frame"))?;
        let prototype = frame
            .prototype()
            .prototypes
            .get(idx)
            .cloned()
            .ok_or_else(|| VmError::runtime(format!("invalid function index: {}", idx)))?;

        let mut upvalues = Vec::with_capacity(prototype.upvalues.len());
        for desc in &prototype.upvalues {
            let upvalue = if desc.in_stack {
                let slot = frame.base + desc.index as usize;
                frame.find_upvalue(&state.stack, slot)
            } else {
                frame
                    .closure
                    .upvalues
                    .get(desc.index as usize)
                    .cloned()
                    .ok_or_else(|| {
                        VmError::runtime(format!("invalid upvalue index: {}", desc.index))
                    })?
            };
            upvalues.push(upvalue);
        }
        Ok(Closure::with_upvalues(prototype, upvalues))
    }
}
