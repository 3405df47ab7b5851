//! Variable and constant instruction execution

use crate::error::VmError;
use crate::opcode::{instruction::*, OpCode};
use crate::value::Value;
use crate::vm::result::ExecutionResult;
use crate::vm::upvalue::UpvalueRef;
use crate::vm::Vm;

impl Vm {
    /// Execute variable and constant loading instructions
    pub(crate) fn execute_variables(
        &mut self,
        opcode: OpCode,
        instruction: u32,
    ) -> Result<ExecutionResult, VmError> {
        let a = decode_a(instruction);
        let b = decode_b(instruction);

        match opcode {
            OpCode::Move => {
                let value = self.get_register(b);
                self.set_register(a, value)?;
            }

            OpCode::LoadK => {
                let value = self.get_constant(decode_bx(instruction) as usize)?;
                self.set_register(a, value)?;
            }

            OpCode::LoadKx => {
                let idx = self.fetch_extra_word()?;
                let value = self.get_constant(idx as usize)?;
                self.set_register(a, value)?;
            }

            OpCode::LoadI => {
                self.set_register(a, Value::Integer(decode_sbx(instruction) as i64))?;
            }

            OpCode::LoadF => {
                self.set_register(a, Value::Float(decode_sbx(instruction) as f64))?;
            }

            OpCode::LoadBool => {
                self.set_register(a, Value::Boolean(b != 0))?;
                if decode_c(instruction) != 0 {
                    self.frame_mut()?.pc += 1;
                }
            }

            OpCode::LoadNil => {
                let start = self.base() + a as usize;
                self.state.stack.clear_range(start, start + b as usize + 1)?;
            }

            OpCode::GetUpval => {
                let value = self.upvalue(b)?.get();
                self.set_register(a, value)?;
            }

            OpCode::SetUpval => {
                let value = self.get_register(a);
                self.upvalue(b)?.set(value)?;
            }

            _ => unreachable!("Non-variable opcode in variable handler"),
        }
        Ok(ExecutionResult::Continue)
    }

    /// Broker of upvalue `idx` of the running closure
    pub(crate) fn upvalue(&self, idx: u8) -> Result<UpvalueRef, VmError> {
        self.frame()?
            .closure
            .upvalues
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| VmError::runtime(format!("invalid upvalue index: {}", idx)))
    }
}
