//! Comparison and test instruction execution
//!
//! Each of these either falls through or skips the next instruction, which
//! is normally a JMP.

use crate::error::VmError;
use crate::opcode::{instruction::*, OpCode};
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute comparison instructions
    pub(crate) fn execute_comparison(
        &mut self,
        opcode: OpCode,
        instruction: u32,
    ) -> Result<ExecutionResult, VmError> {
        let a = decode_a(instruction);
        let c = decode_c(instruction);

        let skip = match opcode {
            OpCode::Eq | OpCode::Lt | OpCode::Le => {
                let left = self.rk_b(instruction)?;
                let right = self.rk_c(instruction)?;
                let outcome = match opcode {
                    OpCode::Eq => self.equals(left, right)?,
                    OpCode::Lt => self.less_than(left, right)?,
                    _ => self.less_equal(left, right)?,
                };
                outcome != (a != 0)
            }

            OpCode::Test => self.get_register(a).is_truthy() != (c != 0),

            OpCode::TestSet => {
                let value = self.get_register(decode_b(instruction));
                if value.is_truthy() == (c != 0) {
                    self.set_register(a, value)?;
                    false
                } else {
                    true
                }
            }

            _ => unreachable!("Non-comparison opcode in comparison handler"),
        };

        if skip {
            self.frame_mut()?.pc += 1;
        }
        Ok(ExecutionResult::Continue)
    }
}
