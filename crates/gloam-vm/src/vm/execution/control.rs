//! Control flow instruction execution

use crate::error::VmError;
use crate::opcode::{instruction::*, OpCode};
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute control flow instructions
    pub(crate) fn execute_control(
        &mut self,
        opcode: OpCode,
        instruction: u32,
    ) -> Result<ExecutionResult, VmError> {
        let a = decode_a(instruction);

        match opcode {
            OpCode::Jmp => {
                if a != 0 {
                    let from = self.base() + a as usize - 1;
                    self.close_range(from)?;
                }
                self.frame_mut()?.jump(decode_sbx(instruction) as i32)?;
                Ok(ExecutionResult::Continue)
            }

            OpCode::Return => {
                let b = decode_b(instruction);
                let start = self.base() + a as usize;
                let count = if b == 0 {
                    self.state.top.saturating_sub(start)
                } else {
                    b as usize - 1
                };
                let values = self.state.stack.read_range(start, count);
                self.leave_frame(values)
            }

            OpCode::Close => {
                let from = self.base() + a as usize;
                self.close_range(from)?;
                Ok(ExecutionResult::Continue)
            }

            OpCode::Tbc => {
                let slot = self.base() + a as usize;
                self.frame_mut()?.to_be_closed.push(slot);
                Ok(ExecutionResult::Continue)
            }

            _ => unreachable!("Non-control opcode in control handler"),
        }
    }
}
