//! Arithmetic, bitwise and string instruction execution

use crate::error::VmError;
use crate::opcode::{instruction::*, OpCode};
use crate::value::Value;
use crate::vm::ops::ArithOp;
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute arithmetic instructions
    pub(crate) fn execute_arithmetic(
        &mut self,
        opcode: OpCode,
        instruction: u32,
    ) -> Result<ExecutionResult, VmError> {
        let a = decode_a(instruction);
        let b = decode_b(instruction);

        let result = match opcode {
            OpCode::Unm => self.negate(self.get_register(b))?,
            OpCode::BNot => self.bit_not(self.get_register(b))?,
            OpCode::Not => Value::Boolean(!self.get_register(b).is_truthy()),
            OpCode::Len => self.length(self.get_register(b))?,
            OpCode::Concat => {
                let c = decode_c(instruction);
                let start = self.base() + b as usize;
                let values = self
                    .state
                    .stack
                    .read_range(start, (c as usize + 1).saturating_sub(b as usize));
                self.concat(values)?
            }
            _ => {
                let op = binary_op(opcode);
                let left = self.rk_b(instruction)?;
                let right = self.rk_c(instruction)?;
                self.arith(op, left, right)?
            }
        };

        self.set_register(a, result)?;
        Ok(ExecutionResult::Continue)
    }
}

fn binary_op(opcode: OpCode) -> ArithOp {
    match opcode {
        OpCode::Add => ArithOp::Add,
        OpCode::Sub => ArithOp::Sub,
        OpCode::Mul => ArithOp::Mul,
        OpCode::Mod => ArithOp::Mod,
        OpCode::Pow => ArithOp::Pow,
        OpCode::Div => ArithOp::Div,
        OpCode::IDiv => ArithOp::IDiv,
        OpCode::BAnd => ArithOp::BAnd,
        OpCode::BOr => ArithOp::BOr,
        OpCode::BXor => ArithOp::BXor,
        OpCode::Shl => ArithOp::Shl,
        OpCode::Shr => ArithOp::Shr,
        _ => unreachable!("Non-arithmetic opcode in arithmetic handler"),
    }
}
