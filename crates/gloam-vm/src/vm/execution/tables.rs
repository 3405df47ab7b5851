//! Table instruction execution

use crate::error::VmError;
use crate::opcode::{instruction::*, OpCode, FIELDS_PER_FLUSH};
use crate::sync::shared;
use crate::table::Table;
use crate::value::Value;
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute table access and construction instructions
    pub(crate) fn execute_tables(
        &mut self,
        opcode: OpCode,
        instruction: u32,
    ) -> Result<ExecutionResult, VmError> {
        let a = decode_a(instruction);
        let b = decode_b(instruction);
        let c = decode_c(instruction);

        match opcode {
            OpCode::GetTabUp => {
                let table = self.upvalue(b)?.get();
                let key = self.rk_c(instruction)?;
                let value = self.index(table, key)?;
                self.set_register(a, value)?;
            }

            OpCode::GetTable => {
                let table = self.get_register(b);
                let key = self.rk_c(instruction)?;
                let value = self.index(table, key)?;
                self.set_register(a, value)?;
            }

            OpCode::SetTabUp => {
                let table = self.upvalue(a)?.get();
                let key = self.rk_b(instruction)?;
                let value = self.rk_c(instruction)?;
                self.new_index(table, key, value)?;
            }

            OpCode::SetTable => {
                let table = self.get_register(a);
                let key = self.rk_b(instruction)?;
                let value = self.rk_c(instruction)?;
                self.new_index(table, key, value)?;
            }

            OpCode::NewTable => {
                let table = Table::with_capacity(b as usize, c as usize);
                self.set_register(a, Value::Table(shared(table)))?;
            }

            OpCode::SelfOp => {
                let object = self.get_register(b);
                let key = self.rk_c(instruction)?;
                self.set_register(a + 1, object.clone())?;
                let method = self.index(object, key)?;
                self.set_register(a, method)?;
            }

            OpCode::SetList => {
                let base = self.base() + a as usize;
                let count = if b == 0 {
                    self.state.top.saturating_sub(base + 1)
                } else {
                    b as usize
                };
                let batch = if c == 0 {
                    self.fetch_extra_word()? as usize
                } else {
                    c as usize
                };
                let first = (batch.max(1) - 1) * FIELDS_PER_FLUSH + 1;
                let values = self.state.stack.read_range(base + 1, count);
                match self.state.stack.get(base) {
                    Value::Table(t) => {
                        let mut table = t.write();
                        for (i, value) in values.into_iter().enumerate() {
                            table.set_int((first + i) as i64, value);
                        }
                    }
                    other => return Err(VmError::type_error("index", &other)),
                }
                if b == 0 {
                    self.state.top = self.frame()?.top();
                }
            }

            _ => unreachable!("Non-table opcode in table handler"),
        }
        Ok(ExecutionResult::Continue)
    }
}
