//! Numeric and generic for-loop instruction execution

use crate::error::VmError;
use crate::opcode::{instruction::*, OpCode};
use crate::value::Value;
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute loop instructions
    pub(crate) fn execute_loops(
        &mut self,
        opcode: OpCode,
        instruction: u32,
    ) -> Result<ExecutionResult, VmError> {
        let a = decode_a(instruction);
        let base = self.base() + a as usize;

        match opcode {
            OpCode::ForPrep => {
                let init = for_operand(self.state.stack.get(base), "initial value")?;
                let limit = for_operand(self.state.stack.get(base + 1), "limit")?;
                let step = for_operand(self.state.stack.get(base + 2), "step")?;

                let enters = match (init, limit, step) {
                    (Value::Integer(i), Value::Integer(l), Value::Integer(s)) => {
                        if s == 0 {
                            return Err(VmError::ForStepZero);
                        }
                        if s > 0 {
                            i <= l
                        } else {
                            i >= l
                        }
                    }
                    (init, limit, step) => {
                        let (i, l, s) = (as_f64(&init), as_f64(&limit), as_f64(&step));
                        if s == 0.0 {
                            return Err(VmError::ForStepZero);
                        }
                        self.state.stack.write_range(
                            base,
                            &[Value::Float(i), Value::Float(l), Value::Float(s)],
                        )?;
                        if s > 0.0 {
                            i <= l
                        } else {
                            l <= i
                        }
                    }
                };

                if enters {
                    let first = self.state.stack.get(base);
                    self.state.stack.set(base + 3, first)?;
                } else {
                    // sBx targets the FORLOOP; land just past it
                    self.frame_mut()?.jump(decode_sbx(instruction) as i32 + 1)?;
                }
            }

            OpCode::ForLoop => {
                let index = self.state.stack.get(base);
                let limit = self.state.stack.get(base + 1);
                let step = self.state.stack.get(base + 2);

                let next = match (index, limit, step) {
                    (Value::Integer(i), Value::Integer(l), Value::Integer(s)) => {
                        // overflow past the representable range ends the loop
                        i.checked_add(s)
                            .filter(|&n| if s > 0 { n <= l } else { n >= l })
                            .map(Value::Integer)
                    }
                    (index, limit, step) => {
                        let (i, l, s) = (as_f64(&index), as_f64(&limit), as_f64(&step));
                        let n = i + s;
                        let continues = if s > 0.0 { n <= l } else { l <= n };
                        continues.then_some(Value::Float(n))
                    }
                };

                if let Some(next) = next {
                    self.state.stack.set(base, next.clone())?;
                    self.state.stack.set(base + 3, next)?;
                    self.frame_mut()?.jump(decode_sbx(instruction) as i32)?;
                }
            }

            OpCode::TForCall => {
                let nresults = decode_c(instruction) as usize;
                let header = self.state.stack.read_range(base, 3);
                self.state.stack.write_range(base + 3, &header)?;
                self.call_at(base + 3, 2, Some(nresults))?;
            }

            OpCode::TForLoop => {
                let control = self.state.stack.get(base + 3);
                if !control.is_nil() {
                    self.state.stack.set(base + 2, control)?;
                    self.frame_mut()?.jump(decode_sbx(instruction) as i32)?;
                }
            }

            _ => unreachable!("Non-loop opcode in loop handler"),
        }
        Ok(ExecutionResult::Continue)
    }
}

fn for_operand(value: Value, what: &'static str) -> Result<Value, VmError> {
    match value {
        Value::Integer(_) | Value::Float(_) => Ok(value),
        _ => Err(VmError::ForLoop(what)),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}
