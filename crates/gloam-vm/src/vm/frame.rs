//! Call frame implementation

use super::stack::ValueStack;
use super::upvalue::{Upvalue, UpvalueRef};
use crate::bytecode::{Closure, FunctionPrototype, SourcePosition};
use crate::error::VmError;
use crate::sync::Arc;
use crate::value::Value;
use std::collections::BTreeMap;

/// Call frame (function activation record)
#[derive(Debug)]
pub struct CallFrame {
    /// Closure being executed
    pub closure: Arc<Closure>,

    /// Stack index of register 0
    pub base: usize,

    /// Instruction pointer (index of the next instruction)
    pub pc: usize,

    /// Stack index of the callee slot; results are written from here
    pub ret_index: usize,

    /// Results the caller wants (`None` = all of them)
    pub nresults: Option<usize>,

    /// Brokers opened over this frame's registers, keyed by stack index
    pub open_upvalues: BTreeMap<usize, UpvalueRef>,

    /// Stack indices marked to-be-closed, in marking order
    pub to_be_closed: Vec<usize>,

    /// Surplus arguments of a vararg function
    pub varargs: Vec<Value>,
}

impl CallFrame {
    /// Create a new call frame
    pub fn new(closure: Arc<Closure>, base: usize, ret_index: usize, nresults: Option<usize>) -> Self {
        Self {
            closure,
            base,
            pc: 0,
            ret_index,
            nresults,
            open_upvalues: BTreeMap::new(),
            to_be_closed: Vec::new(),
            varargs: Vec::new(),
        }
    }

    #[inline]
    pub fn prototype(&self) -> &FunctionPrototype {
        &self.closure.prototype
    }

    /// One past the frame's register window
    #[inline]
    pub fn top(&self) -> usize {
        self.base + self.closure.prototype.max_stack as usize
    }

    /// Fetch current instruction and advance the pc
    #[inline]
    pub fn fetch(&mut self) -> Option<u32> {
        let instruction = self.closure.prototype.code.get(self.pc).copied();
        if instruction.is_some() {
            self.pc += 1;
        }
        instruction
    }

    /// Jump relative to the instruction after the current one. Landing
    /// just past the last instruction is allowed and returns from the frame.
    #[inline]
    pub fn jump(&mut self, offset: i32) -> Result<(), VmError> {
        match self.pc.checked_add_signed(offset as isize) {
            Some(target) if target <= self.closure.prototype.code.len() => {
                self.pc = target;
                Ok(())
            }
            _ => Err(VmError::runtime("jump out of range")),
        }
    }

    /// Position of the instruction being executed
    pub fn current_position(&self) -> Option<SourcePosition> {
        self.closure.prototype.position(self.pc.saturating_sub(1))
    }

    /// Reuse the broker for `index` or open a new one
    pub fn find_upvalue(&mut self, stack: &ValueStack, index: usize) -> UpvalueRef {
        self.open_upvalues
            .entry(index)
            .or_insert_with(|| Upvalue::open(stack.clone(), index))
            .clone()
    }

    /// Close every broker at or above `from`
    pub fn close_upvalues(&mut self, from: usize) -> usize {
        let closing = self.open_upvalues.split_off(&from);
        for upvalue in closing.values() {
            upvalue.close();
        }
        closing.len()
    }

    /// Detach the to-be-closed slots at or above `from`, last marked first
    pub fn take_to_be_closed(&mut self, from: usize) -> Vec<usize> {
        let keep = self.to_be_closed.iter().take_while(|&&slot| slot < from).count();
        let mut closing = self.to_be_closed.split_off(keep);
        closing.reverse();
        closing
    }
}
