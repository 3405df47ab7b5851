//! Calling convention
//!
//! A call site owns the slots `func, func+1 .. func+nargs`. Bytecode callees
//! get a new frame with `base = func + 1`; native callees run immediately and
//! their results are copied back starting at `func`.

use super::frame::CallFrame;
use super::result::{ExecutionResult, FrameExit};
use super::state::PendingResume;
use super::Vm;
use crate::bytecode::Closure;
use crate::error::{Interrupt, VmError};
use crate::sync::Arc;
use crate::value::{Function, NativeFunction, Value};

/// Longest `__call` indirection chain followed before giving up
const MAX_CALL_CHAIN: usize = 64;

impl Vm {
    /// Find the function behind the value at `func_index`, inserting
    /// `__call` handlers (and shifting the arguments) as needed
    fn resolve_callee(&mut self, func_index: usize, mut nargs: usize) -> Result<(Function, usize), VmError> {
        for _ in 0..MAX_CALL_CHAIN {
            let callee = self.state.stack.get(func_index);
            if let Value::Function(function) = callee {
                return Ok((function, nargs));
            }
            let handler = self.metamethod(&callee, "__call");
            if handler.is_nil() {
                return Err(VmError::NotCallable(callee.type_name()));
            }
            let args = self.state.stack.read_range(func_index + 1, nargs);
            self.state.stack.set(func_index, handler)?;
            self.state.stack.set(func_index + 1, callee)?;
            self.state.stack.write_range(func_index + 2, &args)?;
            nargs += 1;
        }
        Err(VmError::runtime("'__call' chain too long; possible loop"))
    }

    /// Start a call: push a frame for bytecode, or run a native to completion
    fn precall(&mut self, func_index: usize, nargs: usize, nresults: Option<usize>) -> Result<(), VmError> {
        match self.resolve_callee(func_index, nargs)? {
            (Function::Closure(closure), nargs) => self.push_frame(closure, func_index, nargs, nresults),
            (Function::Native(native), nargs) => {
                let args = self.state.stack.read_range(func_index + 1, nargs);
                let results = self.invoke_native(&native, args)?;
                self.place_results(func_index, nresults, results)
            }
        }
    }

    /// Call from an instruction. A yield raised by a native callee parks
    /// the unit on this call site so the resume values become its results.
    pub(crate) fn call_at(&mut self, func_index: usize, nargs: usize, nresults: Option<usize>) -> Result<(), VmError> {
        match self.precall(func_index, nargs, nresults) {
            Err(VmError::Interrupt(Interrupt::Yield(values))) => {
                if !self.state.is_coroutine {
                    return Err(VmError::runtime("attempt to yield from outside a coroutine"));
                }
                if !self.state.is_yieldable() {
                    return Err(VmError::runtime("attempt to yield across a native-call boundary"));
                }
                self.state.pending = Some(PendingResume::Call {
                    ret_index: func_index,
                    nresults,
                });
                Err(VmError::Interrupt(Interrupt::Yield(values)))
            }
            other => other,
        }
    }

    /// Activate a bytecode closure whose arguments sit above `func_index`
    pub(crate) fn push_frame(
        &mut self,
        closure: Arc<Closure>,
        func_index: usize,
        nargs: usize,
        nresults: Option<usize>,
    ) -> Result<(), VmError> {
        if self.state.frames.len() >= self.config.max_call_depth {
            return Err(VmError::StackOverflow);
        }
        let proto = &closure.prototype;
        let base = func_index + 1;
        let nparams = proto.param_count as usize;
        let top = base + proto.max_stack as usize;

        let varargs = if proto.is_vararg && nargs > nparams {
            self.state.stack.read_range(base + nparams, nargs - nparams)
        } else {
            Vec::new()
        };
        self.state.stack.ensure_capacity(top)?;
        // missing parameters and the rest of the window start as nil
        self.state.stack.clear_range(base + nargs.min(nparams), top)?;
        self.state.top = top;

        tracing::trace!(
            function = %proto.name,
            depth = self.state.frames.len() + 1,
            nargs,
            "enter frame"
        );
        let mut frame = CallFrame::new(closure, base, func_index, nresults);
        frame.varargs = varargs;
        self.state.frames.push(frame);
        Ok(())
    }

    /// Copy call results to `ret_index`, padding or truncating to `nresults`
    pub(crate) fn place_results(
        &mut self,
        ret_index: usize,
        nresults: Option<usize>,
        mut values: Vec<Value>,
    ) -> Result<(), VmError> {
        match nresults {
            Some(n) => {
                values.resize(n, Value::Nil);
                self.state.stack.write_range(ret_index, &values)?;
                self.state.top = self
                    .state
                    .frames
                    .last()
                    .map(|f| f.top())
                    .unwrap_or(ret_index + n);
            }
            None => {
                self.state.stack.write_range(ret_index, &values)?;
                self.state.top = ret_index + values.len();
            }
        }
        Ok(())
    }

    /// Call any callable value from host code and collect all its results.
    /// Re-entrant: runs a nested dispatch loop for bytecode callees.
    pub fn call_value(&mut self, func: Value, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
        if self.native_depth >= self.config.max_native_depth {
            return Err(VmError::StackOverflow);
        }
        let func_index = self.state.free_slot();
        let nargs = args.len();
        self.state.stack.set(func_index, func)?;
        self.state.stack.write_range(func_index + 1, &args)?;

        let saved_top = self.state.top;
        self.native_depth += 1;
        self.state.nested_calls += 1;
        let result = self.call_value_at(func_index, nargs);
        self.state.nested_calls -= 1;
        self.native_depth -= 1;
        self.state.top = saved_top;

        match result {
            // nothing can park on a host call, so a yield cannot cross it
            Err(VmError::Interrupt(Interrupt::Yield(_))) => Err(VmError::runtime(
                "attempt to yield across a native-call boundary",
            )),
            other => other,
        }
    }

    fn call_value_at(&mut self, func_index: usize, nargs: usize) -> Result<Vec<Value>, VmError> {
        match self.resolve_callee(func_index, nargs)? {
            (Function::Native(native), nargs) => {
                let args = self.state.stack.read_range(func_index + 1, nargs);
                self.invoke_native(&native, args)
            }
            (Function::Closure(closure), nargs) => {
                let depth = self.state.frames.len();
                self.push_frame(closure, func_index, nargs, None)?;
                self.run(depth)
            }
        }
    }

    /// Run a native function, servicing debug breaks at the call site
    pub(crate) fn invoke_native(&mut self, native: &NativeFunction, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
        tracing::trace!(name = native.name(), nargs = args.len(), "native call");
        match native.call(self, args) {
            Err(VmError::Interrupt(Interrupt::DebugBreak)) => {
                self.debug_break()?;
                Ok(Vec::new())
            }
            result => result,
        }
    }

    /// Pop the current frame, run its cleanup and hand back its results
    pub(crate) fn leave_frame(&mut self, values: Vec<Value>) -> Result<ExecutionResult, VmError> {
        let frame = self
            .state
            .frames
            .pop()
            .ok_or_else(|| VmError::runtime("no active call frame"))?;
        let (ret_index, nresults) = (frame.ret_index, frame.nresults);
        tracing::trace!(
            function = %frame.prototype().name,
            depth = self.state.frames.len(),
            nvalues = values.len(),
            "leave frame"
        );
        self.cleanup_frame(frame, None)?;
        Ok(ExecutionResult::Return(FrameExit {
            values,
            ret_index,
            nresults,
        }))
    }

    /// Close the frame's brokers, then its to-be-closed slots (last first)
    pub(crate) fn cleanup_frame(&mut self, mut frame: CallFrame, err: Option<&VmError>) -> Result<(), VmError> {
        frame.close_upvalues(0);
        let slots = frame.take_to_be_closed(0);
        if slots.is_empty() {
            return Ok(());
        }
        let values = slots.iter().map(|&slot| self.state.stack.get(slot)).collect();
        self.run_close_handlers(values, err)
    }

    /// Close brokers and to-be-closed slots of the current frame from
    /// stack index `from` upward
    pub(crate) fn close_range(&mut self, from: usize) -> Result<(), VmError> {
        let frame = self.frame_mut()?;
        frame.close_upvalues(from);
        let slots = frame.take_to_be_closed(from);
        if slots.is_empty() {
            return Ok(());
        }
        let values = slots.iter().map(|&slot| self.state.stack.get(slot)).collect();
        self.run_close_handlers(values, None)
    }

    fn run_close_handlers(&mut self, values: Vec<Value>, err: Option<&VmError>) -> Result<(), VmError> {
        let mut err_value = err.map(|e| e.payload()).unwrap_or_default();
        let mut failure = None;
        for value in values {
            if !value.is_truthy() {
                continue;
            }
            let handler = self.metamethod(&value, "__close");
            if handler.is_nil() {
                self.warn(format!(
                    "to-be-closed {} value has no '__close' metamethod",
                    value.type_name()
                ));
                continue;
            }
            if let Err(close_err) = self.call_value(handler, vec![value, err_value.clone()]) {
                err_value = close_err.payload();
                failure = Some(close_err);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
