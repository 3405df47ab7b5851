//! Virtual Machine implementation

use crate::bytecode::{Closure, FunctionPrototype};
use crate::config::VmConfig;
use crate::error::{Interrupt, LocatedError, SourceLocation, TraceEntry, VmError};
use crate::opcode::{instruction::*, OpCode};
use crate::sync::Arc;
use crate::table::{new_table, TableRef};
use crate::value::{Function, Value};
use std::io::Write;

// Module structure
mod call;
pub mod cancel;
pub mod coroutine;
pub mod debug;
mod execution;
pub mod frame;
mod meta;
pub mod ops;
mod result;
pub mod stack;
pub mod state;
pub mod upvalue;

// Re-export public types
pub use cancel::CancelToken;
pub use coroutine::{Coroutine, CoroutineRef, CoroutineStatus};
pub use debug::{DebugHook, FrameSnapshot, LogDebugHook};
pub use frame::CallFrame;
pub use ops::ArithOp;
pub use state::ExecState;
pub use upvalue::{Upvalue, UpvalueRef};

use result::ExecutionResult;
use upvalue::Upvalue as Broker;

/// Virtual Machine
pub struct Vm {
    /// Execution unit currently running (main program or a coroutine)
    pub(crate) state: ExecState,

    /// Global environment, reachable as upvalue 0 of every loaded chunk
    globals: TableRef,

    /// Metatable shared by all strings
    string_metatable: Option<TableRef>,

    pub(crate) config: VmConfig,

    /// Token of the main unit; every coroutine token descends from it
    root_cancel: CancelToken,

    /// Coroutines currently being resumed, innermost last
    pub(crate) coroutines: Vec<CoroutineRef>,

    pub(crate) debug_hook: Option<Box<dyn DebugHook>>,

    warnings: Vec<String>,

    /// Sink for `print`
    pub(crate) output: Box<dyn Write + Send>,

    /// Nesting of host re-entry (call_value, resume)
    pub(crate) native_depth: usize,
}

impl Vm {
    /// Create a new VM with the standard libraries installed
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut vm = Self::bare(config);
        crate::builtins::open_libs(&mut vm);
        vm
    }

    /// Create a VM with an empty global environment
    pub fn bare(config: VmConfig) -> Self {
        let root_cancel = CancelToken::new();
        Self {
            state: ExecState::new(&config, root_cancel.clone(), false),
            globals: new_table(),
            string_metatable: None,
            config,
            root_cancel,
            coroutines: Vec::new(),
            debug_hook: None,
            warnings: Vec::new(),
            output: Box::new(std::io::stdout()),
            native_depth: 0,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals.read().get_str(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.write().set_str(name, value);
    }

    /// Expose a host function as a global
    pub fn register_native<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Vm, Vec<Value>) -> Result<Vec<Value>, VmError> + Send + Sync + 'static,
    {
        self.set_global(name, Value::native(name, func));
    }

    pub fn string_metatable(&self) -> Option<TableRef> {
        self.string_metatable.clone()
    }

    pub fn set_string_metatable(&mut self, metatable: Option<TableRef>) {
        self.string_metatable = metatable;
    }

    /// Token that cancels the main unit and every coroutine
    pub fn cancel_token(&self) -> CancelToken {
        self.root_cancel.clone()
    }

    /// Redirect `print` output
    pub fn set_output(&mut self, output: Box<dyn Write + Send>) {
        self.output = output;
    }

    /// Warnings collected since the last call
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub(crate) fn warn(&mut self, message: String) {
        tracing::warn!(%message, "runtime warning");
        self.warnings.push(message);
    }

    /// Number of bytecode frames live in the running unit
    pub fn call_depth(&self) -> usize {
        self.state.frames.len()
    }

    /// Wrap a main prototype in a closure whose upvalue 0 is the global table
    pub fn load(&self, prototype: Arc<FunctionPrototype>) -> Value {
        let upvalues = (0..prototype.upvalues.len())
            .map(|i| {
                if i == 0 {
                    Broker::closed(Value::Table(self.globals.clone()))
                } else {
                    Broker::closed(Value::Nil)
                }
            })
            .collect();
        Value::Function(Function::Closure(Arc::new(Closure::with_upvalues(
            prototype, upvalues,
        ))))
    }

    /// Load a dumped chunk
    pub fn load_binary(&self, bytes: &[u8]) -> Result<Value, VmError> {
        let prototype = crate::dump::undump_prototype(bytes)
            .map_err(|e| VmError::runtime(format!("cannot load binary chunk: {:#}", e)))?;
        Ok(self.load(prototype))
    }

    /// Run a main prototype to completion
    pub fn execute(&mut self, prototype: Arc<FunctionPrototype>) -> Result<Vec<Value>, VmError> {
        let main = self.load(prototype);
        tracing::debug!("executing main chunk");
        self.call_value(main, Vec::new())
    }

    /// Main execution loop; returns when the frame count drops to `stop_depth`
    pub(crate) fn run(&mut self, stop_depth: usize) -> Result<Vec<Value>, VmError> {
        loop {
            match self.step(stop_depth) {
                Ok(None) => continue,
                Ok(Some(values)) => return Ok(values),
                Err(err) => return Err(self.unwind(err, stop_depth)),
            }
        }
    }

    fn step(&mut self, stop_depth: usize) -> Result<Option<Vec<Value>>, VmError> {
        if self.state.cancel.is_cancelled() {
            return Err(VmError::Cancelled);
        }

        let frame = self.frame_mut()?;
        let result = match frame.fetch() {
            Some(instruction) => {
                let opcode_byte = decode_opcode(instruction);
                let opcode =
                    OpCode::from_u8(opcode_byte).ok_or(VmError::InvalidOpcode(opcode_byte))?;
                self.execute_instruction(opcode, instruction)?
            }
            // falling off the end returns nothing
            None => self.leave_frame(Vec::new())?,
        };

        match result {
            ExecutionResult::Continue => Ok(None),
            ExecutionResult::Return(exit) => {
                if self.state.frames.len() <= stop_depth {
                    return Ok(Some(exit.values));
                }
                self.place_results(exit.ret_index, exit.nresults, exit.values)?;
                Ok(None)
            }
        }
    }

    /// Execute a single instruction
    fn execute_instruction(
        &mut self,
        opcode: OpCode,
        instruction: u32,
    ) -> Result<ExecutionResult, VmError> {
        match opcode {
            OpCode::Move
            | OpCode::LoadK
            | OpCode::LoadKx
            | OpCode::LoadI
            | OpCode::LoadF
            | OpCode::LoadBool
            | OpCode::LoadNil
            | OpCode::GetUpval
            | OpCode::SetUpval => self.execute_variables(opcode, instruction),

            OpCode::GetTabUp
            | OpCode::GetTable
            | OpCode::SetTabUp
            | OpCode::SetTable
            | OpCode::NewTable
            | OpCode::SelfOp
            | OpCode::SetList => self.execute_tables(opcode, instruction),

            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Mod
            | OpCode::Pow
            | OpCode::Div
            | OpCode::IDiv
            | OpCode::BAnd
            | OpCode::BOr
            | OpCode::BXor
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::Unm
            | OpCode::BNot
            | OpCode::Not
            | OpCode::Len
            | OpCode::Concat => self.execute_arithmetic(opcode, instruction),

            OpCode::Eq | OpCode::Lt | OpCode::Le | OpCode::Test | OpCode::TestSet => {
                self.execute_comparison(opcode, instruction)
            }

            OpCode::Jmp | OpCode::Return | OpCode::Close | OpCode::Tbc => {
                self.execute_control(opcode, instruction)
            }

            OpCode::Call | OpCode::TailCall | OpCode::Closure | OpCode::VarArg => {
                self.execute_functions(opcode, instruction)
            }

            OpCode::ForPrep | OpCode::ForLoop | OpCode::TForCall | OpCode::TForLoop => {
                self.execute_loops(opcode, instruction)
            }
        }
    }

    /// Unwind frames above `stop_depth`, running their cleanup.
    /// Yields pass through untouched; they keep the frames for the resume.
    fn unwind(&mut self, err: VmError, stop_depth: usize) -> VmError {
        if matches!(err, VmError::Interrupt(Interrupt::Yield(_))) {
            return err;
        }
        let mut err = self.locate(err);
        tracing::debug!(error = %err, depth = self.state.frames.len(), stop_depth, "unwinding");
        while self.state.frames.len() > stop_depth {
            let frame = match self.state.frames.pop() {
                Some(frame) => frame,
                None => break,
            };
            if let Err(close_err) = self.cleanup_frame(frame, Some(&err)) {
                err = self.locate(close_err);
            }
        }
        err
    }

    /// Attach position and traceback to a fault, once
    pub(crate) fn locate(&self, err: VmError) -> VmError {
        match err {
            VmError::Located(_) | VmError::Interrupt(_) => err,
            error => VmError::Located(Box::new(LocatedError {
                error,
                location: self.state.frames.last().and_then(frame_location),
                traceback: self.traceback(),
            })),
        }
    }

    /// Live call chain, innermost first
    pub fn traceback(&self) -> Vec<TraceEntry> {
        self.state
            .frames
            .iter()
            .rev()
            .map(|frame| TraceEntry {
                function: frame.prototype().name.clone(),
                location: frame_location(frame),
            })
            .collect()
    }

    /// Current position of the frame `level` steps up the chain (1 = innermost)
    pub fn location_at(&self, level: usize) -> Option<SourceLocation> {
        if level == 0 {
            return None;
        }
        self.state.frames.iter().rev().nth(level - 1).and_then(frame_location)
    }

    // ===== Helper methods =====

    /// Get current call frame
    pub(crate) fn frame(&self) -> Result<&CallFrame, VmError> {
        self.state
            .frames
            .last()
            .ok_or_else(|| VmError::runtime("no active call frame"))
    }

    /// Get current call frame (mutable)
    pub(crate) fn frame_mut(&mut self) -> Result<&mut CallFrame, VmError> {
        self.state
            .frames
            .last_mut()
            .ok_or_else(|| VmError::runtime("no active call frame"))
    }

    #[inline]
    pub(crate) fn base(&self) -> usize {
        self.state.frames.last().map(|f| f.base).unwrap_or(0)
    }

    /// Get register from current frame
    #[inline]
    pub(crate) fn get_register(&self, idx: u8) -> Value {
        self.state.stack.get(self.base() + idx as usize)
    }

    /// Set register in current frame
    #[inline]
    pub(crate) fn set_register(&mut self, idx: u8, value: Value) -> Result<(), VmError> {
        self.state.stack.set(self.base() + idx as usize, value)
    }

    /// Get constant from current frame's function
    pub(crate) fn get_constant(&self, idx: usize) -> Result<Value, VmError> {
        self.frame()?
            .prototype()
            .constants
            .get_constant(idx)
            .cloned()
            .ok_or_else(|| VmError::runtime(format!("invalid constant index: {}", idx)))
    }

    /// Register or constant operand B
    #[inline]
    pub(crate) fn rk_b(&self, instruction: u32) -> Result<Value, VmError> {
        let b = decode_b(instruction);
        if is_const_b(instruction) {
            self.get_constant(b as usize)
        } else {
            Ok(self.get_register(b))
        }
    }

    /// Register or constant operand C
    #[inline]
    pub(crate) fn rk_c(&self, instruction: u32) -> Result<Value, VmError> {
        let c = decode_c(instruction);
        if is_const_c(instruction) {
            self.get_constant(c as usize)
        } else {
            Ok(self.get_register(c))
        }
    }

    /// Read the raw word following the current instruction
    pub(crate) fn fetch_extra_word(&mut self) -> Result<u32, VmError> {
        self.frame_mut()?
            .fetch()
            .ok_or_else(|| VmError::runtime("missing extra argument word"))
    }
}

fn frame_location(frame: &CallFrame) -> Option<SourceLocation> {
    frame.current_position().map(|pos| SourceLocation {
        source: frame.prototype().source.clone(),
        line: pos.line,
        column: pos.column,
    })
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
