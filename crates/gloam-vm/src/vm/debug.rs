//! Debug breaks
//!
//! `debug.debug()` raises a break interrupt; the native-call site hands a
//! snapshot of the calling frame to the installed hook and then continues.

use super::Vm;
use crate::bytecode::SourcePosition;
use crate::error::VmError;
use crate::value::Value;
use std::sync::Arc;

/// State of the frame that requested the break
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub function: String,
    pub source: Arc<str>,
    pub position: Option<SourcePosition>,
    /// Register window, register 0 first
    pub registers: Vec<Value>,
    pub upvalues: Vec<(String, Value)>,
    pub depth: usize,
}

pub trait DebugHook: Send {
    /// Called at each break. An error (e.g. an exit interrupt) propagates
    /// out of the breaking call.
    fn on_break(&mut self, snapshot: &FrameSnapshot) -> Result<(), VmError>;
}

/// Hook that only logs the snapshot
#[derive(Debug, Default)]
pub struct LogDebugHook;

impl DebugHook for LogDebugHook {
    fn on_break(&mut self, snapshot: &FrameSnapshot) -> Result<(), VmError> {
        tracing::info!(
            function = %snapshot.function,
            source = %snapshot.source,
            line = snapshot.position.map(|p| p.line),
            depth = snapshot.depth,
            registers = ?snapshot.registers,
            upvalues = ?snapshot.upvalues,
            "debug break"
        );
        Ok(())
    }
}

impl Vm {
    pub fn set_debug_hook(&mut self, hook: Box<dyn DebugHook>) {
        self.debug_hook = Some(hook);
    }

    /// Snapshot of the innermost bytecode frame
    pub fn snapshot_frame(&self) -> Option<FrameSnapshot> {
        let frame = self.state.frames.last()?;
        let proto = frame.prototype();
        let registers = self.state.stack.read_range(frame.base, proto.max_stack as usize);
        let upvalues = proto
            .upvalues
            .iter()
            .zip(frame.closure.upvalues.iter())
            .map(|(desc, broker)| (desc.name.clone(), broker.get()))
            .collect();
        Some(FrameSnapshot {
            function: proto.name.clone(),
            source: proto.source.clone(),
            position: frame.current_position(),
            registers,
            upvalues,
            depth: self.state.frames.len(),
        })
    }

    pub(crate) fn debug_break(&mut self) -> Result<(), VmError> {
        let snapshot = match self.snapshot_frame() {
            Some(snapshot) => snapshot,
            None => return Ok(()),
        };
        let mut hook = self.debug_hook.take();
        let result = match hook.as_mut() {
            Some(hook) => hook.on_break(&snapshot),
            None => LogDebugHook.on_break(&snapshot),
        };
        self.debug_hook = hook;
        result
    }
}
