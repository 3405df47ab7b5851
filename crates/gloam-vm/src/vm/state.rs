//! Execution units
//!
//! The main program and every coroutine run in their own `ExecState`: a value
//! stack, a frame list and a cancel token. Resuming a coroutine swaps its
//! state into the VM; yielding swaps it back out.

use super::cancel::CancelToken;
use super::frame::CallFrame;
use super::stack::ValueStack;
use crate::config::VmConfig;

/// Where the values passed to the next resume go
#[derive(Debug, Clone, Copy)]
pub(crate) enum PendingResume {
    /// The unit is parked inside a CALL; resume values become its results
    Call {
        ret_index: usize,
        nresults: Option<usize>,
    },
    /// A native entry function yielded; resume values finish the coroutine
    Entry,
}

#[derive(Debug)]
pub struct ExecState {
    pub(crate) stack: ValueStack,
    pub(crate) frames: Vec<CallFrame>,
    /// One past the last live slot after a multi-value producer
    pub(crate) top: usize,
    pub(crate) cancel: CancelToken,
    pub(crate) is_coroutine: bool,
    /// Host re-entries currently active on this unit
    pub(crate) nested_calls: usize,
    pub(crate) pending: Option<PendingResume>,
}

impl ExecState {
    pub(crate) fn new(config: &VmConfig, cancel: CancelToken, is_coroutine: bool) -> Self {
        Self {
            stack: ValueStack::new(config.initial_stack_slots, config.max_stack_slots),
            frames: Vec::with_capacity(16),
            top: 0,
            cancel,
            is_coroutine,
            nested_calls: 0,
            pending: None,
        }
    }

    /// First slot no frame or pending value uses
    pub(crate) fn free_slot(&self) -> usize {
        let frame_top = self.frames.last().map(|f| f.top()).unwrap_or(0);
        self.top.max(frame_top)
    }

    pub(crate) fn is_yieldable(&self) -> bool {
        self.is_coroutine && self.nested_calls == 0
    }
}
