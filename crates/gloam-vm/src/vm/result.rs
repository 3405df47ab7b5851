//! Execution result types

use crate::value::Value;

/// Result of instruction execution
#[derive(Debug)]
pub(crate) enum ExecutionResult {
    /// Continue to next instruction
    Continue,
    /// The current frame returned and has been popped
    Return(FrameExit),
}

/// Values leaving a frame and where the caller wants them
#[derive(Debug)]
pub(crate) struct FrameExit {
    pub values: Vec<Value>,
    pub ret_index: usize,
    pub nresults: Option<usize>,
}
