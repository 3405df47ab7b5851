//! VM limits
//!
//! Limits can be built in code or loaded from JSON; missing fields take
//! their defaults.

use serde::{Deserialize, Serialize};

/// Maximum call stack depth
pub const MAX_CALL_DEPTH: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Slots allocated up front for each execution unit
    pub initial_stack_slots: usize,
    /// Hard ceiling on the value stack; growing past it faults
    pub max_stack_slots: usize,
    /// Maximum number of bytecode frames per execution unit
    pub max_call_depth: usize,
    /// Maximum nesting of host re-entry (metamethods, pcall, resume)
    pub max_native_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            initial_stack_slots: 256,
            max_stack_slots: 1_000_000,
            max_call_depth: MAX_CALL_DEPTH,
            max_native_depth: 200,
        }
    }
}

impl VmConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
