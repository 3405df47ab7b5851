//! Built-in functions module
//!
//! The native libraries every VM starts with, organized by category:
//! - Base: errors, types, raw access, metatables, traversal, print
//! - Coroutine: create, resume, yield, status, close, wrap
//! - Debug: debug break, traceback, raw metatable access
//! - OS: exit

pub mod base;
pub mod coroutine;
pub mod debug;
pub mod os;
pub mod registry;
pub mod utils;

use crate::vm::Vm;
use registry::BuiltinRegistry;

/// Create and populate the built-in function registry
pub fn create_builtin_registry() -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();

    // Base
    registry.register("assert", base::base_assert, 1);
    registry.register("error", base::base_error, 0);
    registry.register("pcall", base::base_pcall, 1);
    registry.register("xpcall", base::base_xpcall, 2);
    registry.register("type", base::base_type, 1);
    registry.register("tostring", base::base_tostring, 1);
    registry.register("tonumber", base::base_tonumber, 1);
    registry.register("rawget", base::base_rawget, 2);
    registry.register("rawset", base::base_rawset, 3);
    registry.register("rawequal", base::base_rawequal, 2);
    registry.register("rawlen", base::base_rawlen, 1);
    registry.register("setmetatable", base::base_setmetatable, 1);
    registry.register("getmetatable", base::base_getmetatable, 1);
    registry.register("next", base::base_next, 1);
    registry.register("pairs", base::base_pairs, 1);
    registry.register("ipairs", base::base_ipairs, 1);
    registry.register("select", base::base_select, 1);
    registry.register("print", base::base_print, 0);

    // Coroutine
    registry.register("coroutine.create", coroutine::co_create, 1);
    registry.register("coroutine.resume", coroutine::co_resume, 1);
    registry.register("coroutine.yield", coroutine::co_yield, 0);
    registry.register("coroutine.status", coroutine::co_status, 1);
    registry.register("coroutine.close", coroutine::co_close, 1);
    registry.register("coroutine.wrap", coroutine::co_wrap, 1);
    registry.register("coroutine.isyieldable", coroutine::co_isyieldable, 0);
    registry.register("coroutine.running", coroutine::co_running, 0);

    // Debug
    registry.register("debug.debug", debug::debug_debug, 0);
    registry.register("debug.traceback", debug::debug_traceback, 0);
    registry.register("debug.getmetatable", debug::debug_getmetatable, 1);
    registry.register("debug.setmetatable", debug::debug_setmetatable, 2);

    // OS
    registry.register("os.exit", os::os_exit, 0);

    registry
}

/// Install every builtin library into the VM's globals
pub fn open_libs(vm: &mut Vm) {
    create_builtin_registry().install(vm);
}
