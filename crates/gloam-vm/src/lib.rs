//! Gloam Virtual Machine
//!
//! A register-based bytecode virtual machine for a small dynamically typed
//! scripting language with closures, coroutines, metatables and proper tail
//! calls. A compiler hands the VM `FunctionPrototype`s; the VM runs them.
//!
//! # Architecture
//!
//! - 32-bit instructions, up to 256 registers per call frame (8-bit addressing)
//! - One value stack and frame list per execution unit (main program or coroutine)
//! - Upvalue brokers that alias a live stack slot until the slot's scope ends
//! - Errors, yields, exits and debug breaks all travel on the `Result` channel
//!
//! # Modules
//!
//! - `opcode`: Instruction set and word encoding
//! - `value`, `table`: Runtime value model
//! - `bytecode`: Function prototypes and closures
//! - `vm`: Interpreter loop, calling convention, metatables, coroutines
//! - `builtins`: Native libraries installed into every VM
//! - `dump`: Persisted bytecode
//! - `error`: Faults and interrupts

#![allow(clippy::result_large_err)]

pub mod builtins;
pub mod bytecode;
pub mod bytecode_debug;
pub mod config;
pub mod dump;
pub mod error;
pub mod opcode;
pub mod sync;
pub mod table;
pub mod value;
pub mod vm;

// Re-export main types
pub use bytecode::{Closure, FunctionPrototype, UpvalueDescriptor};
pub use bytecode_debug::disassemble;
pub use config::VmConfig;
pub use error::{Interrupt, VmError};
pub use opcode::OpCode;
pub use table::{Table, TableRef};
pub use value::{Function, NativeFunction, Value};
pub use vm::{CoroutineStatus, Vm};
