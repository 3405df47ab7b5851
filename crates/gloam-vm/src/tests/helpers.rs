//! Hand assembler and runners for VM integration tests

use crate::bytecode::{FunctionPrototype, UpvalueDescriptor};
use crate::error::VmError;
use crate::opcode::{instruction::*, OpCode};
use crate::sync::{Arc, Mutex};
use crate::value::Value;
use crate::vm::Vm;
use std::io::Write;

/// Register or constant operand
#[derive(Debug, Clone, Copy)]
pub enum Rk {
    R(u8),
    K(u8),
}

impl Rk {
    fn split(self) -> (u8, bool) {
        match self {
            Rk::R(r) => (r, false),
            Rk::K(k) => (k, true),
        }
    }
}

/// Builds a prototype one instruction per source line
pub struct Asm {
    proto: FunctionPrototype,
}

impl Asm {
    /// A main chunk; `Vm::load` binds upvalue 0 to the globals
    pub fn main() -> Self {
        Self::function("main").upvalue(UpvalueDescriptor::register("_ENV", 0))
    }

    pub fn function(name: &str) -> Self {
        let mut proto = FunctionPrototype::new(name, "test");
        proto.max_stack = 32;
        Self { proto }
    }

    /// A nested function that reaches the globals through upvalue 0
    pub fn with_env(name: &str) -> Self {
        Self::function(name).upvalue(UpvalueDescriptor::enclosing("_ENV", 0))
    }

    pub fn params(mut self, count: u8) -> Self {
        self.proto.param_count = count;
        self
    }

    pub fn vararg(mut self) -> Self {
        self.proto.is_vararg = true;
        self
    }

    pub fn upvalue(mut self, descriptor: UpvalueDescriptor) -> Self {
        self.proto.add_upvalue(descriptor);
        self
    }

    /// Constant pool index of `value`
    pub fn k(&mut self, value: impl Into<Value>) -> u8 {
        self.proto.add_constant(value.into()) as u8
    }

    /// Index of the next instruction
    pub fn pc(&self) -> usize {
        self.proto.code.len()
    }

    pub fn raw(&mut self, word: u32) -> usize {
        let line = self.proto.code.len() as u32 + 1;
        self.proto.add_instruction(word, line)
    }

    pub fn abc(&mut self, op: OpCode, a: u8, b: u8, c: u8) -> usize {
        self.raw(encode_abc(op, a, b, c))
    }

    pub fn rk(&mut self, op: OpCode, a: u8, b: Rk, c: Rk) -> usize {
        let (b, b_const) = b.split();
        let (c, c_const) = c.split();
        self.raw(encode(op, a, b, c, b_const, c_const))
    }

    pub fn abx(&mut self, op: OpCode, a: u8, bx: u16) -> usize {
        self.raw(encode_abx(op, a, bx))
    }

    pub fn asbx(&mut self, op: OpCode, a: u8, sbx: i16) -> usize {
        self.raw(encode_asbx(op, a, sbx))
    }

    /// Point the sBx of the instruction at `at` to `target`
    pub fn patch(&mut self, at: usize, target: usize) {
        let word = self.proto.code[at];
        let op = OpCode::from_u8(decode_opcode(word)).expect("patching a valid instruction");
        let offset = target as i64 - (at as i64 + 1);
        self.proto
            .patch_instruction(at, encode_asbx(op, decode_a(word), offset as i16));
    }

    pub fn load_int(&mut self, dst: u8, value: i16) -> usize {
        self.asbx(OpCode::LoadI, dst, value)
    }

    pub fn load_k(&mut self, dst: u8, value: impl Into<Value>) -> usize {
        let k = self.k(value);
        self.abx(OpCode::LoadK, dst, k as u16)
    }

    /// `R[dst] = _ENV[name]`
    pub fn get_global(&mut self, dst: u8, name: &str) -> usize {
        let k = self.k(name);
        self.rk(OpCode::GetTabUp, dst, Rk::R(0), Rk::K(k))
    }

    /// `_ENV[name] = R[src]`
    pub fn set_global(&mut self, name: &str, src: u8) -> usize {
        let k = self.k(name);
        self.rk(OpCode::SetTabUp, 0, Rk::K(k), Rk::R(src))
    }

    /// `R[dst] = R[table][field]`
    pub fn get_field(&mut self, dst: u8, table: u8, field: &str) -> usize {
        let k = self.k(field);
        self.rk(OpCode::GetTable, dst, Rk::R(table), Rk::K(k))
    }

    /// `R[dst] = library.function`
    pub fn get_lib(&mut self, dst: u8, library: &str, function: &str) {
        self.get_global(dst, library);
        self.get_field(dst, dst, function);
    }

    /// `R[dst] = (b <op> c)` for EQ, LT and LE, as a boolean
    pub fn compare(&mut self, op: OpCode, dst: u8, b: Rk, c: Rk) {
        self.rk(op, 1, b, c);
        self.asbx(OpCode::Jmp, 0, 1);
        self.abc(OpCode::LoadBool, dst, 0, 1);
        self.abc(OpCode::LoadBool, dst, 1, 0);
    }

    /// `RETURN a, count`
    pub fn ret(&mut self, a: u8, count: u8) -> usize {
        self.abc(OpCode::Return, a, count + 1, 0)
    }

    pub fn child(&mut self, asm: Asm) -> u16 {
        self.proto.add_prototype(asm.proto) as u16
    }

    pub fn proto(self) -> FunctionPrototype {
        self.proto
    }

    pub fn build(self) -> Arc<FunctionPrototype> {
        Arc::new(self.proto)
    }
}

pub fn run_in(vm: &mut Vm, asm: Asm) -> Result<Vec<Value>, VmError> {
    vm.execute(asm.build())
}

pub fn run(asm: Asm) -> Result<Vec<Value>, VmError> {
    run_in(&mut Vm::new(), asm)
}

pub fn run_ok(asm: Asm) -> Vec<Value> {
    run(asm).unwrap_or_else(|e| panic!("execution failed: {}", e))
}

pub fn assert_int(value: &Value, expected: i64) {
    match value {
        Value::Integer(i) => assert_eq!(*i, expected),
        other => panic!("expected integer {}, got {:?}", expected, other),
    }
}

pub fn assert_float(value: &Value, expected: f64) {
    match value {
        Value::Float(f) => assert_eq!(*f, expected),
        other => panic!("expected float {}, got {:?}", expected, other),
    }
}

/// Native that appends its arguments to `log` and returns nothing
pub fn recorder(log: &Arc<Mutex<Vec<Vec<Value>>>>) -> Value {
    let log = log.clone();
    Value::native("recorder", move |_, args| {
        log.lock().push(args);
        Ok(Vec::new())
    })
}

/// `print` sink that keeps what was written
#[derive(Clone, Default)]
pub struct Captured(pub Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
