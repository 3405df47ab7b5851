//! Bytecode format and data structures

use crate::sync::Arc;
use crate::value::Value;
use crate::vm::upvalue::UpvalueRef;

/// Constant pool for a function prototype
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// Constant values (nil, booleans, numbers and strings)
    pub constants: Vec<Value>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant value and return its index, reusing an identical entry
    pub fn add_constant(&mut self, value: Value) -> usize {
        if let Some(idx) = self.constants.iter().position(|existing| same_constant(existing, &value)) {
            return idx;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Get constant by index
    pub fn get_constant(&self, idx: usize) -> Option<&Value> {
        self.constants.get(idx)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

// Integer 1 and float 1.0 are distinct constants
fn same_constant(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => false,
        _ => a.raw_equal(b),
    }
}

/// Where a closure finds one of its upvalues when it is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpvalueDescriptor {
    /// Name (for debugging)
    pub name: String,

    /// True: capture the enclosing frame's register `index`.
    /// False: share the enclosing closure's upvalue `index`.
    pub in_stack: bool,

    pub index: u8,
}

impl UpvalueDescriptor {
    pub fn register(name: &str, index: u8) -> Self {
        Self {
            name: name.to_string(),
            in_stack: true,
            index,
        }
    }

    pub fn enclosing(name: &str, index: u8) -> Self {
        Self {
            name: name.to_string(),
            in_stack: false,
            index,
        }
    }
}

/// Source position of one instruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

/// Function prototype (compiled function)
#[derive(Debug, Clone)]
pub struct FunctionPrototype {
    /// Function name (for debugging)
    pub name: String,

    /// Chunk name used in error positions
    pub source: Arc<str>,

    /// Line where the function was defined
    pub line_defined: u32,

    /// Number of fixed parameters
    pub param_count: u8,

    /// Accepts extra arguments through VARARG
    pub is_vararg: bool,

    /// Size of the register window
    pub max_stack: u16,

    /// Bytecode instructions (32-bit each)
    pub code: Vec<u32>,

    /// Position of each instruction, parallel to `code`
    pub positions: Vec<SourcePosition>,

    pub constants: ConstantPool,

    /// Upvalue descriptors (for closures)
    pub upvalues: Vec<UpvalueDescriptor>,

    /// Nested function prototypes
    pub prototypes: Vec<Arc<FunctionPrototype>>,
}

impl FunctionPrototype {
    /// Create a new function prototype
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: Arc::from(source),
            line_defined: 0,
            param_count: 0,
            is_vararg: false,
            max_stack: 2,
            code: Vec::new(),
            positions: Vec::new(),
            constants: ConstantPool::new(),
            upvalues: Vec::new(),
            prototypes: Vec::new(),
        }
    }

    /// Add an instruction and return its position
    pub fn add_instruction(&mut self, instruction: u32, line: u32) -> usize {
        self.add_instruction_at(instruction, SourcePosition { line, column: 0 })
    }

    pub fn add_instruction_at(&mut self, instruction: u32, position: SourcePosition) -> usize {
        self.code.push(instruction);
        self.positions.push(position);
        self.code.len() - 1
    }

    /// Append an instruction with its full source position
    pub fn emit(&mut self, instruction: u32, line: u32, column: u32) -> usize {
        self.add_instruction_at(instruction, SourcePosition { line, column })
    }

    /// Get instruction at position
    pub fn get_instruction(&self, pos: usize) -> Option<u32> {
        self.code.get(pos).copied()
    }

    /// Patch instruction at position
    pub fn patch_instruction(&mut self, pos: usize, instruction: u32) {
        if pos < self.code.len() {
            self.code[pos] = instruction;
        }
    }

    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.add_constant(value)
    }

    pub fn add_upvalue(&mut self, descriptor: UpvalueDescriptor) -> usize {
        self.upvalues.push(descriptor);
        self.upvalues.len() - 1
    }

    pub fn add_prototype(&mut self, prototype: FunctionPrototype) -> usize {
        self.prototypes.push(Arc::new(prototype));
        self.prototypes.len() - 1
    }

    /// Source position of the instruction at `pc`
    pub fn position(&self, pc: usize) -> Option<SourcePosition> {
        self.positions.get(pc).copied()
    }
}

/// Runtime closure (function + captured upvalues)
#[derive(Debug)]
pub struct Closure {
    /// Function prototype
    pub prototype: Arc<FunctionPrototype>,

    /// Captured upvalues (shared brokers)
    pub upvalues: Vec<UpvalueRef>,
}

impl Closure {
    /// Create a closure with no upvalues
    pub fn new(prototype: Arc<FunctionPrototype>) -> Self {
        Self {
            prototype,
            upvalues: Vec::new(),
        }
    }

    /// Create closure with upvalues
    pub fn with_upvalues(prototype: Arc<FunctionPrototype>, upvalues: Vec<UpvalueRef>) -> Self {
        Self {
            prototype,
            upvalues,
        }
    }
}
