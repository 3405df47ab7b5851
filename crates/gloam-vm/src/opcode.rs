//! OpCode definitions for the Gloam VM
//!
//! This module defines the complete instruction set for the VM.
//! Instructions are encoded as 32-bit values, opcode in the low bits:
//!
//! Format ABC:  [9-bit C][9-bit B][8-bit A][6-bit opcode]
//! Format ABx:  [16-bit Bx][2 reserved][8-bit A][6-bit opcode]
//! Format AsBx: same as ABx, Bx read as a two's-complement `i16`
//!
//! The top bit of B and of C is a constant flag: when set, the low 8 bits
//! index the constant pool instead of the register window (written `RK`).
//! LOADKX and SETLIST (with C = 0) are followed by one raw 32-bit word.

use std::fmt;

/// Virtual machine instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ===== Constants & Moves =====
    /// Move register: R[A] = R[B]
    Move = 0,
    /// Load constant from pool: R[A] = K[Bx]
    LoadK = 1,
    /// Load constant with index in the next word: R[A] = K[extra]
    LoadKx = 2,
    /// Load integer immediate: R[A] = sBx
    LoadI = 3,
    /// Load float immediate: R[A] = sBx as float
    LoadF = 4,
    /// Load boolean: R[A] = (B != 0); if C != 0 then pc++
    LoadBool = 5,
    /// Load nil range: R[A], ..., R[A+B] = nil
    LoadNil = 6,

    // ===== Upvalues & Tables =====
    /// Get upvalue: R[A] = U[B]
    GetUpval = 7,
    /// Index upvalue: R[A] = U[B][RK(C)]
    GetTabUp = 8,
    /// Index table: R[A] = R[B][RK(C)]
    GetTable = 9,
    /// Assign through upvalue: U[A][RK(B)] = RK(C)
    SetTabUp = 10,
    /// Set upvalue: U[B] = R[A]
    SetUpval = 11,
    /// Assign table slot: R[A][RK(B)] = RK(C)
    SetTable = 12,
    /// New table: R[A] = {} (B = array size hint, C = hash size hint)
    NewTable = 13,
    /// Method lookup: R[A+1] = R[B]; R[A] = R[B][RK(C)]
    SelfOp = 14,

    // ===== Arithmetic & Bitwise =====
    /// Addition: R[A] = RK(B) + RK(C)
    Add = 15,
    /// Subtraction: R[A] = RK(B) - RK(C)
    Sub = 16,
    /// Multiplication: R[A] = RK(B) * RK(C)
    Mul = 17,
    /// Floored modulo: R[A] = RK(B) % RK(C)
    Mod = 18,
    /// Power (always float): R[A] = RK(B) ^ RK(C)
    Pow = 19,
    /// Division (always float): R[A] = RK(B) / RK(C)
    Div = 20,
    /// Floor division: R[A] = RK(B) // RK(C)
    IDiv = 21,
    /// Bitwise and: R[A] = RK(B) & RK(C)
    BAnd = 22,
    /// Bitwise or: R[A] = RK(B) | RK(C)
    BOr = 23,
    /// Bitwise xor: R[A] = RK(B) ~ RK(C)
    BXor = 24,
    /// Shift left: R[A] = RK(B) << RK(C)
    Shl = 25,
    /// Logical shift right: R[A] = RK(B) >> RK(C)
    Shr = 26,
    /// Negation: R[A] = -R[B]
    Unm = 27,
    /// Bitwise not: R[A] = ~R[B]
    BNot = 28,
    /// Logical not: R[A] = not R[B]
    Not = 29,
    /// Length: R[A] = #R[B]
    Len = 30,
    /// Concatenation: R[A] = R[B] .. ... .. R[C]
    Concat = 31,

    // ===== Jumps & Comparisons =====
    /// Jump: pc += sBx; if A != 0 close upvalues >= R[A-1]
    Jmp = 32,
    /// Equality test: if (RK(B) == RK(C)) != A then pc++
    Eq = 33,
    /// Less-than test: if (RK(B) < RK(C)) != A then pc++
    Lt = 34,
    /// Less-or-equal test: if (RK(B) <= RK(C)) != A then pc++
    Le = 35,
    /// Truth test: if truthy(R[A]) != C then pc++
    Test = 36,
    /// Test and copy: if truthy(R[B]) == C then R[A] = R[B] else pc++
    TestSet = 37,

    // ===== Functions =====
    /// Call: R[A], ..., R[A+C-2] = R[A](R[A+1], ..., R[A+B-1])
    Call = 38,
    /// Tail call: return R[A](R[A+1], ..., R[A+B-1])
    TailCall = 39,
    /// Return: return R[A], ..., R[A+B-2]
    Return = 40,

    // ===== Loops =====
    /// Numeric loop step: R[A] += R[A+2]; if in range { R[A+3] = R[A]; pc += sBx }
    ForLoop = 41,
    /// Numeric loop setup: validate R[A..A+2]; skip past FORLOOP if empty
    ForPrep = 42,
    /// Generic loop call: R[A+3], ..., R[A+2+C] = R[A](R[A+1], R[A+2])
    TForCall = 43,
    /// Generic loop test: if R[A+3] != nil { R[A+2] = R[A+3]; pc += sBx }
    TForLoop = 44,

    // ===== Construction =====
    /// Store list: R[A][(C-1)*FPF+i] = R[A+i], 1 <= i <= B
    SetList = 45,
    /// Create closure: R[A] = closure(proto[Bx])
    Closure = 46,
    /// Varargs: R[A], ..., R[A+B-2] = vararg
    VarArg = 47,

    // ===== Scopes =====
    /// Close upvalues and to-be-closed slots >= R[A]
    Close = 48,
    /// Mark R[A] as to-be-closed
    Tbc = 49,
}

/// Number of list items flushed per SETLIST batch
pub const FIELDS_PER_FLUSH: usize = 50;

impl OpCode {
    /// Every defined opcode, in encoding order
    pub const ALL: [OpCode; 50] = [
        OpCode::Move,
        OpCode::LoadK,
        OpCode::LoadKx,
        OpCode::LoadI,
        OpCode::LoadF,
        OpCode::LoadBool,
        OpCode::LoadNil,
        OpCode::GetUpval,
        OpCode::GetTabUp,
        OpCode::GetTable,
        OpCode::SetTabUp,
        OpCode::SetUpval,
        OpCode::SetTable,
        OpCode::NewTable,
        OpCode::SelfOp,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Mod,
        OpCode::Pow,
        OpCode::Div,
        OpCode::IDiv,
        OpCode::BAnd,
        OpCode::BOr,
        OpCode::BXor,
        OpCode::Shl,
        OpCode::Shr,
        OpCode::Unm,
        OpCode::BNot,
        OpCode::Not,
        OpCode::Len,
        OpCode::Concat,
        OpCode::Jmp,
        OpCode::Eq,
        OpCode::Lt,
        OpCode::Le,
        OpCode::Test,
        OpCode::TestSet,
        OpCode::Call,
        OpCode::TailCall,
        OpCode::Return,
        OpCode::ForLoop,
        OpCode::ForPrep,
        OpCode::TForCall,
        OpCode::TForLoop,
        OpCode::SetList,
        OpCode::Closure,
        OpCode::VarArg,
        OpCode::Close,
        OpCode::Tbc,
    ];

    /// Get opcode from its 6-bit code
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Convert opcode to byte value
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Operand layout used by this opcode
    pub fn format(self) -> OpFormat {
        match self {
            OpCode::LoadK | OpCode::Closure => OpFormat::ABx,
            OpCode::LoadI
            | OpCode::LoadF
            | OpCode::Jmp
            | OpCode::ForLoop
            | OpCode::ForPrep
            | OpCode::TForLoop => OpFormat::AsBx,
            _ => OpFormat::ABC,
        }
    }

    /// Whether a raw extra-argument word may follow this instruction
    pub fn takes_extra_word(self) -> bool {
        matches!(self, OpCode::LoadKx | OpCode::SetList)
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Move => "MOVE",
            OpCode::LoadK => "LOADK",
            OpCode::LoadKx => "LOADKX",
            OpCode::LoadI => "LOADI",
            OpCode::LoadF => "LOADF",
            OpCode::LoadBool => "LOADBOOL",
            OpCode::LoadNil => "LOADNIL",
            OpCode::GetUpval => "GETUPVAL",
            OpCode::GetTabUp => "GETTABUP",
            OpCode::GetTable => "GETTABLE",
            OpCode::SetTabUp => "SETTABUP",
            OpCode::SetUpval => "SETUPVAL",
            OpCode::SetTable => "SETTABLE",
            OpCode::NewTable => "NEWTABLE",
            OpCode::SelfOp => "SELF",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Mod => "MOD",
            OpCode::Pow => "POW",
            OpCode::Div => "DIV",
            OpCode::IDiv => "IDIV",
            OpCode::BAnd => "BAND",
            OpCode::BOr => "BOR",
            OpCode::BXor => "BXOR",
            OpCode::Shl => "SHL",
            OpCode::Shr => "SHR",
            OpCode::Unm => "UNM",
            OpCode::BNot => "BNOT",
            OpCode::Not => "NOT",
            OpCode::Len => "LEN",
            OpCode::Concat => "CONCAT",
            OpCode::Jmp => "JMP",
            OpCode::Eq => "EQ",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Test => "TEST",
            OpCode::TestSet => "TESTSET",
            OpCode::Call => "CALL",
            OpCode::TailCall => "TAILCALL",
            OpCode::Return => "RETURN",
            OpCode::ForLoop => "FORLOOP",
            OpCode::ForPrep => "FORPREP",
            OpCode::TForCall => "TFORCALL",
            OpCode::TForLoop => "TFORLOOP",
            OpCode::SetList => "SETLIST",
            OpCode::Closure => "CLOSURE",
            OpCode::VarArg => "VARARG",
            OpCode::Close => "CLOSE",
            OpCode::Tbc => "TBC",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Operand layout of an instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpFormat {
    ABC,
    ABx,
    AsBx,
}

/// Instruction encoding/decoding utilities
pub mod instruction {
    use super::OpCode;

    const OP_MASK: u32 = 0x3F;
    const POS_A: u32 = 6;
    const POS_B: u32 = 14;
    const POS_C: u32 = 23;
    const POS_BX: u32 = 16;
    const CONST_FLAG: u32 = 0x100;

    /// Encode instruction in ABC format
    #[inline]
    pub fn encode(op: OpCode, a: u8, b: u8, c: u8, b_is_const: bool, c_is_const: bool) -> u32 {
        let b = b as u32 | if b_is_const { CONST_FLAG } else { 0 };
        let c = c as u32 | if c_is_const { CONST_FLAG } else { 0 };
        (op.as_u8() as u32) | ((a as u32) << POS_A) | (b << POS_B) | (c << POS_C)
    }

    /// Encode instruction in ABC format with register operands only
    #[inline]
    pub fn encode_abc(op: OpCode, a: u8, b: u8, c: u8) -> u32 {
        encode(op, a, b, c, false, false)
    }

    /// Encode instruction in ABx format
    #[inline]
    pub fn encode_abx(op: OpCode, a: u8, bx: u16) -> u32 {
        (op.as_u8() as u32) | ((a as u32) << POS_A) | ((bx as u32) << POS_BX)
    }

    /// Encode instruction in AsBx format
    #[inline]
    pub fn encode_asbx(op: OpCode, a: u8, sbx: i16) -> u32 {
        encode_abx(op, a, sbx as u16)
    }

    /// Decode instruction opcode (6 bits, may be undefined)
    #[inline]
    pub fn decode_opcode(instruction: u32) -> u8 {
        (instruction & OP_MASK) as u8
    }

    /// Decode A operand
    #[inline]
    pub fn decode_a(instruction: u32) -> u8 {
        ((instruction >> POS_A) & 0xFF) as u8
    }

    /// Decode B operand (without its constant flag)
    #[inline]
    pub fn decode_b(instruction: u32) -> u8 {
        ((instruction >> POS_B) & 0xFF) as u8
    }

    /// Decode C operand (without its constant flag)
    #[inline]
    pub fn decode_c(instruction: u32) -> u8 {
        ((instruction >> POS_C) & 0xFF) as u8
    }

    /// Whether B indexes the constant pool
    #[inline]
    pub fn is_const_b(instruction: u32) -> bool {
        (instruction >> POS_B) & CONST_FLAG != 0
    }

    /// Whether C indexes the constant pool
    #[inline]
    pub fn is_const_c(instruction: u32) -> bool {
        (instruction >> POS_C) & CONST_FLAG != 0
    }

    /// Decode Bx operand (16-bit)
    #[inline]
    pub fn decode_bx(instruction: u32) -> u16 {
        (instruction >> POS_BX) as u16
    }

    /// Decode signed Bx operand
    #[inline]
    pub fn decode_sbx(instruction: u32) -> i16 {
        decode_bx(instruction) as i16
    }
}
