//! Bytecode debugging utilities

use crate::bytecode::FunctionPrototype;
use crate::opcode::{instruction::*, OpCode, OpFormat};
use std::fmt::Write;

/// Disassembly listing of a prototype and, recursively, its children
pub fn disassemble(proto: &FunctionPrototype) -> String {
    let mut out = String::new();
    write_function(&mut out, proto, &proto.name);
    out
}

fn write_function(out: &mut String, func: &FunctionPrototype, path: &str) {
    let _ = writeln!(
        out,
        "function <{}:{}> {} ({} instructions)",
        func.source,
        func.line_defined,
        path,
        func.code.len()
    );
    let _ = writeln!(
        out,
        "{}{} params, {} slots, {} upvalues, {} constants, {} functions",
        func.param_count,
        if func.is_vararg { "+" } else { "" },
        func.max_stack,
        func.upvalues.len(),
        func.constants.len(),
        func.prototypes.len()
    );

    let mut pc = 0;
    while pc < func.code.len() {
        let instruction = func.code[pc];
        let line = func.position(pc).map(|p| p.line).unwrap_or(0);
        let _ = write!(out, "\t{:4}\t[{}]\t", pc + 1, line);
        let extra = write_instruction(out, instruction, pc, func);
        out.push('\n');
        pc += 1;
        if extra && pc < func.code.len() {
            let _ = writeln!(out, "\t{:4}\t[{}]\tEXTRAARG  {}", pc + 1, line, func.code[pc]);
            pc += 1;
        }
    }

    if !func.upvalues.is_empty() {
        let _ = writeln!(out, "upvalues ({}):", func.upvalues.len());
        for (i, upval) in func.upvalues.iter().enumerate() {
            let _ = writeln!(
                out,
                "\t{}\t{}\t{}\t{}",
                i,
                upval.name,
                if upval.in_stack { "register" } else { "upvalue" },
                upval.index
            );
        }
    }

    for (i, child) in func.prototypes.iter().enumerate() {
        out.push('\n');
        write_function(out, child, &format!("{}.<{}>", path, i));
    }
}

/// Writes one instruction; returns whether a raw extra word follows
fn write_instruction(out: &mut String, instruction: u32, pc: usize, func: &FunctionPrototype) -> bool {
    let opcode_byte = decode_opcode(instruction);
    let opcode = match OpCode::from_u8(opcode_byte) {
        Some(op) => op,
        None => {
            let _ = write!(out, "UNDEFINED {} (raw: 0x{:08x})", opcode_byte, instruction);
            return false;
        }
    };
    let a = decode_a(instruction);
    let _ = write!(out, "{:<9} {}", opcode.name(), a);

    match opcode.format() {
        OpFormat::ABC => {
            let _ = write!(
                out,
                " {} {}",
                operand(decode_b(instruction), is_const_b(instruction)),
                operand(decode_c(instruction), is_const_c(instruction))
            );
        }
        OpFormat::ABx => {
            let _ = write!(out, " {}", decode_bx(instruction));
        }
        OpFormat::AsBx => {
            let _ = write!(out, " {}", decode_sbx(instruction));
        }
    }

    let constant = |idx: usize| {
        func.constants
            .get_constant(idx)
            .map(|v| format!("{:?}", v))
            .unwrap_or_else(|| "?".to_string())
    };
    match opcode {
        OpCode::LoadK => {
            let _ = write!(out, "\t; {}", constant(decode_bx(instruction) as usize));
        }
        OpCode::Jmp | OpCode::ForLoop | OpCode::ForPrep | OpCode::TForLoop => {
            let target = pc as i64 + 2 + decode_sbx(instruction) as i64;
            let _ = write!(out, "\t; to {}", target);
        }
        OpCode::Closure => {
            if let Some(child) = func.prototypes.get(decode_bx(instruction) as usize) {
                let _ = write!(out, "\t; {}", child.name);
            }
        }
        _ => {
            let mut notes = Vec::new();
            if opcode.format() == OpFormat::ABC {
                if is_const_b(instruction) {
                    notes.push(constant(decode_b(instruction) as usize));
                }
                if is_const_c(instruction) {
                    notes.push(constant(decode_c(instruction) as usize));
                }
            }
            if !notes.is_empty() {
                let _ = write!(out, "\t; {}", notes.join(" "));
            }
        }
    }

    match opcode {
        OpCode::LoadKx => true,
        OpCode::SetList => decode_c(instruction) == 0,
        _ => false,
    }
}

fn operand(index: u8, is_const: bool) -> String {
    if is_const {
        format!("K{}", index)
    } else {
        index.to_string()
    }
}
