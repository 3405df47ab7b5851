//! Instruction execution handlers

mod arithmetic;
mod comparison;
mod control;
mod functions;
mod loops;
mod tables;
mod variables;
