//! Closures and upvalue brokers

use super::helpers::*;
use crate::bytecode::UpvalueDescriptor;
use crate::opcode::OpCode;

/// `function(...) return <upvalue 0> end`
fn reader(name: &str, upvalue: UpvalueDescriptor) -> Asm {
    let mut asm = Asm::function(name).upvalue(upvalue);
    asm.abc(OpCode::GetUpval, 0, 0, 0);
    asm.ret(0, 1);
    asm
}

#[test]
fn test_closed_upvalue_stays_shared() {
    let mut inc = Asm::function("inc").upvalue(UpvalueDescriptor::register("n", 0));
    let one = inc.k(1i64);
    inc.abc(OpCode::GetUpval, 0, 0, 0);
    inc.rk(OpCode::Add, 0, Rk::R(0), Rk::K(one));
    inc.abc(OpCode::SetUpval, 0, 0, 0);
    inc.ret(0, 0);

    let mut factory = Asm::function("factory");
    factory.load_int(0, 0);
    let inc_idx = factory.child(inc);
    let get_idx = factory.child(reader("get", UpvalueDescriptor::register("n", 0)));
    factory.abx(OpCode::Closure, 1, inc_idx);
    factory.abx(OpCode::Closure, 2, get_idx);
    factory.ret(1, 2);

    let mut asm = Asm::main();
    let idx = asm.child(factory);
    asm.abx(OpCode::Closure, 0, idx);
    // R1, R2 = factory(); R3, R4 = factory()
    asm.abc(OpCode::Move, 5, 0, 0);
    asm.abc(OpCode::Call, 5, 1, 3);
    asm.abc(OpCode::Move, 1, 5, 0);
    asm.abc(OpCode::Move, 2, 6, 0);
    asm.abc(OpCode::Move, 5, 0, 0);
    asm.abc(OpCode::Call, 5, 1, 3);
    asm.abc(OpCode::Move, 3, 5, 0);
    asm.abc(OpCode::Move, 4, 6, 0);
    // inc() twice, inc2() once
    for f in [1, 1, 3] {
        asm.abc(OpCode::Move, 5, f, 0);
        asm.abc(OpCode::Call, 5, 1, 1);
    }
    asm.abc(OpCode::Move, 5, 2, 0);
    asm.abc(OpCode::Call, 5, 1, 2);
    asm.abc(OpCode::Move, 6, 4, 0);
    asm.abc(OpCode::Call, 6, 1, 2);
    asm.ret(5, 2);

    let result = run_ok(asm);
    assert_int(&result[0], 2);
    assert_int(&result[1], 1);
}

#[test]
fn test_write_through_open_upvalue_reaches_the_register() {
    let mut setter = Asm::function("set")
        .params(1)
        .upvalue(UpvalueDescriptor::register("x", 0));
    setter.abc(OpCode::SetUpval, 0, 0, 0);
    setter.ret(0, 0);

    let mut asm = Asm::main();
    asm.load_int(0, 1);
    let idx = asm.child(setter);
    asm.abx(OpCode::Closure, 1, idx);
    asm.abc(OpCode::Move, 2, 1, 0);
    asm.load_int(3, 42);
    asm.abc(OpCode::Call, 2, 2, 1);
    asm.ret(0, 1);

    assert_int(&run_ok(asm)[0], 42);
}

#[test]
fn test_enclosing_upvalue_follows_the_open_slot() {
    let mut outer = Asm::function("outer").upvalue(UpvalueDescriptor::register("x", 0));
    let inner_idx = outer.child(reader("inner", UpvalueDescriptor::enclosing("x", 0)));
    outer.abx(OpCode::Closure, 0, inner_idx);
    outer.ret(0, 1);

    let mut asm = Asm::main();
    asm.load_int(0, 7);
    let idx = asm.child(outer);
    asm.abx(OpCode::Closure, 1, idx);
    asm.abc(OpCode::Move, 2, 1, 0);
    asm.abc(OpCode::Call, 2, 1, 2);
    asm.abc(OpCode::Move, 3, 2, 0);
    asm.abc(OpCode::Call, 3, 1, 2);
    asm.load_int(0, 8);
    asm.abc(OpCode::Move, 4, 2, 0);
    asm.abc(OpCode::Call, 4, 1, 2);
    asm.ret(3, 2);

    let result = run_ok(asm);
    assert_int(&result[0], 7);
    assert_int(&result[1], 8);
}

#[test]
fn test_close_gives_each_iteration_its_own_variable() {
    let mut asm = Asm::main();
    asm.abc(OpCode::NewTable, 0, 0, 0);
    asm.load_int(1, 1);
    asm.load_int(2, 3);
    asm.load_int(3, 1);
    let prep = asm.asbx(OpCode::ForPrep, 1, 0);
    let body = asm.pc();
    let idx = asm.child(reader("get_i", UpvalueDescriptor::register("i", 4)));
    asm.abx(OpCode::Closure, 5, idx);
    asm.abc(OpCode::SetTable, 0, 4, 5);
    asm.abc(OpCode::Close, 4, 0, 0);
    let back = asm.asbx(OpCode::ForLoop, 1, 0);
    asm.patch(prep, back);
    asm.patch(back, body);

    asm.load_int(1, 0);
    for i in 1..=3i64 {
        let k = asm.k(i);
        asm.rk(OpCode::GetTable, 2, Rk::R(0), Rk::K(k));
        asm.abc(OpCode::Call, 2, 1, 2);
        asm.abc(OpCode::Add, 1, 1, 2);
    }
    asm.ret(1, 1);

    assert_int(&run_ok(asm)[0], 6);
}

#[test]
fn test_upvalue_closed_when_the_loop_exits_by_jump() {
    // JMP with A = 5 closes R4 and above on the way out
    let mut asm = Asm::main();
    asm.load_int(4, 10);
    let idx = asm.child(reader("get", UpvalueDescriptor::register("v", 4)));
    asm.abx(OpCode::Closure, 0, idx);
    asm.asbx(OpCode::Jmp, 5, 0);
    asm.load_int(4, 99);
    asm.abc(OpCode::Move, 1, 0, 0);
    asm.abc(OpCode::Call, 1, 1, 2);
    asm.ret(1, 1);

    assert_int(&run_ok(asm)[0], 10);
}
