//! Calling convention, tail calls, varargs and table construction

use super::helpers::*;
use crate::config::VmConfig;
use crate::error::VmError;
use crate::opcode::OpCode;
use crate::table::new_table;
use crate::value::Value;
use crate::vm::Vm;

fn depth_native(vm: &mut Vm) {
    vm.register_native("depth", |vm, _| Ok(vec![Value::Integer(vm.call_depth() as i64)]));
}

#[test]
fn test_tail_calls_run_in_constant_frames() {
    // count(n): if n == 0 then return depth() end return count(n - 1)
    let mut count = Asm::with_env("count").params(1);
    let zero = count.k(0i64);
    let one = count.k(1i64);
    count.rk(OpCode::Eq, 0, Rk::R(0), Rk::K(zero));
    let to_rec = count.asbx(OpCode::Jmp, 0, 0);
    count.get_global(1, "depth");
    count.abc(OpCode::TailCall, 1, 1, 0);
    count.abc(OpCode::Return, 1, 0, 0);
    let rec = count.pc();
    count.get_global(1, "count");
    count.rk(OpCode::Sub, 2, Rk::R(0), Rk::K(one));
    count.abc(OpCode::TailCall, 1, 2, 0);
    count.abc(OpCode::Return, 1, 0, 0);
    count.patch(to_rec, rec);

    let mut asm = Asm::main();
    let idx = asm.child(count);
    asm.abx(OpCode::Closure, 0, idx);
    asm.set_global("count", 0);
    asm.load_k(1, 20_000i64);
    asm.abc(OpCode::Call, 0, 2, 2);
    asm.ret(0, 1);

    let mut vm = Vm::new();
    depth_native(&mut vm);
    let result = run_in(&mut vm, asm).unwrap();
    assert_int(&result[0], 2);
}

#[test]
fn test_deep_recursion_overflows() {
    let mut rec = Asm::with_env("rec");
    rec.get_global(0, "rec");
    rec.abc(OpCode::Call, 0, 1, 1);
    rec.ret(0, 0);

    let mut asm = Asm::main();
    let idx = asm.child(rec);
    asm.abx(OpCode::Closure, 0, idx);
    asm.set_global("rec", 0);
    asm.abc(OpCode::Call, 0, 1, 1);
    asm.ret(0, 0);

    let mut vm = Vm::with_config(VmConfig {
        max_call_depth: 50,
        ..VmConfig::default()
    });
    let err = run_in(&mut vm, asm).unwrap_err();
    assert!(matches!(err.root(), VmError::StackOverflow));
    assert!(err.traceback().unwrap().contains("in function 'rec'"));
}

#[test]
fn test_call_metamethod_chain() {
    let mut vm = Vm::new();
    let inner = new_table();
    let inner_mt = new_table();
    inner_mt.write().set_str(
        "__call",
        Value::native("handler", |_, args| {
            assert!(matches!(args[0], Value::Table(_)));
            Ok(vec![Value::Integer(args.len() as i64), args[2].clone()])
        }),
    );
    inner.write().set_metatable(Some(inner_mt));
    let outer = new_table();
    let outer_mt = new_table();
    outer_mt.write().set_str("__call", Value::Table(inner));
    outer.write().set_metatable(Some(outer_mt));
    vm.set_global("obj", Value::Table(outer.clone()));

    let mut asm = Asm::main();
    asm.get_global(0, "obj");
    asm.load_int(1, 5);
    asm.abc(OpCode::Call, 0, 2, 3);
    asm.ret(0, 2);

    let result = run_in(&mut vm, asm).unwrap();
    assert_int(&result[0], 3);
    assert_int(&result[1], 5);

    let direct = vm.call_value(Value::Table(outer), vec![Value::Integer(9)]).unwrap();
    assert_eq!(direct, vec![Value::Integer(3), Value::Integer(9)]);
}

#[test]
fn test_calling_a_number_faults() {
    let mut asm = Asm::main();
    asm.load_int(0, 1);
    asm.abc(OpCode::Call, 0, 1, 1);
    asm.ret(0, 0);

    let err = run(asm).unwrap_err();
    assert!(matches!(err.root(), VmError::NotCallable("number")));
    assert_eq!(err.to_string(), "test:2: attempt to call a number value");
}

#[test]
fn test_varargs_and_open_results() {
    // rest(a, ...) return ...
    let mut rest = Asm::function("rest").params(1).vararg();
    rest.abc(OpCode::VarArg, 1, 0, 0);
    rest.abc(OpCode::Return, 1, 0, 0);

    let mut asm = Asm::main();
    let idx = asm.child(rest);
    asm.abx(OpCode::Closure, 0, idx);
    asm.load_int(1, 1);
    asm.load_int(2, 2);
    asm.load_int(3, 3);
    asm.abc(OpCode::Call, 0, 4, 0);
    asm.abc(OpCode::Return, 0, 0, 0);

    assert_eq!(run_ok(asm), vec![Value::Integer(2), Value::Integer(3)]);
}

#[test]
fn test_fixed_vararg_count_pads_with_nil() {
    // two(a, ...) local x, y = ...; return a, x, y
    let mut two = Asm::function("two").params(1).vararg();
    two.abc(OpCode::VarArg, 1, 3, 0);
    two.ret(0, 3);

    let mut asm = Asm::main();
    let idx = asm.child(two);
    asm.abx(OpCode::Closure, 0, idx);
    asm.abc(OpCode::Move, 1, 0, 0);
    asm.load_int(2, 1);
    asm.abc(OpCode::Call, 1, 2, 4);
    asm.abc(OpCode::Move, 4, 0, 0);
    asm.load_int(5, 1);
    asm.load_int(6, 2);
    asm.load_int(7, 3);
    asm.load_int(8, 4);
    asm.abc(OpCode::Call, 4, 5, 4);
    asm.ret(1, 6);

    let result = run_ok(asm);
    assert_eq!(
        result,
        vec![
            Value::Integer(1),
            Value::Nil,
            Value::Nil,
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
        ]
    );
}

#[test]
fn test_missing_parameters_are_nil() {
    let mut three = Asm::function("three").params(3);
    three.ret(0, 3);

    let mut asm = Asm::main();
    let idx = asm.child(three);
    asm.abx(OpCode::Closure, 0, idx);
    asm.load_int(1, 1);
    asm.abc(OpCode::Call, 0, 2, 0);
    asm.abc(OpCode::Return, 0, 0, 0);

    assert_eq!(run_ok(asm), vec![Value::Integer(1), Value::Nil, Value::Nil]);
}

#[test]
fn test_native_results_are_adjusted() {
    let mut vm = Vm::new();
    vm.register_native("three", |_, _| {
        Ok(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
    });

    let mut asm = Asm::main();
    asm.get_global(0, "three");
    asm.abc(OpCode::Call, 0, 1, 5);
    asm.get_global(4, "three");
    asm.abc(OpCode::Call, 4, 1, 2);
    asm.ret(0, 5);

    let result = run_in(&mut vm, asm).unwrap();
    assert_eq!(
        result,
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Nil,
            Value::Integer(1),
        ]
    );
}

#[test]
fn test_host_calls_bytecode_function() {
    let mut add = Asm::function("add").params(2);
    add.abc(OpCode::Add, 2, 0, 1);
    add.ret(2, 1);

    let mut vm = Vm::new();
    let func = vm.load(add.build());
    let result = vm
        .call_value(func, vec![Value::Integer(40), Value::Integer(2)])
        .unwrap();
    assert_eq!(result, vec![Value::Integer(42)]);
}

#[test]
fn test_method_call_on_string() {
    let mut vm = Vm::new();
    let strlib = new_table();
    strlib.write().set_str(
        "upper",
        Value::native("upper", |_, args| {
            let text = args[0].as_str().unwrap_or_default().to_uppercase();
            Ok(vec![Value::string(text)])
        }),
    );
    let mt = new_table();
    mt.write().set_str("__index", Value::Table(strlib));
    vm.set_string_metatable(Some(mt));

    let mut asm = Asm::main();
    asm.load_k(1, "abc");
    let upper = asm.k("upper");
    asm.rk(OpCode::SelfOp, 0, Rk::R(1), Rk::K(upper));
    asm.abc(OpCode::Call, 0, 2, 2);
    asm.ret(0, 1);

    let result = run_in(&mut vm, asm).unwrap();
    assert_eq!(result, vec![Value::string("ABC")]);
}

#[test]
fn test_setlist_with_extra_batch_word() {
    let mut asm = Asm::main();
    asm.abc(OpCode::NewTable, 0, 0, 0);
    asm.load_int(1, 10);
    asm.load_int(2, 20);
    asm.load_int(3, 30);
    asm.abc(OpCode::SetList, 0, 3, 0);
    asm.raw(2);
    let (k1, k51, k53) = (asm.k(1i64), asm.k(51i64), asm.k(53i64));
    asm.rk(OpCode::GetTable, 1, Rk::R(0), Rk::K(k1));
    asm.rk(OpCode::GetTable, 2, Rk::R(0), Rk::K(k51));
    asm.rk(OpCode::GetTable, 3, Rk::R(0), Rk::K(k53));
    asm.ret(1, 3);

    let result = run_ok(asm);
    assert_eq!(result, vec![Value::Nil, Value::Integer(10), Value::Integer(30)]);
}

#[test]
fn test_setlist_takes_open_call_results() {
    let mut vm = Vm::new();
    vm.register_native("three", |_, _| {
        Ok(vec![Value::Integer(7), Value::Integer(8), Value::Integer(9)])
    });

    // t = { 1, three() }; return #t, t[4]
    let mut asm = Asm::main();
    asm.abc(OpCode::NewTable, 0, 0, 0);
    asm.load_int(1, 1);
    asm.get_global(2, "three");
    asm.abc(OpCode::Call, 2, 1, 0);
    asm.abc(OpCode::SetList, 0, 0, 1);
    asm.abc(OpCode::Len, 1, 0, 0);
    let k4 = asm.k(4i64);
    asm.rk(OpCode::GetTable, 2, Rk::R(0), Rk::K(k4));
    asm.ret(1, 2);

    let result = run_in(&mut vm, asm).unwrap();
    assert_eq!(result, vec![Value::Integer(4), Value::Integer(9)]);
}
