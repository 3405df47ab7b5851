//! Arithmetic, bitwise, comparison and string operators

use super::helpers::*;
use crate::error::VmError;
use crate::opcode::OpCode;
use crate::value::Value;

#[test]
fn test_integer_float_promotion() {
    let mut asm = Asm::main();
    asm.load_k(0, 1274i64);
    asm.load_k(1, 72i64);
    asm.abc(OpCode::Sub, 2, 0, 1);
    asm.load_k(0, 32.0);
    asm.load_k(1, 112.0);
    asm.abc(OpCode::Sub, 3, 0, 1);
    asm.load_k(0, 42i64);
    asm.load_k(1, 32.0);
    asm.abc(OpCode::Sub, 4, 0, 1);
    asm.ret(2, 3);

    let result = run_ok(asm);
    assert_int(&result[0], 1202);
    assert_float(&result[1], -80.0);
    assert_float(&result[2], 10.0);
}

#[test]
fn test_division_power_and_floor_ops() {
    let mut asm = Asm::main();
    let (k7, k2, km7, k3) = (asm.k(7i64), asm.k(2i64), asm.k(-7i64), asm.k(3i64));
    let k75 = asm.k(7.5);
    asm.rk(OpCode::Div, 0, Rk::K(k7), Rk::K(k2));
    asm.rk(OpCode::Pow, 1, Rk::K(k2), Rk::K(k3));
    asm.rk(OpCode::IDiv, 2, Rk::K(k7), Rk::K(k2));
    asm.rk(OpCode::IDiv, 3, Rk::K(km7), Rk::K(k2));
    asm.rk(OpCode::Mod, 4, Rk::K(km7), Rk::K(k3));
    asm.rk(OpCode::Mod, 5, Rk::K(k75), Rk::K(k2));
    asm.rk(OpCode::IDiv, 6, Rk::K(k75), Rk::K(k2));
    asm.ret(0, 7);

    let result = run_ok(asm);
    assert_float(&result[0], 3.5);
    assert_float(&result[1], 8.0);
    assert_int(&result[2], 3);
    assert_int(&result[3], -4);
    assert_int(&result[4], 2);
    assert_float(&result[5], 1.5);
    assert_float(&result[6], 3.0);
}

#[test]
fn test_integer_division_by_zero_faults() {
    let mut asm = Asm::main();
    let (k1, k0) = (asm.k(1i64), asm.k(0i64));
    asm.rk(OpCode::IDiv, 0, Rk::K(k1), Rk::K(k0));
    asm.ret(0, 1);

    let err = run(asm).unwrap_err();
    assert!(matches!(err.root(), VmError::DivisionByZero));
    assert_eq!(err.to_string(), "test:1: attempt to perform 'n//0'");
}

#[test]
fn test_modulo_by_zero_faults_but_float_division_does_not() {
    let mut asm = Asm::main();
    let (k1, k0, kf0) = (asm.k(1i64), asm.k(0i64), asm.k(0.0));
    asm.rk(OpCode::Div, 0, Rk::K(k1), Rk::K(k0));
    asm.rk(OpCode::Mod, 1, Rk::K(k1), Rk::K(kf0));
    asm.ret(0, 2);
    let result = run_ok(asm);
    assert_float(&result[0], f64::INFINITY);
    assert!(matches!(result[1], Value::Float(f) if f.is_nan()));

    let mut asm = Asm::main();
    let (k1, k0) = (asm.k(1i64), asm.k(0i64));
    asm.rk(OpCode::Mod, 0, Rk::K(k1), Rk::K(k0));
    asm.ret(0, 1);
    let err = run(asm).unwrap_err();
    assert!(matches!(err.root(), VmError::ModuloByZero));
}

#[test]
fn test_numeric_strings_are_coerced() {
    let mut asm = Asm::main();
    let (ks, k5, kf, k2) = (asm.k("10"), asm.k(5i64), asm.k("3.0"), asm.k(2i64));
    asm.rk(OpCode::Add, 0, Rk::K(ks), Rk::K(k5));
    asm.rk(OpCode::Mul, 1, Rk::K(kf), Rk::K(k2));
    asm.ret(0, 2);

    let result = run_ok(asm);
    assert_int(&result[0], 15);
    assert_float(&result[1], 6.0);
}

#[test]
fn test_arithmetic_on_non_number_names_the_type() {
    let mut asm = Asm::main();
    asm.abc(OpCode::NewTable, 0, 0, 0);
    let k1 = asm.k(1i64);
    asm.rk(OpCode::Add, 1, Rk::K(k1), Rk::R(0));
    asm.ret(1, 1);

    let err = run(asm).unwrap_err();
    assert_eq!(err.to_string(), "test:2: attempt to perform arithmetic on a table value");
}

#[test]
fn test_bitwise_operators() {
    let mut asm = Asm::main();
    let kf0 = asm.k(0xF0i64);
    let k0f = asm.k(0x0Fi64);
    let (k5, k3, k1, k64, km1) = (asm.k(5i64), asm.k(3i64), asm.k(1i64), asm.k(64i64), asm.k(-1i64));
    let k3f = asm.k(3.0);
    asm.rk(OpCode::BOr, 0, Rk::K(kf0), Rk::K(k0f));
    asm.rk(OpCode::BAnd, 1, Rk::K(k5), Rk::K(k3));
    asm.rk(OpCode::BXor, 2, Rk::K(k5), Rk::K(k3));
    asm.rk(OpCode::Shl, 3, Rk::K(k1), Rk::K(k64));
    asm.rk(OpCode::Shr, 4, Rk::K(km1), Rk::K(k1));
    asm.rk(OpCode::Shl, 5, Rk::K(k64), Rk::K(km1));
    asm.rk(OpCode::BAnd, 6, Rk::K(k3f), Rk::K(k1));
    asm.abc(OpCode::BNot, 7, 1, 0);
    asm.ret(0, 8);

    let result = run_ok(asm);
    assert_int(&result[0], 0xFF);
    assert_int(&result[1], 1);
    assert_int(&result[2], 6);
    assert_int(&result[3], 0);
    assert_int(&result[4], i64::MAX);
    assert_int(&result[5], 32);
    assert_int(&result[6], 1);
    assert_int(&result[7], !1);
}

#[test]
fn test_bitwise_on_infinity_has_no_integer_representation() {
    let mut asm = Asm::main();
    let (kinf, k1) = (asm.k(f64::INFINITY), asm.k(1i64));
    asm.rk(OpCode::BOr, 0, Rk::K(kinf), Rk::K(k1));
    asm.ret(0, 1);

    let err = run(asm).unwrap_err();
    assert!(matches!(err.root(), VmError::NoIntegerRepresentation));
}

#[test]
fn test_unary_operators() {
    let mut asm = Asm::main();
    asm.load_int(0, 5);
    asm.abc(OpCode::Unm, 1, 0, 0);
    asm.abc(OpCode::Not, 2, 0, 0);
    asm.abc(OpCode::LoadNil, 3, 0, 0);
    asm.abc(OpCode::Not, 3, 3, 0);
    asm.load_k(4, "hello");
    asm.abc(OpCode::Len, 4, 4, 0);
    asm.ret(1, 4);

    let result = run_ok(asm);
    assert_int(&result[0], -5);
    assert_eq!(result[1], Value::Boolean(false));
    assert_eq!(result[2], Value::Boolean(true));
    assert_int(&result[3], 5);
}

#[test]
fn test_concat_numbers_and_strings() {
    let mut asm = Asm::main();
    asm.load_k(1, "a");
    asm.load_int(2, 1);
    asm.load_k(3, 2.0);
    asm.abc(OpCode::Concat, 0, 1, 3);
    asm.ret(0, 1);

    assert_eq!(run_ok(asm), vec![Value::string("a12.0")]);
}

#[test]
fn test_concat_of_boolean_faults() {
    let mut asm = Asm::main();
    asm.load_k(1, "a");
    asm.abc(OpCode::LoadBool, 2, 1, 0);
    asm.abc(OpCode::Concat, 0, 1, 2);
    asm.ret(0, 1);

    let err = run(asm).unwrap_err();
    assert!(err.to_string().ends_with("attempt to concatenate a boolean value"));
}

#[test]
fn test_comparisons_mix_integers_and_floats_exactly() {
    let mut asm = Asm::main();
    let (k1, k15, k1f) = (asm.k(1i64), asm.k(1.5), asm.k(1.0));
    let big = asm.k(i64::MAX);
    let big_f = asm.k(9_223_372_036_854_775_808.0);
    asm.compare(OpCode::Lt, 0, Rk::K(k1), Rk::K(k15));
    asm.compare(OpCode::Eq, 1, Rk::K(k1), Rk::K(k1f));
    asm.compare(OpCode::Le, 2, Rk::K(k15), Rk::K(k1));
    asm.compare(OpCode::Lt, 3, Rk::K(big), Rk::K(big_f));
    asm.ret(0, 4);

    let result = run_ok(asm);
    assert_eq!(
        result,
        vec![
            Value::Boolean(true),
            Value::Boolean(true),
            Value::Boolean(false),
            Value::Boolean(true),
        ]
    );
}

#[test]
fn test_string_ordering_and_mismatched_compare() {
    let mut asm = Asm::main();
    let (ka, kb) = (asm.k("a"), asm.k("b"));
    asm.compare(OpCode::Lt, 0, Rk::K(ka), Rk::K(kb));
    asm.ret(0, 1);
    assert_eq!(run_ok(asm), vec![Value::Boolean(true)]);

    let mut asm = Asm::main();
    let (ka, k1) = (asm.k("a"), asm.k(1i64));
    asm.compare(OpCode::Lt, 0, Rk::K(ka), Rk::K(k1));
    asm.ret(0, 1);
    let err = run(asm).unwrap_err();
    assert_eq!(err.to_string(), "test:1: attempt to compare string with number");
}

#[test]
fn test_test_and_testset() {
    // R1 = R0 or 7
    let mut asm = Asm::main();
    asm.abc(OpCode::LoadNil, 0, 0, 0);
    asm.abc(OpCode::TestSet, 1, 0, 1);
    asm.asbx(OpCode::Jmp, 0, 1);
    asm.load_int(1, 7);
    // R2 = R1 and 3 when R1 is truthy
    asm.abc(OpCode::Test, 1, 0, 0);
    asm.asbx(OpCode::Jmp, 0, 1);
    asm.load_int(2, 3);
    asm.ret(1, 2);

    let result = run_ok(asm);
    assert_int(&result[0], 7);
    assert_int(&result[1], 3);
}
