//! Value operation helpers
//!
//! Primitive semantics only; metamethod fallback lives in `meta`.

use crate::error::VmError;
use crate::value::{float_to_integer, Value};

/// Binary arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

impl ArithOp {
    /// Metamethod consulted when the operands are not numbers
    pub fn event(self) -> &'static str {
        match self {
            ArithOp::Add => "__add",
            ArithOp::Sub => "__sub",
            ArithOp::Mul => "__mul",
            ArithOp::Mod => "__mod",
            ArithOp::Pow => "__pow",
            ArithOp::Div => "__div",
            ArithOp::IDiv => "__idiv",
            ArithOp::BAnd => "__band",
            ArithOp::BOr => "__bor",
            ArithOp::BXor => "__bxor",
            ArithOp::Shl => "__shl",
            ArithOp::Shr => "__shr",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            ArithOp::BAnd | ArithOp::BOr | ArithOp::BXor | ArithOp::Shl | ArithOp::Shr
        )
    }
}

/// Apply `op` to two numeric (or numeric-string) operands.
/// `Ok(None)` means the operands are not numbers and a metamethod applies.
pub(crate) fn arith(op: ArithOp, left: &Value, right: &Value) -> Result<Option<Value>, VmError> {
    let (a, b) = match (left.to_number(), right.to_number()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(None),
    };
    if op.is_bitwise() {
        let (x, y) = (bitwise_operand(&a)?, bitwise_operand(&b)?);
        return Ok(Some(Value::Integer(match op {
            ArithOp::BAnd => x & y,
            ArithOp::BOr => x | y,
            ArithOp::BXor => x ^ y,
            ArithOp::Shl => shift_left(x, y),
            _ => shift_left(x, y.wrapping_neg()),
        })));
    }
    let value = match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => match op {
            ArithOp::Add => Value::Integer(x.wrapping_add(y)),
            ArithOp::Sub => Value::Integer(x.wrapping_sub(y)),
            ArithOp::Mul => Value::Integer(x.wrapping_mul(y)),
            ArithOp::Mod => Value::Integer(int_mod(x, y)?),
            ArithOp::IDiv => Value::Integer(int_idiv(x, y)?),
            ArithOp::Div => Value::Float(x as f64 / y as f64),
            _ => Value::Float((x as f64).powf(y as f64)),
        },
        (a, b) => {
            let x = as_float(&a);
            let y = as_float(&b);
            Value::Float(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Pow => x.powf(y),
                ArithOp::Mod => float_mod(x, y),
                _ => (x / y).floor(),
            })
        }
    };
    Ok(Some(value))
}

fn as_float(v: &Value) -> f64 {
    match v {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

// Floats are truncated toward zero; NaN and infinities have no integer form
fn bitwise_operand(v: &Value) -> Result<i64, VmError> {
    match v {
        Value::Integer(i) => Ok(*i),
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        _ => Err(VmError::NoIntegerRepresentation),
    }
}

/// Integer modulo with the sign of the divisor
pub(crate) fn int_mod(x: i64, y: i64) -> Result<i64, VmError> {
    if y == 0 {
        return Err(VmError::ModuloByZero);
    }
    if y == -1 {
        return Ok(0);
    }
    let r = x % y;
    Ok(if r != 0 && (r ^ y) < 0 { r + y } else { r })
}

/// Integer floor division
pub(crate) fn int_idiv(x: i64, y: i64) -> Result<i64, VmError> {
    if y == 0 {
        return Err(VmError::DivisionByZero);
    }
    if y == -1 {
        return Ok(x.wrapping_neg());
    }
    let q = x / y;
    Ok(if (x % y != 0) && ((x ^ y) < 0) { q - 1 } else { q })
}

pub(crate) fn float_mod(x: f64, y: f64) -> f64 {
    if y.is_infinite() && x.is_finite() {
        return if (x >= 0.0) == (y > 0.0) { x } else { y };
    }
    let r = x % y;
    if r != 0.0 && (r < 0.0) != (y < 0.0) {
        r + y
    } else {
        r
    }
}

/// Left shift; negative counts shift right, counts of 64 or more give zero
pub(crate) fn shift_left(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n) as i64
    } else {
        ((x as u64) >> (-n)) as i64
    }
}

/// Unary minus on a number (or numeric string)
pub(crate) fn negate(v: &Value) -> Option<Value> {
    match v.to_number()? {
        Value::Integer(i) => Some(Value::Integer(i.wrapping_neg())),
        Value::Float(f) => Some(Value::Float(-f)),
        _ => None,
    }
}

pub(crate) fn bit_not(v: &Value) -> Result<Option<Value>, VmError> {
    match v.to_number() {
        Some(n) => Ok(Some(Value::Integer(!bitwise_operand(&n)?))),
        None => Ok(None),
    }
}

/// Primitive ordering for numbers and strings; `None` for anything else
pub(crate) fn less_than(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x < y),
        (Value::Float(x), Value::Float(y)) => Some(x < y),
        (Value::Integer(i), Value::Float(f)) => Some(int_lt_float(*i, *f)),
        (Value::Float(f), Value::Integer(i)) => Some(float_lt_int(*f, *i)),
        (Value::String(x), Value::String(y)) => Some(x.as_bytes() < y.as_bytes()),
        _ => None,
    }
}

pub(crate) fn less_equal(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x <= y),
        (Value::Float(x), Value::Float(y)) => Some(x <= y),
        (Value::Integer(i), Value::Float(f)) => Some(!f.is_nan() && !float_lt_int(*f, *i)),
        (Value::Float(f), Value::Integer(i)) => Some(!f.is_nan() && !int_lt_float(*i, *f)),
        (Value::String(x), Value::String(y)) => Some(x.as_bytes() <= y.as_bytes()),
        _ => None,
    }
}

// Exact mixed comparisons: never round the integer through f64
fn int_lt_float(i: i64, f: f64) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= 9_223_372_036_854_775_808.0 {
        return true;
    }
    if f <= -9_223_372_036_854_775_808.0 {
        return false;
    }
    let c = f.ceil();
    match float_to_integer(c) {
        Some(ci) => i < ci,
        None => false,
    }
}

fn float_lt_int(f: f64, i: i64) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= 9_223_372_036_854_775_808.0 {
        return false;
    }
    if f < -9_223_372_036_854_775_808.0 {
        return true;
    }
    match float_to_integer(f.floor()) {
        Some(fi) => fi < i,
        None => true,
    }
}
