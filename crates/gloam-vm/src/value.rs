//! Runtime value model
//!
//! `Value` is a closed sum type over every kind the VM manipulates. Reference
//! kinds (tables, functions, coroutines, files) compare and hash by identity;
//! everything else compares by value, with integers and floats meeting on
//! their mathematical value.

use crate::bytecode::Closure;
use crate::error::VmError;
use crate::sync::{Arc, Mutex};
use crate::table::TableRef;
use crate::vm::coroutine::CoroutineRef;
use crate::vm::Vm;
use std::fmt;
use std::fs::File;

/// Host callback signature for native functions
pub type NativeCallback = dyn Fn(&mut Vm, Vec<Value>) -> Result<Vec<Value>, VmError> + Send + Sync;

/// A host function callable from bytecode
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    func: Arc<NativeCallback>,
}

impl NativeFunction {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Vm, Vec<Value>) -> Result<Vec<Value>, VmError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the callback to completion (or until it raises an interrupt)
    #[inline]
    pub fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
        (self.func)(vm, args)
    }

    fn ptr_id(&self) -> usize {
        Arc::as_ptr(&self.func) as *const () as usize
    }
}

/// Callable values: bytecode closures and native functions
#[derive(Clone)]
pub enum Function {
    Closure(Arc<Closure>),
    Native(NativeFunction),
}

impl Function {
    /// Identity used for equality, hashing and display
    pub fn ptr_id(&self) -> usize {
        match self {
            Function::Closure(c) => Arc::as_ptr(c) as usize,
            Function::Native(n) => n.ptr_id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Closure(c) => &c.prototype.name,
            Function::Native(n) => n.name(),
        }
    }
}

/// Open file handle owned by the host
#[derive(Clone)]
pub struct FileHandle(Arc<FileInner>);

struct FileInner {
    name: String,
    file: Mutex<Option<File>>,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, file: File) -> Self {
        Self(Arc::new(FileInner {
            name: name.into(),
            file: Mutex::new(Some(file)),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Close the handle; returns false if it was already closed
    pub fn close(&self) -> bool {
        self.0.file.lock().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.0.file.lock().is_none()
    }

    /// Run `f` against the open file, if any
    pub fn with_file<R>(&self, f: impl FnOnce(&mut File) -> R) -> Option<R> {
        self.0.file.lock().as_mut().map(f)
    }

    fn ptr_id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Arc<str>),
    Table(TableRef),
    Function(Function),
    Coroutine(CoroutineRef),
    File(FileHandle),
}

impl Value {
    /// Build a string value
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Arc::from(s.as_ref()))
    }

    /// Wrap a native callback as a function value
    pub fn native<F>(name: &str, func: F) -> Value
    where
        F: Fn(&mut Vm, Vec<Value>) -> Result<Vec<Value>, VmError> + Send + Sync + 'static,
    {
        Value::Function(Function::Native(NativeFunction::new(name, func)))
    }

    /// Language-level type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Coroutine(_) => "thread",
            Value::File(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only nil and false are falsy
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Primitive equality: no metamethods
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(i), Value::Float(f)) | (Value::Float(f), Value::Integer(i)) => {
                float_to_integer(*f) == Some(*i)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_id() == b.ptr_id(),
            (Value::Coroutine(a), Value::Coroutine(b)) => Arc::ptr_eq(a, b),
            (Value::File(a), Value::File(b)) => a.ptr_id() == b.ptr_id(),
            _ => false,
        }
    }

    /// Numeric view of the value, coercing numeric strings
    pub fn to_number(&self) -> Option<Value> {
        match self {
            Value::Integer(_) | Value::Float(_) => Some(self.clone()),
            Value::String(s) => parse_number(s),
            _ => None,
        }
    }

    pub fn to_float(&self) -> Option<f64> {
        match self.to_number()? {
            Value::Integer(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Exact integer view: floats must have an integral value
    pub fn to_integer(&self) -> Option<i64> {
        match self.to_number()? {
            Value::Integer(i) => Some(i),
            Value::Float(f) => float_to_integer(f),
            _ => None,
        }
    }

    /// Identity of reference kinds (0 for plain values)
    pub fn ptr_id(&self) -> usize {
        match self {
            Value::Table(t) => Arc::as_ptr(t) as *const () as usize,
            Value::Function(f) => f.ptr_id(),
            Value::Coroutine(c) => Arc::as_ptr(c) as usize,
            Value::File(f) => f.ptr_id(),
            _ => 0,
        }
    }
}

/// Convert a float with an integral value in range to an integer
pub fn float_to_integer(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX is not
    if f.fract() == 0.0 && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parse a numeric literal the way `tonumber` does
pub fn parse_number(text: &str) -> Option<Value> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, digits) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        // hex integers wrap around, like the reference implementation
        let value = hex.bytes().fold(0i64, |acc, b| {
            acc.wrapping_mul(16)
                .wrapping_add((b as char).to_digit(16).unwrap_or(0) as i64)
        });
        return Some(Value::Integer(if negative { value.wrapping_neg() } else { value }));
    }
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
        return None;
    }
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = s.parse::<i64>() {
            return Some(Value::Integer(i));
        }
    }
    s.parse::<f64>().ok().map(Value::Float)
}

/// Format a float with `%.14g`, keeping a trailing `.0` on integral values
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let text = format_general(n, 14);
    if text.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        format!("{}.0", text)
    } else {
        text
    }
}

fn format_general(n: f64, precision: i32) -> String {
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let scientific = format!("{:.*e}", (precision - 1) as usize, n);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if exponent < -4 || exponent >= precision {
        let mantissa = strip_zeros(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        let decimals = (precision - 1 - exponent).max(0) as usize;
        strip_zeros(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn strip_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Table(_) => write!(f, "table: 0x{:08x}", self.ptr_id()),
            Value::Function(Function::Closure(_)) => write!(f, "function: 0x{:08x}", self.ptr_id()),
            Value::Function(Function::Native(_)) => {
                write!(f, "function: builtin: 0x{:08x}", self.ptr_id())
            }
            Value::Coroutine(_) => write!(f, "thread: 0x{:08x}", self.ptr_id()),
            Value::File(file) if file.is_closed() => write!(f, "file (closed)"),
            Value::File(_) => write!(f, "file (0x{:08x})", self.ptr_id()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::Function(func) => write!(f, "function<{}>", func.name()),
            other => write!(f, "{}", other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}
