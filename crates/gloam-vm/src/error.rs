//! Error types for the VM

use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Non-error control transfers that travel on the error channel
#[derive(Debug, Clone)]
pub enum Interrupt {
    /// Suspend the running coroutine, handing these values to the resumer
    Yield(Vec<Value>),
    /// Terminate the program with a status code
    Exit(i32),
    /// Pause at the current native-call site and hand control to the debug hook
    DebugBreak,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Yield(values) => write!(f, "yield of {} value(s)", values.len()),
            Interrupt::Exit(code) => write!(f, "exit with status {}", code),
            Interrupt::DebugBreak => write!(f, "debug break"),
        }
    }
}

/// Position of an instruction in its source chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub source: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

/// One line of a traceback
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub function: String,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}:{}: in function '{}'", loc.source, loc.line, self.function),
            None => write!(f, "?: in function '{}'", self.function),
        }
    }
}

/// A fault decorated with where it happened and the live call chain
#[derive(Debug, Clone)]
pub struct LocatedError {
    pub error: VmError,
    pub location: Option<SourceLocation>,
    pub traceback: Vec<TraceEntry>,
}

impl LocatedError {
    /// Multi-line traceback, innermost frame first
    pub fn traceback_string(&self) -> String {
        let mut out = String::from("stack traceback:");
        for entry in &self.traceback {
            out.push_str("\n\t");
            out.push_str(&entry.to_string());
        }
        out
    }
}

impl fmt::Display for LocatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, &self.location) {
            // raised values carry their own message
            (VmError::Raised(_), _) | (_, None) => write!(f, "{}", self.error),
            (err, Some(loc)) => write!(f, "{}: {}", loc, err),
        }
    }
}

/// VM runtime errors
#[derive(Debug, Clone, Error)]
pub enum VmError {
    /// Value stack or call depth exhausted
    #[error("stack overflow")]
    StackOverflow,

    /// Operation applied to a value of the wrong kind
    #[error("attempt to {operation} a {got} value")]
    TypeError {
        operation: &'static str,
        got: &'static str,
    },

    /// Ordering comparison between incompatible values
    #[error("{}", compare_message(.left, .right))]
    CompareError {
        left: &'static str,
        right: &'static str,
    },

    /// Call target is not a function and has no `__call`
    #[error("attempt to call a {0} value")]
    NotCallable(&'static str),

    /// Bitwise operand is not representable as an integer
    #[error("number has no integer representation")]
    NoIntegerRepresentation,

    /// Integer modulo by zero
    #[error("attempt to perform 'n%%0'")]
    ModuloByZero,

    /// Integer floor division by zero
    #[error("attempt to perform 'n//0'")]
    DivisionByZero,

    /// Non-numeric numeric-for control value
    #[error("'for' {0} must be a number")]
    ForLoop(&'static str),

    /// Numeric-for with a zero step
    #[error("'for' step is zero")]
    ForStepZero,

    /// Table key is nil or NaN
    #[error("table index is {0}")]
    InvalidKey(&'static str),

    /// Opcode outside the defined instruction set
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Execution cancelled through a cancel token
    #[error("execution cancelled")]
    Cancelled,

    /// Runtime error with message
    #[error("{0}")]
    Runtime(String),

    /// Arbitrary value raised by `error`
    #[error("{}", raised_message(.0))]
    Raised(Value),

    /// Fault decorated with position and traceback
    #[error("{0}")]
    Located(Box<LocatedError>),

    /// Yield, exit or debug break travelling to its handler
    #[error("{0}")]
    Interrupt(Interrupt),
}

fn compare_message(left: &str, right: &str) -> String {
    if left == right {
        format!("attempt to compare two {} values", left)
    } else {
        format!("attempt to compare {} with {}", left, right)
    }
}

fn raised_message(value: &Value) -> String {
    match value {
        Value::String(_) | Value::Integer(_) | Value::Float(_) => value.to_string(),
        Value::Nil => "nil".to_string(),
        other => format!("({} error object is not a string)", other.type_name()),
    }
}

impl VmError {
    pub fn runtime(msg: impl Into<String>) -> Self {
        VmError::Runtime(msg.into())
    }

    pub fn type_error(operation: &'static str, value: &Value) -> Self {
        VmError::TypeError {
            operation,
            got: value.type_name(),
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, VmError::Interrupt(_))
    }

    /// Status code of an `Exit` interrupt
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            VmError::Interrupt(Interrupt::Exit(code)) => Some(*code),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), VmError::Cancelled)
    }

    /// The underlying error without location decoration
    pub fn root(&self) -> &VmError {
        match self {
            VmError::Located(located) => located.error.root(),
            other => other,
        }
    }

    /// Location of the fault, if it was decorated
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            VmError::Located(located) => located.location.as_ref(),
            _ => None,
        }
    }

    pub fn traceback(&self) -> Option<String> {
        match self {
            VmError::Located(located) => Some(located.traceback_string()),
            _ => None,
        }
    }

    /// The value a protected call hands back for this error
    pub fn payload(&self) -> Value {
        match self {
            VmError::Raised(value) => value.clone(),
            VmError::Located(located) => match &located.error {
                VmError::Raised(value) => value.clone(),
                _ => Value::string(self.to_string()),
            },
            other => Value::string(other.to_string()),
        }
    }
}
