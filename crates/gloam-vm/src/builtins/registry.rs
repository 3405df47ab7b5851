//! Built-in function registry
//!
//! Builtins are registered under qualified names (`print`,
//! `coroutine.resume`). Installing the registry turns each entry into a
//! native function value and files it in the global table, creating one
//! library table per prefix.

use crate::error::VmError;
use crate::table::{new_table, TableRef};
use crate::value::{Function, NativeFunction, Value};
use crate::vm::Vm;
use std::collections::HashMap;

/// Type signature for built-in functions
pub type NativeFn = fn(&mut Vm, Vec<Value>) -> Result<Vec<Value>, VmError>;

/// Metadata for a single built-in function
#[derive(Clone)]
pub struct BuiltinMetadata {
    /// Qualified name (`library.function` or a bare global name)
    pub name: String,
    pub func: NativeFn,
    /// Arguments that must be present; missing ones fault with
    /// "bad argument #n to 'f' (value expected)"
    pub min_args: u8,
}

impl BuiltinMetadata {
    /// Name as it appears in argument errors
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    fn library(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(lib, _)| lib)
    }

    fn to_native(&self) -> NativeFunction {
        let func = self.func;
        let min_args = self.min_args as usize;
        let short = self.short_name().to_string();
        NativeFunction::new(&self.name, move |vm, args| {
            if args.len() < min_args {
                return Err(VmError::runtime(format!(
                    "bad argument #{} to '{}' (value expected)",
                    args.len() + 1,
                    short
                )));
            }
            func(vm, args)
        })
    }
}

/// Builtins in registration order; installation follows that order
#[derive(Default)]
pub struct BuiltinRegistry {
    entries: Vec<BuiltinMetadata>,
    by_name: HashMap<String, usize>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `func` under its qualified name.
    ///
    /// # Panics
    /// Panics if the name is already registered.
    pub fn register(&mut self, name: &str, func: NativeFn, min_args: u8) {
        if self.by_name.contains_key(name) {
            panic!("Built-in function '{}' already registered", name);
        }
        self.by_name.insert(name.to_string(), self.entries.len());
        self.entries.push(BuiltinMetadata {
            name: name.to_string(),
            func,
            min_args,
        });
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinMetadata> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File every builtin in the VM's global table
    pub fn install(&self, vm: &mut Vm) {
        let globals = vm.globals();
        let mut libraries: HashMap<&str, TableRef> = HashMap::new();
        for meta in &self.entries {
            let value = Value::Function(Function::Native(meta.to_native()));
            match meta.library() {
                None => globals.write().set_str(&meta.name, value),
                Some(lib) => {
                    let table = libraries.entry(lib).or_insert_with(|| {
                        let table = new_table();
                        globals.write().set_str(lib, Value::Table(table.clone()));
                        table
                    });
                    table.write().set_str(meta.short_name(), value);
                }
            }
        }
        tracing::debug!(
            functions = self.entries.len(),
            libraries = libraries.len(),
            "builtins installed"
        );
    }
}
