//! Lock and reference-count types shared by the value model and the VM.
//! Locks come from parking_lot, so there is no poisoning to handle.

pub use parking_lot::{Mutex, RwLock};
pub use std::sync::Arc;

/// Shared mutable cell, the representation of tables
pub type Shared<T> = Arc<RwLock<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}
