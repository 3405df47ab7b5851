//! Coroutines
//!
//! A coroutine owns a parked `ExecState`. Resuming swaps it into the VM and
//! drives it until it returns, faults or yields; yielding parks it again.

use super::cancel::CancelToken;
use super::state::{ExecState, PendingResume};
use super::Vm;
use crate::error::{Interrupt, VmError};
use crate::sync::{Arc, Mutex, RwLock};
use crate::table::TableRef;
use crate::value::{Function, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineStatus {
    Suspended,
    Running,
    /// Resumed another coroutine and is waiting for it
    Normal,
    Dead,
}

impl CoroutineStatus {
    pub fn name(self) -> &'static str {
        match self {
            CoroutineStatus::Suspended => "suspended",
            CoroutineStatus::Running => "running",
            CoroutineStatus::Normal => "normal",
            CoroutineStatus::Dead => "dead",
        }
    }
}

pub type CoroutineRef = Arc<Coroutine>;

pub struct Coroutine {
    entry: Function,
    state: Mutex<Option<ExecState>>,
    status: Mutex<CoroutineStatus>,
    cancel: CancelToken,
    metatable: RwLock<Option<TableRef>>,
}

impl Coroutine {
    pub fn status(&self) -> CoroutineStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: CoroutineStatus) {
        *self.status.lock() = status;
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.read().clone()
    }

    pub fn set_metatable(&self, metatable: Option<TableRef>) {
        *self.metatable.write() = metatable;
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("entry", &self.entry.name())
            .field("status", &self.status())
            .finish()
    }
}

impl Vm {
    /// Create a suspended coroutine running `entry`
    pub fn create_coroutine(&mut self, entry: Value) -> Result<CoroutineRef, VmError> {
        let entry = match entry {
            Value::Function(f) => f,
            other => return Err(VmError::type_error("create a coroutine from", &other)),
        };
        let cancel = self.state.cancel.child();
        let state = ExecState::new(&self.config, cancel.clone(), true);
        tracing::debug!(entry = entry.name(), "coroutine created");
        Ok(Arc::new(Coroutine {
            entry,
            state: Mutex::new(Some(state)),
            status: Mutex::new(CoroutineStatus::Suspended),
            cancel,
            metatable: RwLock::new(None),
        }))
    }

    /// Resume `co` with `args`. Returns the values it yielded or returned,
    /// and whether it is still alive (`true` after a yield).
    pub fn resume(&mut self, co: &CoroutineRef, args: Vec<Value>) -> Result<(Vec<Value>, bool), VmError> {
        match co.status() {
            CoroutineStatus::Suspended => {}
            CoroutineStatus::Dead => return Err(VmError::runtime("cannot resume dead coroutine")),
            _ => return Err(VmError::runtime("cannot resume non-suspended coroutine")),
        }
        if co.cancel.is_cancelled() {
            co.set_status(CoroutineStatus::Dead);
            return Err(VmError::Cancelled);
        }
        if self.native_depth >= self.config.max_native_depth {
            return Err(VmError::StackOverflow);
        }
        let parked = co
            .state
            .lock()
            .take()
            .ok_or_else(|| VmError::runtime("cannot resume non-suspended coroutine"))?;

        if let Some(current) = self.coroutines.last() {
            current.set_status(CoroutineStatus::Normal);
        }
        co.set_status(CoroutineStatus::Running);
        let caller = std::mem::replace(&mut self.state, parked);
        self.coroutines.push(co.clone());
        self.native_depth += 1;
        tracing::trace!(entry = co.entry.name(), nargs = args.len(), "resume");

        let outcome = self.drive_coroutine(&co.entry, args);

        self.native_depth -= 1;
        self.coroutines.pop();
        let parked = std::mem::replace(&mut self.state, caller);
        if let Some(current) = self.coroutines.last() {
            current.set_status(CoroutineStatus::Running);
        }

        match outcome {
            Ok(values) => {
                tracing::debug!(entry = co.entry.name(), "coroutine finished");
                co.set_status(CoroutineStatus::Dead);
                Ok((values, false))
            }
            Err(VmError::Interrupt(Interrupt::Yield(values))) => {
                *co.state.lock() = Some(parked);
                co.set_status(CoroutineStatus::Suspended);
                Ok((values, true))
            }
            Err(err) => {
                tracing::debug!(entry = co.entry.name(), error = %err, "coroutine died");
                co.set_status(CoroutineStatus::Dead);
                Err(err)
            }
        }
    }

    fn drive_coroutine(&mut self, entry: &Function, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
        match self.state.pending.take() {
            Some(PendingResume::Call { ret_index, nresults }) => {
                if let Err(err) = self.place_results(ret_index, nresults, args) {
                    return Err(self.unwind(err, 0));
                }
                self.run(0)
            }
            Some(PendingResume::Entry) => Ok(args),
            None => match entry {
                Function::Native(native) => match self.invoke_native(native, args) {
                    Err(VmError::Interrupt(Interrupt::Yield(values))) => {
                        self.state.pending = Some(PendingResume::Entry);
                        Err(VmError::Interrupt(Interrupt::Yield(values)))
                    }
                    other => other,
                },
                Function::Closure(closure) => {
                    self.state.stack.set(0, Value::Function(entry.clone()))?;
                    self.state.stack.write_range(1, &args)?;
                    self.push_frame(closure.clone(), 0, args.len(), None)?;
                    self.run(0)
                }
            },
        }
    }

    /// Hand `values` to the resumer of the running coroutine. Natives return
    /// this result directly.
    pub fn yield_values(&self, values: Vec<Value>) -> Result<Vec<Value>, VmError> {
        Err(VmError::Interrupt(Interrupt::Yield(values)))
    }

    /// Kill a suspended coroutine: run the cleanup of its live frames, then
    /// cancel it and everything it spawned
    pub fn close_coroutine(&mut self, co: &CoroutineRef) -> Result<(), VmError> {
        match co.status() {
            CoroutineStatus::Dead => return Ok(()),
            CoroutineStatus::Suspended => {}
            _ => return Err(VmError::runtime("cannot close a non-suspended coroutine")),
        }
        let parked = co.state.lock().take();
        let mut result = Ok(());
        if let Some(parked) = parked {
            if !parked.frames.is_empty() {
                let caller = std::mem::replace(&mut self.state, parked);
                while let Some(frame) = self.state.frames.pop() {
                    if let Err(err) = self.cleanup_frame(frame, None) {
                        result = Err(err);
                    }
                }
                self.state = caller;
            }
        }
        co.cancel.cancel();
        co.set_status(CoroutineStatus::Dead);
        tracing::debug!(entry = co.entry.name(), "coroutine closed");
        result
    }

    /// The coroutine currently running, if any
    pub fn running_coroutine(&self) -> Option<CoroutineRef> {
        self.coroutines.last().cloned()
    }

    pub fn is_yieldable(&self) -> bool {
        self.state.is_yieldable()
    }
}
