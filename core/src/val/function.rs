//! Callable values: compiled functions, host builtins, and the cell slots
//! shared with nested closures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::compile::Funcode;
use crate::error::EvalError;
use crate::eval::Thread;
use crate::token::Position;
use crate::vm::ModuleEnv;

use super::Value;

/// A user-defined function produced by `MakeFunc`: compiled code bound to
/// its module environment, default values, and captured cells.
pub struct Function {
    pub funcode: Arc<Funcode>,
    pub module: Arc<ModuleEnv>,
    /// Default values for the trailing optional named parameters; required
    /// keyword-only parameters hold the `Mandatory` sentinel.
    pub defaults: Vec<Value>,
    /// Captured cells, aligned with `funcode.freevars`.
    pub freevars: Vec<Value>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.funcode.name
    }

    pub fn doc(&self) -> &str {
        &self.funcode.doc
    }

    /// Number of named parameters, including any `*args`/`**kwargs` sinks.
    pub fn num_params(&self) -> usize {
        self.funcode.params.len()
    }

    pub fn param(&self, i: usize) -> Option<(String, Position)> {
        self.funcode
            .params
            .get(i)
            .map(|p| (p.name.to_string(), p.pos))
    }

    pub fn position(&self) -> Position {
        self.funcode.pos
    }

    pub fn filename(&self) -> Arc<str> {
        self.module.program.filename.clone()
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<function {}>", self.name())
    }
}

/// Signature of a host-provided builtin.
pub type NativeFn =
    fn(&mut Thread, &Builtin, &[Value], &[(String, Value)]) -> Result<Value, EvalError>;

/// A host builtin, optionally bound to a receiver (a method).
pub struct Builtin {
    pub name: Arc<str>,
    pub recv: Option<Value>,
    pub func: NativeFn,
}

impl Builtin {
    pub fn new(name: &str, func: NativeFn) -> Builtin {
        Builtin {
            name: Arc::<str>::from(name),
            recv: None,
            func,
        }
    }

    /// The builtin as a value; the usual way to predeclare one.
    pub fn value(name: &str, func: NativeFn) -> Value {
        Value::Builtin(Arc::new(Builtin::new(name, func)))
    }

    pub fn bind(&self, recv: Value) -> Value {
        Value::Builtin(Arc::new(Builtin {
            name: self.name.clone(),
            recv: Some(recv),
            func: self.func,
        }))
    }

    /// The bound receiver; only methods have one.
    pub fn receiver(&self) -> Option<&Value> {
        self.recv.as_ref()
    }
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.recv {
            Some(r) => write!(f, "<built-in method {} of {} value>", self.name, r.type_name()),
            None => write!(f, "<built-in function {}>", self.name),
        }
    }
}

/// A shared variable slot referenced by nested functions.
pub struct CellSlot {
    frozen: AtomicBool,
    content: Mutex<Option<Value>>,
}

impl CellSlot {
    pub fn new(initial: Option<Value>) -> Arc<CellSlot> {
        Arc::new(CellSlot {
            frozen: AtomicBool::new(false),
            content: Mutex::new(initial),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Value>> {
        self.content.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> Option<Value> {
        self.lock().clone()
    }

    pub fn set(&self, v: Value) -> Result<(), EvalError> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(EvalError::frozen("cannot assign to frozen variable"));
        }
        *self.lock() = Some(v);
        Ok(())
    }

    pub fn freeze_value(&self) {
        if self.frozen.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(v) = self.get() {
            v.freeze();
        }
    }
}

impl std::fmt::Debug for CellSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellSlot").finish()
    }
}
