//! Mutable ordered lists.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::EvalError;

use super::Value;

/// A reference-shared list. Mutation requires the list to be unfrozen and
/// not under active iteration.
pub struct List {
    frozen: AtomicBool,
    iters: AtomicU32,
    items: Mutex<Vec<Value>>,
}

impl List {
    pub fn new(items: Vec<Value>) -> Arc<List> {
        Arc::new(List {
            frozen: AtomicBool::new(false),
            iters: AtomicU32::new(0),
            items: Mutex::new(items),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<Value> {
        self.lock().get(i).cloned()
    }

    /// A cheap snapshot: element handles are cloned, not contents.
    pub fn snapshot(&self) -> Vec<Value> {
        self.lock().clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn check_mutable(&self, verb: &str) -> Result<(), EvalError> {
        if self.is_frozen() {
            return Err(EvalError::frozen(format!("cannot {} frozen list", verb)));
        }
        if self.iters.load(Ordering::Acquire) > 0 {
            return Err(EvalError::frozen(format!("cannot {} list during iteration", verb)));
        }
        Ok(())
    }

    pub fn append(&self, v: Value) -> Result<(), EvalError> {
        self.check_mutable("append to")?;
        self.lock().push(v);
        Ok(())
    }

    pub fn extend_with(&self, vs: Vec<Value>) -> Result<(), EvalError> {
        self.check_mutable("extend")?;
        self.lock().extend(vs);
        Ok(())
    }

    pub fn insert_at(&self, i: usize, v: Value) -> Result<(), EvalError> {
        self.check_mutable("insert into")?;
        let mut items = self.lock();
        let i = i.min(items.len());
        items.insert(i, v);
        Ok(())
    }

    pub fn set_at(&self, i: usize, v: Value) -> Result<(), EvalError> {
        self.check_mutable("assign to element of")?;
        let mut items = self.lock();
        match items.get_mut(i) {
            Some(slot) => {
                *slot = v;
                Ok(())
            }
            None => Err(EvalError::index(format!(
                "list index {} out of range",
                i
            ))),
        }
    }

    pub fn remove_at(&self, i: usize) -> Result<Value, EvalError> {
        self.check_mutable("remove from")?;
        let mut items = self.lock();
        if i >= items.len() {
            return Err(EvalError::index(format!("list index {} out of range", i)));
        }
        Ok(items.remove(i))
    }

    pub fn clear(&self) -> Result<(), EvalError> {
        self.check_mutable("clear")?;
        self.lock().clear();
        Ok(())
    }

    pub fn freeze_value(&self) {
        if self.frozen.swap(true, Ordering::AcqRel) {
            return; // already frozen; stops cyclic recursion too
        }
        for v in self.snapshot() {
            v.freeze();
        }
    }

    pub(crate) fn begin_iteration(&self) {
        self.iters.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_iteration(&self) {
        self.iters.fetch_sub(1, Ordering::AcqRel);
    }

    /// Hash is defined only for frozen lists.
    pub(crate) fn hash32(&self) -> Result<u32, EvalError> {
        if !self.is_frozen() {
            return Err(EvalError::typ("unhashable type: list"));
        }
        let mut h: u32 = 0x1505;
        for v in self.snapshot() {
            h = h.wrapping_mul(31).wrapping_add(v.hash32()?);
        }
        Ok(h)
    }
}

impl std::fmt::Debug for List {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("List").field("len", &self.len()).finish()
    }
}
