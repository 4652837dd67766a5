//! Insertion-ordered dictionaries and sets.
//!
//! Keys must be hashable at insertion time. Deleting a key and inserting it
//! again places it at the end, preserving the later insertion position.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::{IndexMap, IndexSet};

use crate::error::EvalError;

use super::Value;

/// A value key paired with its precomputed hash.
#[derive(Clone, Debug)]
pub struct HKey {
    pub hash: u32,
    pub key: Value,
}

impl HKey {
    pub fn new(key: &Value) -> Result<HKey, EvalError> {
        Ok(HKey {
            hash: key.hash32()?,
            key: key.clone(),
        })
    }
}

impl Hash for HKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash);
    }
}

impl PartialEq for HKey {
    fn eq(&self, other: &Self) -> bool {
        // Keys are hashable values; equality on them cannot recurse forever.
        self.hash == other.hash && super::equal(&self.key, &other.key).unwrap_or(false)
    }
}

impl Eq for HKey {}

pub struct Dict {
    frozen: AtomicBool,
    iters: AtomicU32,
    entries: Mutex<IndexMap<HKey, Value>>,
}

impl Dict {
    pub fn new() -> Arc<Dict> {
        Arc::new(Dict {
            frozen: AtomicBool::new(false),
            iters: AtomicU32::new(0),
            entries: Mutex::new(IndexMap::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<HKey, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn check_mutable(&self, verb: &str) -> Result<(), EvalError> {
        if self.is_frozen() {
            return Err(EvalError::frozen(format!("cannot {} frozen dict", verb)));
        }
        if self.iters.load(Ordering::Acquire) > 0 {
            return Err(EvalError::frozen(format!("cannot {} dict during iteration", verb)));
        }
        Ok(())
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, EvalError> {
        let hk = HKey::new(key)?;
        Ok(self.lock().get(&hk).cloned())
    }

    pub fn contains(&self, key: &Value) -> Result<bool, EvalError> {
        let hk = HKey::new(key)?;
        Ok(self.lock().contains_key(&hk))
    }

    pub fn insert(&self, key: &Value, value: Value) -> Result<(), EvalError> {
        self.check_mutable("insert into")?;
        let hk = HKey::new(key)?;
        self.lock().insert(hk, value);
        Ok(())
    }

    /// Remove a key, shifting later entries down so that reinsertion lands
    /// at the end.
    pub fn delete(&self, key: &Value) -> Result<Option<Value>, EvalError> {
        self.check_mutable("delete from")?;
        let hk = HKey::new(key)?;
        Ok(self.lock().shift_remove(&hk))
    }

    pub fn clear(&self) -> Result<(), EvalError> {
        self.check_mutable("clear")?;
        self.lock().clear();
        Ok(())
    }

    pub fn key_at(&self, i: usize) -> Option<Value> {
        self.lock().get_index(i).map(|(k, _)| k.key.clone())
    }

    pub fn entry_at(&self, i: usize) -> Option<(Value, Value)> {
        self.lock()
            .get_index(i)
            .map(|(k, v)| (k.key.clone(), v.clone()))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.lock().keys().map(|k| k.key.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.lock().values().cloned().collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.key.clone(), v.clone()))
            .collect()
    }

    pub fn freeze_value(&self) {
        if self.frozen.swap(true, Ordering::AcqRel) {
            return;
        }
        for (k, v) in self.items() {
            k.freeze();
            v.freeze();
        }
    }

    pub(crate) fn begin_iteration(&self) {
        self.iters.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_iteration(&self) {
        self.iters.fetch_sub(1, Ordering::AcqRel);
    }

    /// Order-insensitive hash, defined only once frozen.
    pub(crate) fn hash32(&self) -> Result<u32, EvalError> {
        if !self.is_frozen() {
            return Err(EvalError::typ("unhashable type: dict"));
        }
        let mut h: u32 = 0x9747;
        for (k, v) in self.items() {
            let entry = k.hash32()?.wrapping_mul(3).wrapping_add(v.hash32()?);
            h = h.wrapping_add(entry);
        }
        Ok(h)
    }
}

impl std::fmt::Debug for Dict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dict").field("len", &self.len()).finish()
    }
}

pub struct Set {
    frozen: AtomicBool,
    iters: AtomicU32,
    entries: Mutex<IndexSet<HKey>>,
}

impl Set {
    pub fn new() -> Arc<Set> {
        Arc::new(Set {
            frozen: AtomicBool::new(false),
            iters: AtomicU32::new(0),
            entries: Mutex::new(IndexSet::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, IndexSet<HKey>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn check_mutable(&self, verb: &str) -> Result<(), EvalError> {
        if self.is_frozen() {
            return Err(EvalError::frozen(format!("cannot {} frozen set", verb)));
        }
        if self.iters.load(Ordering::Acquire) > 0 {
            return Err(EvalError::frozen(format!("cannot {} set during iteration", verb)));
        }
        Ok(())
    }

    pub fn add(&self, v: &Value) -> Result<(), EvalError> {
        self.check_mutable("insert into")?;
        let hk = HKey::new(v)?;
        self.lock().insert(hk);
        Ok(())
    }

    pub fn remove(&self, v: &Value) -> Result<bool, EvalError> {
        self.check_mutable("delete from")?;
        let hk = HKey::new(v)?;
        Ok(self.lock().shift_remove(&hk))
    }

    pub fn contains(&self, v: &Value) -> Result<bool, EvalError> {
        let hk = HKey::new(v)?;
        Ok(self.lock().contains(&hk))
    }

    pub fn key_at(&self, i: usize) -> Option<Value> {
        self.lock().get_index(i).map(|k| k.key.clone())
    }

    pub fn items(&self) -> Vec<Value> {
        self.lock().iter().map(|k| k.key.clone()).collect()
    }

    pub fn freeze_value(&self) {
        if self.frozen.swap(true, Ordering::AcqRel) {
            return;
        }
        for v in self.items() {
            v.freeze();
        }
    }

    pub(crate) fn begin_iteration(&self) {
        self.iters.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_iteration(&self) {
        self.iters.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn hash32(&self) -> Result<u32, EvalError> {
        if !self.is_frozen() {
            return Err(EvalError::typ("unhashable type: set"));
        }
        let mut h: u32 = 0x5f5f;
        for v in self.items() {
            h = h.wrapping_add(v.hash32()?);
        }
        Ok(h)
    }
}

impl std::fmt::Debug for Set {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Set").field("len", &self.len()).finish()
    }
}
