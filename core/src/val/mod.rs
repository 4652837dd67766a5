//! The value model.
//!
//! Values form a tagged sum with reference semantics: containers are
//! `Arc`-shared and interior-mutable until frozen. Every value supports the
//! same capability set (type name, string forms, truth, freeze, hash), and
//! hosts extend the model through the `ForeignValue` trait without touching
//! the core.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::error::EvalError;

pub mod int;

mod dict;
mod function;
mod iter;
mod list;
mod module;
pub mod ops;
mod range;
mod string;

#[cfg(test)]
mod val_test;

pub use dict::{Dict, HKey, Set};
pub use function::{Builtin, CellSlot, Function, NativeFn};
pub use iter::Iter;
pub use list::List;
pub use module::{Module, StructValue};
pub use range::RangeValue;
pub use string::{quote_bytes, Bytes, Str};

use int::Int;

/// Maximum depth for structural equality and ordering; cyclic structures
/// bottom out here with an error rather than hanging.
const MAX_COMPARE_DEPTH: usize = 100;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(Int),
    Float(f64),
    Str(Str),
    Bytes(Bytes),
    List(Arc<List>),
    Tuple(Arc<[Value]>),
    Dict(Arc<Dict>),
    Set(Arc<Set>),
    Function(Arc<Function>),
    Builtin(Arc<Builtin>),
    Range(Arc<RangeValue>),
    Module(Arc<Module>),
    Struct(Arc<StructValue>),
    /// Closure slot; never observable from the language.
    Cell(Arc<CellSlot>),
    /// Missing-default sentinel used by the call protocol.
    Mandatory,
    Foreign(Arc<dyn ForeignValue>),
}

/// Host extension point. A foreign value opts into attributes, binary
/// operators, iteration, and calls; everything has a conservative default.
pub trait ForeignValue: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str;

    fn repr_value(&self) -> String {
        format!("<{}>", self.type_name())
    }

    fn truth(&self) -> bool {
        true
    }

    fn freeze_value(&self) {}

    fn hash_value(&self) -> Result<u32, EvalError> {
        Err(EvalError::typ(format!("unhashable type: {}", self.type_name())))
    }

    /// `Ok(None)` signals a genuinely absent attribute; errors are reserved
    /// for attributes that exist but fail.
    fn attr(&self, _name: &str) -> Result<Option<Value>, EvalError> {
        Ok(None)
    }

    fn attr_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_attr(&self, name: &str, _value: &Value) -> Result<(), EvalError> {
        Err(EvalError::attr(format!(
            "{} has no .{} field or method",
            self.type_name(),
            name
        )))
    }

    /// Intercept `self op other` (`this_on_left`) or `other op self`.
    /// `Ok(None)` means unsupported: the core falls through to its default.
    fn binary(
        &self,
        _op: crate::ast::BinOp,
        _other: &Value,
        _this_on_left: bool,
    ) -> Result<Option<Value>, EvalError> {
        Ok(None)
    }

    fn iterate(&self) -> Option<Box<dyn Iterator<Item = Value> + Send>> {
        None
    }

    /// Whether this value accepts the call protocol.
    fn callable(&self) -> bool {
        false
    }

    fn call_value(
        &self,
        _thread: &mut crate::eval::Thread,
        _args: &[Value],
        _kwargs: &[(String, Value)],
    ) -> Result<Value, EvalError> {
        Err(EvalError::typ(format!(
            "invalid call of non-function ({})",
            self.type_name()
        )))
    }
}

impl Value {
    pub fn int(i: impl Into<Int>) -> Value {
        Value::Int(i.into())
    }

    pub fn float(f: f64) -> Value {
        Value::Float(f)
    }

    pub fn str_(s: &str) -> Value {
        Value::Str(Str::from(s))
    }

    pub fn string(s: String) -> Value {
        Value::Str(Str::from(s))
    }

    pub fn bytes(b: Vec<u8>) -> Value {
        Value::Bytes(Bytes::from_bytes(b))
    }

    pub fn new_list(items: Vec<Value>) -> Value {
        Value::List(List::new(items))
    }

    pub fn new_tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Arc::from(items))
    }

    pub fn new_dict() -> Value {
        Value::Dict(Dict::new())
    }

    pub fn new_set() -> Value {
        Value::Set(Set::new())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Range(_) => "range",
            Value::Module(_) => "module",
            Value::Struct(_) => "struct",
            Value::Cell(_) => "cell",
            Value::Mandatory => "mandatory",
            Value::Foreign(f) => f.type_name(),
        }
    }

    pub fn truth(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => !i.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Set(s) => !s.is_empty(),
            Value::Range(r) => !r.is_empty(),
            Value::Function(_) | Value::Builtin(_) => true,
            Value::Module(_) | Value::Struct(_) => true,
            Value::Cell(_) | Value::Mandatory => true,
            Value::Foreign(f) => f.truth(),
        }
    }

    /// One-way transition to deep immutability. Idempotent; cycles are cut
    /// by each container's frozen flag.
    pub fn freeze(&self) {
        match self {
            Value::List(l) => l.freeze_value(),
            Value::Dict(d) => d.freeze_value(),
            Value::Set(s) => s.freeze_value(),
            Value::Tuple(t) => {
                for v in t.iter() {
                    v.freeze();
                }
            }
            Value::Function(f) => {
                for v in &f.defaults {
                    v.freeze();
                }
                for v in &f.freevars {
                    v.freeze();
                }
            }
            Value::Module(m) => m.freeze_value(),
            Value::Struct(s) => s.freeze_value(),
            Value::Cell(c) => c.freeze_value(),
            Value::Foreign(f) => f.freeze_value(),
            _ => {}
        }
    }

    /// The quoted, re-readable form.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    /// The display form: strings render their raw content, everything else
    /// as `repr`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_str_lossy().into_owned(),
            Value::Bytes(b) => String::from_utf8_lossy(b.as_bytes()).into_owned(),
            _ => self.repr(),
        }
    }

    fn container_token(&self) -> Option<usize> {
        match self {
            Value::List(l) => Some(Arc::as_ptr(l) as usize),
            Value::Dict(d) => Some(Arc::as_ptr(d) as usize),
            Value::Set(s) => Some(Arc::as_ptr(s) as usize),
            Value::Tuple(t) => Some(t.as_ptr() as usize),
            _ => None,
        }
    }

    fn write_repr(&self, out: &mut String) {
        thread_local! {
            static SEEN: RefCell<FxHashSet<usize>> = RefCell::new(FxHashSet::default());
        }
        if let Some(token) = self.container_token() {
            let entered = SEEN.with(|s| s.borrow_mut().insert(token));
            if !entered {
                out.push_str(match self {
                    Value::List(_) => "[...]",
                    Value::Dict(_) => "{...}",
                    Value::Set(_) => "set(...)",
                    _ => "(...)",
                });
                return;
            }
            self.write_repr_inner(out);
            SEEN.with(|s| {
                s.borrow_mut().remove(&token);
            });
        } else {
            self.write_repr_inner(out);
        }
    }

    fn write_repr_inner(&self, out: &mut String) {
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&float_repr(*f)),
            Value::Str(s) => out.push_str(&s.quoted()),
            Value::Bytes(b) => out.push_str(&b.quoted()),
            Value::List(l) => {
                out.push('[');
                for (i, v) in l.snapshot().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    v.write_repr(out);
                }
                out.push(']');
            }
            Value::Tuple(t) => {
                out.push('(');
                for (i, v) in t.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    v.write_repr(out);
                }
                if t.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(d) => {
                out.push('{');
                for (i, (k, v)) in d.items().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_repr(out);
                    out.push_str(": ");
                    v.write_repr(out);
                }
                out.push('}');
            }
            Value::Set(s) => {
                out.push_str("set([");
                for (i, v) in s.items().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    v.write_repr(out);
                }
                out.push_str("])");
            }
            Value::Function(f) => out.push_str(&format!("<function {}>", f.name())),
            Value::Builtin(b) => out.push_str(&format!("{:?}", b)),
            Value::Range(r) => out.push_str(&r.repr()),
            Value::Module(m) => out.push_str(&m.repr()),
            Value::Struct(s) => out.push_str(&s.repr()),
            Value::Cell(_) => out.push_str("<cell>"),
            Value::Mandatory => out.push_str("<mandatory>"),
            Value::Foreign(f) => out.push_str(&f.repr_value()),
        }
    }

    /// 32-bit hash. Hashability is a runtime property: mutable containers
    /// hash only once frozen.
    pub fn hash32(&self) -> Result<u32, EvalError> {
        match self {
            Value::None => Ok(0x1e_fa05),
            Value::Bool(true) => Ok(0x3b_3b31),
            Value::Bool(false) => Ok(0x5c_5c57),
            Value::Int(i) => Ok(i.hash32()),
            Value::Float(f) => Ok(hash_float(*f)),
            Value::Str(s) => Ok(hash_bytes(s.as_bytes())),
            Value::Bytes(b) => Ok(hash_bytes(b.as_bytes())),
            Value::Tuple(t) => {
                let mut h: u32 = 0x3457;
                for v in t.iter() {
                    h = h.wrapping_mul(31).wrapping_add(v.hash32()?);
                }
                Ok(h)
            }
            Value::List(l) => l.hash32(),
            Value::Dict(d) => d.hash32(),
            Value::Set(s) => s.hash32(),
            Value::Range(r) => Ok(r.hash32()),
            Value::Function(f) => Ok(hash_pointer(Arc::as_ptr(f) as usize)),
            Value::Builtin(b) => Ok(hash_pointer(Arc::as_ptr(b) as usize)),
            Value::Module(_) => Err(EvalError::typ("unhashable type: module")),
            Value::Struct(_) => Err(EvalError::typ("unhashable type: struct")),
            Value::Cell(_) | Value::Mandatory => {
                Err(EvalError::internal("hash of internal value"))
            }
            Value::Foreign(f) => f.hash_value(),
        }
    }

    /// Produce an iteration handle, marking mutable containers as under
    /// iteration until the handle drops.
    pub fn iterate(&self) -> Result<Iter, EvalError> {
        match self {
            Value::List(l) => Ok(Iter::list(l.clone())),
            Value::Tuple(t) => Ok(Iter::tuple(t.clone())),
            Value::Dict(d) => Ok(Iter::dict(d.clone())),
            Value::Set(s) => Ok(Iter::set(s.clone())),
            Value::Range(r) => Ok(Iter::range(r.clone())),
            Value::Foreign(f) => match f.iterate() {
                Some(it) => Ok(Iter::foreign(it)),
                None => Err(EvalError::typ(format!(
                    "{} value is not iterable",
                    self.type_name()
                ))),
            },
            _ => Err(EvalError::typ(format!(
                "{} value is not iterable",
                self.type_name()
            ))),
        }
    }

    /// Attribute lookup: fields of modules/structs/foreign values, or a
    /// bound method of a built-in type. `Ok(None)` means absent.
    pub fn attr(&self, name: &str) -> Result<Option<Value>, EvalError> {
        match self {
            Value::Module(m) => Ok(m.attr(name)),
            Value::Struct(s) => Ok(s.attr(name)),
            Value::Foreign(f) => f.attr(name),
            _ => Ok(crate::builtins::builtin_attr(self, name)),
        }
    }

    pub fn attr_names(&self) -> Vec<String> {
        match self {
            Value::Module(m) => m.attr_names(),
            Value::Struct(s) => s.attr_names(),
            Value::Foreign(f) => f.attr_names(),
            _ => crate::builtins::builtin_attr_names(self),
        }
    }

    pub fn set_attr(&self, name: &str, value: &Value) -> Result<(), EvalError> {
        match self {
            Value::Foreign(f) => f.set_attr(name, value),
            Value::Struct(_) => Err(EvalError::frozen(format!(
                "cannot set field .{} on a struct",
                name
            ))),
            _ => Err(EvalError::attr(format!(
                "{} has no .{} field or method",
                self.type_name(),
                name
            ))),
        }
    }
}

impl fmt::Debug for Value {
    /// Debug output is the language's own `repr`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// Structural equality: reflexive, symmetric, and consistent with `hash32`.
pub fn equal(x: &Value, y: &Value) -> Result<bool, EvalError> {
    equal_depth(x, y, MAX_COMPARE_DEPTH)
}

fn depth_error() -> EvalError {
    EvalError::other("comparison exceeded maximum recursion depth")
}

fn equal_depth(x: &Value, y: &Value, depth: usize) -> Result<bool, EvalError> {
    if depth == 0 {
        return Err(depth_error());
    }
    match (x, y) {
        (Value::None, Value::None) => Ok(true),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Float(a), Value::Float(b)) => Ok(a == b),
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            Ok(int_float_eq(a, *b))
        }
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(a == b),
        (Value::List(a), Value::List(b)) => {
            if Arc::ptr_eq(a, b) {
                return Ok(true);
            }
            let (xs, ys) = (a.snapshot(), b.snapshot());
            seq_equal(&xs, &ys, depth)
        }
        (Value::Tuple(a), Value::Tuple(b)) => seq_equal(a, b, depth),
        (Value::Dict(a), Value::Dict(b)) => {
            if Arc::ptr_eq(a, b) {
                return Ok(true);
            }
            if a.len() != b.len() {
                return Ok(false);
            }
            for (k, v) in a.items() {
                match b.get(&k)? {
                    Some(w) => {
                        if !equal_depth(&v, &w, depth - 1)? {
                            return Ok(false);
                        }
                    }
                    None => return Ok(false),
                }
            }
            Ok(true)
        }
        (Value::Set(a), Value::Set(b)) => {
            if Arc::ptr_eq(a, b) {
                return Ok(true);
            }
            if a.len() != b.len() {
                return Ok(false);
            }
            for v in a.items() {
                if !b.contains(&v)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::Range(a), Value::Range(b)) => Ok(a.sequence_eq(b)),
        (Value::Function(a), Value::Function(b)) => Ok(Arc::ptr_eq(a, b)),
        (Value::Builtin(a), Value::Builtin(b)) => Ok(Arc::ptr_eq(a, b)),
        (Value::Module(a), Value::Module(b)) => Ok(Arc::ptr_eq(a, b)),
        (Value::Struct(a), Value::Struct(b)) => a.equal_fields(b),
        (Value::Foreign(a), Value::Foreign(b)) => Ok(Arc::ptr_eq(a, b)),
        _ => Ok(false),
    }
}

fn seq_equal(xs: &[Value], ys: &[Value], depth: usize) -> Result<bool, EvalError> {
    if xs.len() != ys.len() {
        return Ok(false);
    }
    for (a, b) in xs.iter().zip(ys.iter()) {
        if !equal_depth(a, b, depth - 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn int_float_eq(i: &Int, f: f64) -> bool {
    match Int::from_f64_exact(f) {
        Some(fi) => *i == fi,
        None => false,
    }
}

/// Three-way ordering for the mutually-ordered kinds; everything else is a
/// type error naming the operator.
pub fn order_values(op_sym: &str, x: &Value, y: &Value) -> Result<Ordering, EvalError> {
    order_depth(op_sym, x, y, MAX_COMPARE_DEPTH)
}

fn order_depth(op_sym: &str, x: &Value, y: &Value, depth: usize) -> Result<Ordering, EvalError> {
    if depth == 0 {
        return Err(depth_error());
    }
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp_int(b)),
        (Value::Float(a), Value::Float(b)) => float_cmp(*a, *b),
        (Value::Int(a), Value::Float(b)) => float_cmp(a.to_f64(), *b),
        (Value::Float(a), Value::Int(b)) => float_cmp(*a, b.to_f64()),
        (Value::Str(a), Value::Str(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
        (Value::List(a), Value::List(b)) => {
            let (xs, ys) = (a.snapshot(), b.snapshot());
            seq_order(op_sym, &xs, &ys, depth)
        }
        (Value::Tuple(a), Value::Tuple(b)) => seq_order(op_sym, a, b, depth),
        _ => {
            // Unordered kinds still compare equal to themselves, which is
            // what lets e.g. min() scan values whose keys coincide.
            if equal_depth(x, y, depth)? {
                return Ok(Ordering::Equal);
            }
            Err(EvalError::typ(format!(
                "unsupported comparison: {} {} {}",
                x.type_name(),
                op_sym,
                y.type_name()
            )))
        }
    }
}

fn seq_order(op_sym: &str, xs: &[Value], ys: &[Value], depth: usize) -> Result<Ordering, EvalError> {
    for (a, b) in xs.iter().zip(ys.iter()) {
        if !equal_depth(a, b, depth - 1)? {
            return order_depth(op_sym, a, b, depth - 1);
        }
    }
    Ok(xs.len().cmp(&ys.len()))
}

fn float_cmp(a: f64, b: f64) -> Result<Ordering, EvalError> {
    a.partial_cmp(&b)
        .ok_or_else(|| EvalError::value("floating-point NaN comparison"))
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for b in bytes {
        h = h.wrapping_mul(31).wrapping_add(*b as u32);
    }
    h
}

fn hash_float(f: f64) -> u32 {
    // Equal numbers must hash alike across int/float, so integral floats
    // hash through the integer path.
    match Int::from_f64_exact(f) {
        Some(i) => i.hash32(),
        None => {
            let bits = f.to_bits();
            (bits as u32) ^ ((bits >> 32) as u32) ^ 0x9e37_79b9
        }
    }
}

fn hash_pointer(p: usize) -> u32 {
    let mut x = p as u64;
    x ^= x >> 31;
    x = x.wrapping_mul(0x7fb5_d329_728e_a185);
    x ^= x >> 27;
    (x as u32) ^ ((x >> 32) as u32)
}

/// Float rendering: integral finite values keep a trailing `.0`.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "+inf".to_string() } else { "-inf".to_string() }
    } else if f == f.trunc() && f.abs() < 1e17 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// An insertion-ordered mapping from names to values: predeclared
/// environments, module globals, load results.
#[derive(Clone, Debug, Default)]
pub struct StringDict(pub IndexMap<String, Value>);

impl StringDict {
    pub fn new() -> StringDict {
        StringDict(IndexMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn freeze_values(&self) {
        for v in self.0.values() {
            v.freeze();
        }
    }
}

impl FromIterator<(String, Value)> for StringDict {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> StringDict {
        StringDict(iter.into_iter().collect())
    }
}
