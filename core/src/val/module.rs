//! Named attribute bags: `module` and `struct` host values.
//!
//! These are the reference implementations of the attribute-protocol
//! extensibility contract; hosts wanting richer records implement
//! `ForeignValue` instead.

use indexmap::IndexMap;

use crate::error::EvalError;

use super::{StringDict, Value};

/// A named collection of values, typically the result of a `load` or the
/// `module(name, **kwargs)` builtin. Its string form does not enumerate
/// members.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub members: StringDict,
}

impl Module {
    /// Missing names yield the missing-attribute signal, never a success
    /// carrying no value.
    pub fn attr(&self, name: &str) -> Option<Value> {
        self.members.get(name).cloned()
    }

    pub fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.iter().map(|(k, _)| k.clone()).collect();
        names.sort();
        names
    }

    pub fn freeze_value(&self) {
        self.members.freeze_values();
    }

    pub fn repr(&self) -> String {
        format!("<module \"{}\">", self.name)
    }
}

/// An immutable record with named fields and structural equality.
#[derive(Debug)]
pub struct StructValue {
    pub fields: IndexMap<String, Value>,
}

impl StructValue {
    pub fn attr(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    pub fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn freeze_value(&self) {
        for v in self.fields.values() {
            v.freeze();
        }
    }

    pub fn repr(&self) -> String {
        let mut out = String::from("struct(");
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(k);
            out.push_str(" = ");
            out.push_str(&v.repr());
        }
        out.push(')');
        out
    }

    pub fn equal_fields(&self, other: &StructValue) -> Result<bool, EvalError> {
        if self.fields.len() != other.fields.len() {
            return Ok(false);
        }
        for (k, v) in &self.fields {
            match other.fields.get(k) {
                Some(w) => {
                    if !super::equal(v, w)? {
                        return Ok(false);
                    }
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }
}
