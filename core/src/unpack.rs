//! Argument unpacking for builtins.
//!
//! `unpack_args` mirrors the VM's call protocol: positionals in order, then
//! keywords by name. A parameter name ending in `?` is optional; its slot
//! keeps whatever default the builtin primed it with. Error strings follow
//! the `{fn}: for parameter {name}: got {actual}, want {expected}` shape
//! that hosts match on.

use crate::error::EvalError;
use crate::val::int::Int;
use crate::val::{Bytes, Str, Value};

/// A conversion from a language value into a Rust parameter slot.
pub trait UnpackValue: Sized {
    /// Human-readable expected type for diagnostics.
    fn expected() -> String;

    fn unpack(v: &Value) -> Option<Self>;
}

impl UnpackValue for Value {
    fn expected() -> String {
        "value".to_string()
    }

    fn unpack(v: &Value) -> Option<Value> {
        Some(v.clone())
    }
}

impl UnpackValue for bool {
    fn expected() -> String {
        "bool".to_string()
    }

    fn unpack(v: &Value) -> Option<bool> {
        match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl UnpackValue for Int {
    fn expected() -> String {
        "int".to_string()
    }

    fn unpack(v: &Value) -> Option<Int> {
        match v {
            Value::Int(i) => Some(i.clone()),
            _ => None,
        }
    }
}

impl UnpackValue for i64 {
    fn expected() -> String {
        "int".to_string()
    }

    fn unpack(v: &Value) -> Option<i64> {
        match v {
            Value::Int(i) => i.to_i64(),
            _ => None,
        }
    }
}

impl UnpackValue for f64 {
    fn expected() -> String {
        "float".to_string()
    }

    fn unpack(v: &Value) -> Option<f64> {
        match v {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(i.to_f64()),
            _ => None,
        }
    }
}

impl UnpackValue for Str {
    fn expected() -> String {
        "string".to_string()
    }

    fn unpack(v: &Value) -> Option<Str> {
        match v {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl UnpackValue for String {
    fn expected() -> String {
        "string".to_string()
    }

    fn unpack(v: &Value) -> Option<String> {
        match v {
            Value::Str(s) => Some(s.to_str_lossy().into_owned()),
            _ => None,
        }
    }
}

impl UnpackValue for Bytes {
    fn expected() -> String {
        "bytes".to_string()
    }

    fn unpack(v: &Value) -> Option<Bytes> {
        match v {
            Value::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl<T: UnpackValue> UnpackValue for Option<T> {
    fn expected() -> String {
        format!("{} or None", T::expected())
    }

    fn unpack(v: &Value) -> Option<Option<T>> {
        match v {
            Value::None => Some(None),
            other => T::unpack(other).map(Some),
        }
    }
}

/// Object-safe parameter slot.
pub trait ParamSlot {
    fn set_from(&mut self, fname: &str, pname: &str, v: &Value) -> Result<(), EvalError>;
}

impl<T: UnpackValue> ParamSlot for T {
    fn set_from(&mut self, fname: &str, pname: &str, v: &Value) -> Result<(), EvalError> {
        match T::unpack(v) {
            Some(out) => {
                *self = out;
                Ok(())
            }
            None => Err(EvalError::typ(format!(
                "{}: for parameter {}: got {}, want {}",
                fname,
                pname,
                v.type_name(),
                T::expected()
            ))),
        }
    }
}

/// Bind `args`/`kwargs` to named parameter slots; names ending in `?` mark
/// the parameter (and all that follow) as optional.
pub fn unpack_args(
    fname: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
    params: &mut [(&str, &mut dyn ParamSlot)],
) -> Result<(), EvalError> {
    let nparams = params.len();
    if args.len() > nparams {
        return Err(EvalError::typ(format!(
            "{}: got {} arguments, want at most {}",
            fname,
            args.len(),
            nparams
        )));
    }

    let mut assigned = vec![false; nparams];
    for (i, v) in args.iter().enumerate() {
        let (name, slot) = &mut params[i];
        slot.set_from(fname, name.trim_end_matches('?'), v)?;
        assigned[i] = true;
    }

    'kw: for (k, v) in kwargs {
        for (i, (name, slot)) in params.iter_mut().enumerate() {
            if name.trim_end_matches('?') == k {
                if assigned[i] {
                    return Err(EvalError::typ(format!(
                        "{}: got multiple values for keyword argument \"{}\"",
                        fname, k
                    )));
                }
                slot.set_from(fname, k, v)?;
                assigned[i] = true;
                continue 'kw;
            }
        }
        return Err(EvalError::typ(format!(
            "{}: unexpected keyword argument \"{}\"",
            fname, k
        )));
    }

    for (i, (name, _)) in params.iter().enumerate() {
        if !assigned[i] && !name.ends_with('?') {
            return Err(EvalError::typ(format!(
                "{}: missing argument for {}",
                fname, name
            )));
        }
    }
    Ok(())
}

/// Positional-only variant: rejects keywords outright and requires at
/// least `min` arguments.
pub fn unpack_positional_args(
    fname: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
    min: usize,
    params: &mut [(&str, &mut dyn ParamSlot)],
) -> Result<(), EvalError> {
    if !kwargs.is_empty() {
        return Err(EvalError::typ(format!(
            "{}: unexpected keyword arguments",
            fname
        )));
    }
    if args.len() < min {
        let plural = if min == 1 { "" } else { "s" };
        return Err(EvalError::typ(format!(
            "{}: got {} arguments, want at least {} argument{}",
            fname,
            args.len(),
            min,
            plural
        )));
    }
    if args.len() > params.len() {
        return Err(EvalError::typ(format!(
            "{}: got {} arguments, want at most {}",
            fname,
            args.len(),
            params.len()
        )));
    }
    for (i, v) in args.iter().enumerate() {
        let (name, slot) = &mut params[i];
        slot.set_from(fname, name.trim_end_matches('?'), v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_by_position_and_name() {
        let mut x: i64 = 0;
        let mut y: String = String::new();
        unpack_args(
            "f",
            &[Value::int(1)],
            &[("y".to_string(), Value::str_("hi"))],
            &mut [("x", &mut x), ("y", &mut y)],
        )
        .expect("unpack");
        assert_eq!(x, 1);
        assert_eq!(y, "hi");
    }

    #[test]
    fn type_mismatch_message_shape() {
        let mut x: String = String::new();
        let err = unpack_args("unpack", &[Value::int(42)], &[], &mut [("x", &mut x)])
            .expect_err("must fail");
        assert_eq!(err.to_string(), "unpack: for parameter x: got int, want string");
    }

    #[test]
    fn optional_parameters_keep_defaults() {
        let mut x: i64 = 0;
        let mut y: i64 = 7;
        unpack_args("f", &[Value::int(1)], &[], &mut [("x", &mut x), ("y?", &mut y)])
            .expect("unpack");
        assert_eq!((x, y), (1, 7));
    }

    #[test]
    fn unexpected_keyword_rejected() {
        let mut x: i64 = 0;
        let err = unpack_args(
            "f",
            &[],
            &[("z".to_string(), Value::int(1))],
            &mut [("x", &mut x)],
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("unexpected keyword argument"));
    }

    #[test]
    fn positional_only_rejects_keywords() {
        let mut x: i64 = 0;
        let err = unpack_positional_args(
            "f",
            &[],
            &[("x".to_string(), Value::int(1))],
            1,
            &mut [("x", &mut x)],
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("unexpected keyword arguments"));
    }

    #[test]
    fn none_unpacks_into_option() {
        let mut x: Option<i64> = Some(3);
        unpack_args("f", &[Value::None], &[], &mut [("x", &mut x)]).expect("unpack");
        assert_eq!(x, None);
    }
}
