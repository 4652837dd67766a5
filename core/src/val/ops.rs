//! Binary and unary operators, indexing, and slicing.

use std::cmp::Ordering;

use crate::ast::{BinOp, UnaryOp};
use crate::error::EvalError;

use super::int::Int;
use super::{equal, order_values, Bytes, Str, Value};

/// Largest result size for sequence repetition.
const MAX_REPEAT_BYTES: usize = 1 << 30;

pub fn binary(op: BinOp, x: &Value, y: &Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Eq => return Ok(Value::Bool(equal(x, y)?)),
        BinOp::Ne => return Ok(Value::Bool(!equal(x, y)?)),
        BinOp::Lt => return ordered(op, x, y, |o| o == Ordering::Less),
        BinOp::Le => return ordered(op, x, y, |o| o != Ordering::Greater),
        BinOp::Gt => return ordered(op, x, y, |o| o == Ordering::Greater),
        BinOp::Ge => return ordered(op, x, y, |o| o != Ordering::Less),
        BinOp::And | BinOp::Or => {
            return Err(EvalError::internal("and/or must be compiled as jumps"));
        }
        _ => {}
    }
    if let Some(v) = eval_binary(op, x, y)? {
        return Ok(v);
    }
    if let Value::Foreign(f) = x {
        if let Some(v) = f.binary(op, y, true)? {
            return Ok(v);
        }
    }
    if let Value::Foreign(f) = y {
        if let Some(v) = f.binary(op, x, false)? {
            return Ok(v);
        }
    }
    Err(EvalError::typ(format!(
        "unknown binary op: {} {} {}",
        x.type_name(),
        op,
        y.type_name()
    )))
}

fn ordered(
    op: BinOp,
    x: &Value,
    y: &Value,
    pred: impl Fn(Ordering) -> bool,
) -> Result<Value, EvalError> {
    let sym = op.to_string();
    Ok(Value::Bool(pred(order_values(&sym, x, y)?)))
}

fn eval_binary(op: BinOp, x: &Value, y: &Value) -> Result<Option<Value>, EvalError> {
    Ok(match (op, x, y) {
        // in / not in
        (BinOp::In, _, _) => membership(x, y)?.map(Value::Bool),
        (BinOp::NotIn, _, _) => membership(x, y)?.map(|b| Value::Bool(!b)),

        // +
        (BinOp::Add, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.add(b))),
        (BinOp::Add, Value::Float(a), Value::Float(b)) => Some(Value::Float(a + b)),
        (BinOp::Add, Value::Int(a), Value::Float(b)) => Some(Value::Float(a.to_f64() + b)),
        (BinOp::Add, Value::Float(a), Value::Int(b)) => Some(Value::Float(a + b.to_f64())),
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Some(Value::Str(a.concat(b))),
        (BinOp::Add, Value::Bytes(a), Value::Bytes(b)) => Some(Value::Bytes(a.concat(b))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.snapshot();
            items.extend(b.snapshot());
            Some(Value::new_list(items))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            let mut items: Vec<Value> = a.to_vec();
            items.extend(b.iter().cloned());
            Some(Value::new_tuple(items))
        }

        // -
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.sub(b))),
        (BinOp::Sub, Value::Float(a), Value::Float(b)) => Some(Value::Float(a - b)),
        (BinOp::Sub, Value::Int(a), Value::Float(b)) => Some(Value::Float(a.to_f64() - b)),
        (BinOp::Sub, Value::Float(a), Value::Int(b)) => Some(Value::Float(a - b.to_f64())),
        (BinOp::Sub, Value::Set(a), Value::Set(b)) => {
            let out = super::Set::new();
            for v in a.items() {
                if !b.contains(&v)? {
                    out.add(&v)?;
                }
            }
            Some(Value::Set(out))
        }

        // *
        (BinOp::Mul, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.mul(b))),
        (BinOp::Mul, Value::Float(a), Value::Float(b)) => Some(Value::Float(a * b)),
        (BinOp::Mul, Value::Int(a), Value::Float(b)) => Some(Value::Float(a.to_f64() * b)),
        (BinOp::Mul, Value::Float(a), Value::Int(b)) => Some(Value::Float(a * b.to_f64())),
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            let n = repeat_count(n, s.len())?;
            Some(Value::Str(s.repeat(n)))
        }
        (BinOp::Mul, Value::Bytes(b), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::Bytes(b)) => {
            let n = repeat_count(n, b.len())?;
            Some(Value::Bytes(b.repeat(n)))
        }
        (BinOp::Mul, Value::List(l), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::List(l)) => {
            let n = repeat_count(n, l.len())?;
            let items = l.snapshot();
            let mut out = Vec::with_capacity(items.len() * n);
            for _ in 0..n {
                out.extend(items.iter().cloned());
            }
            Some(Value::new_list(out))
        }
        (BinOp::Mul, Value::Tuple(t), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::Tuple(t)) => {
            let n = repeat_count(n, t.len())?;
            let mut out = Vec::with_capacity(t.len() * n);
            for _ in 0..n {
                out.extend(t.iter().cloned());
            }
            Some(Value::new_tuple(out))
        }

        // / (real division)
        (BinOp::Div, Value::Int(a), Value::Int(b)) => Some(real_div(a.to_f64(), b.to_f64())?),
        (BinOp::Div, Value::Float(a), Value::Float(b)) => Some(real_div(*a, *b)?),
        (BinOp::Div, Value::Int(a), Value::Float(b)) => Some(real_div(a.to_f64(), *b)?),
        (BinOp::Div, Value::Float(a), Value::Int(b)) => Some(real_div(*a, b.to_f64())?),

        // //
        (BinOp::FloorDiv, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.floor_div(b)?)),
        (BinOp::FloorDiv, Value::Float(a), Value::Float(b)) => Some(floor_div_f(*a, *b)?),
        (BinOp::FloorDiv, Value::Int(a), Value::Float(b)) => Some(floor_div_f(a.to_f64(), *b)?),
        (BinOp::FloorDiv, Value::Float(a), Value::Int(b)) => Some(floor_div_f(*a, b.to_f64())?),

        // %
        (BinOp::Mod, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.mod_floor(b)?)),
        (BinOp::Mod, Value::Float(a), Value::Float(b)) => Some(mod_f(*a, *b)?),
        (BinOp::Mod, Value::Int(a), Value::Float(b)) => Some(mod_f(a.to_f64(), *b)?),
        (BinOp::Mod, Value::Float(a), Value::Int(b)) => Some(mod_f(*a, b.to_f64())?),

        // bitwise / set algebra
        (BinOp::Pipe, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.bitor(b))),
        (BinOp::Pipe, Value::Set(a), Value::Set(b)) => {
            let out = super::Set::new();
            for v in a.items() {
                out.add(&v)?;
            }
            for v in b.items() {
                out.add(&v)?;
            }
            Some(Value::Set(out))
        }
        (BinOp::Amp, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.bitand(b))),
        (BinOp::Amp, Value::Set(a), Value::Set(b)) => {
            let out = super::Set::new();
            for v in a.items() {
                if b.contains(&v)? {
                    out.add(&v)?;
                }
            }
            Some(Value::Set(out))
        }
        (BinOp::Caret, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.bitxor(b))),
        (BinOp::Caret, Value::Set(a), Value::Set(b)) => {
            let out = super::Set::new();
            for v in a.items() {
                if !b.contains(&v)? {
                    out.add(&v)?;
                }
            }
            for v in b.items() {
                if !a.contains(&v)? {
                    out.add(&v)?;
                }
            }
            Some(Value::Set(out))
        }
        (BinOp::Shl, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.shl(b)?)),
        (BinOp::Shr, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.shr(b)?)),

        _ => None,
    })
}

fn repeat_count(n: &Int, unit: usize) -> Result<usize, EvalError> {
    let n = n.to_i64().unwrap_or(i64::MAX).max(0) as usize;
    if unit.saturating_mul(n) > MAX_REPEAT_BYTES {
        return Err(EvalError::value("excessive repeat"));
    }
    Ok(n)
}

fn real_div(a: f64, b: f64) -> Result<Value, EvalError> {
    if b == 0.0 {
        return Err(EvalError::value("real division by zero"));
    }
    Ok(Value::Float(a / b))
}

fn floor_div_f(a: f64, b: f64) -> Result<Value, EvalError> {
    if b == 0.0 {
        return Err(EvalError::value("floored division by zero"));
    }
    Ok(Value::Float((a / b).floor()))
}

fn mod_f(a: f64, b: f64) -> Result<Value, EvalError> {
    if b == 0.0 {
        return Err(EvalError::value("float modulo by zero"));
    }
    // Result sign follows the divisor, as with integers.
    Ok(Value::Float(a - (a / b).floor() * b))
}

/// `x in y`. `Ok(None)` means the pair is unsupported.
fn membership(x: &Value, y: &Value) -> Result<Option<bool>, EvalError> {
    match y {
        Value::List(l) => {
            for v in l.snapshot() {
                if equal(x, &v)? {
                    return Ok(Some(true));
                }
            }
            Ok(Some(false))
        }
        Value::Tuple(t) => {
            for v in t.iter() {
                if equal(x, v)? {
                    return Ok(Some(true));
                }
            }
            Ok(Some(false))
        }
        Value::Dict(d) => Ok(Some(d.contains(x)?)),
        Value::Set(s) => Ok(Some(s.contains(x)?)),
        Value::Str(hay) => match x {
            Value::Str(needle) => Ok(Some(find_sub(hay.as_bytes(), needle.as_bytes()).is_some())),
            _ => Err(EvalError::typ(format!(
                "'in <string>' requires string as left operand, not {}",
                x.type_name()
            ))),
        },
        Value::Bytes(hay) => match x {
            Value::Bytes(needle) => Ok(Some(find_sub(hay.as_bytes(), needle.as_bytes()).is_some())),
            _ => Err(EvalError::typ(format!(
                "'in <bytes>' requires bytes as left operand, not {}",
                x.type_name()
            ))),
        },
        Value::Range(r) => match x {
            Value::Int(i) => Ok(Some(r.contains(i))),
            _ => Ok(Some(false)),
        },
        _ => Ok(None),
    }
}

/// First byte offset of `needle` in `hay`.
pub(crate) fn find_sub(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > hay.len() {
        return None;
    }
    hay.windows(needle.len()).position(|w| w == needle)
}

pub fn unary(op: UnaryOp, x: &Value) -> Result<Value, EvalError> {
    match (op, x) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!x.truth())),
        (UnaryOp::Minus, Value::Int(i)) => Ok(Value::Int(i.checked_neg())),
        (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Plus, Value::Int(_)) | (UnaryOp::Plus, Value::Float(_)) => Ok(x.clone()),
        (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(i.invert())),
        _ => Err(EvalError::typ(format!(
            "unknown unary op: {}{}",
            op,
            x.type_name()
        ))),
    }
}

/// Resolve a sequence index, supporting negative offsets.
fn seq_index(i: &Value, len: usize, kind: &str) -> Result<usize, EvalError> {
    let Value::Int(ii) = i else {
        return Err(EvalError::typ(format!(
            "{} index: got {}, want int",
            kind,
            i.type_name()
        )));
    };
    let raw = ii
        .to_i64()
        .ok_or_else(|| EvalError::index(format!("{} index out of range", kind)))?;
    let adj = if raw < 0 { raw + len as i64 } else { raw };
    if adj < 0 || adj >= len as i64 {
        return Err(EvalError::index(format!("{} index {} out of range", kind, raw)));
    }
    Ok(adj as usize)
}

pub fn index(x: &Value, i: &Value) -> Result<Value, EvalError> {
    match x {
        Value::List(l) => {
            let idx = seq_index(i, l.len(), "list")?;
            l.get(idx)
                .ok_or_else(|| EvalError::index("list changed during indexing"))
        }
        Value::Tuple(t) => {
            let idx = seq_index(i, t.len(), "tuple")?;
            Ok(t[idx].clone())
        }
        Value::Str(s) => {
            let idx = seq_index(i, s.len(), "string")?;
            Ok(Value::Str(Str::from_bytes(vec![s.as_bytes()[idx]])))
        }
        Value::Bytes(b) => {
            let idx = seq_index(i, b.len(), "bytes")?;
            Ok(Value::int(b.as_bytes()[idx] as i64))
        }
        Value::Dict(d) => match d.get(i)? {
            Some(v) => Ok(v),
            None => Err(EvalError::key(format!("key {} not in dict", i.repr()))),
        },
        Value::Range(r) => {
            let idx = seq_index(i, r.len(), "range")?;
            Ok(Value::int(r.at(idx)))
        }
        _ => Err(EvalError::typ(format!(
            "unhandled index operation {}[{}]",
            x.type_name(),
            i.type_name()
        ))),
    }
}

pub fn set_index(x: &Value, i: &Value, v: Value) -> Result<(), EvalError> {
    match x {
        Value::List(l) => {
            let idx = seq_index(i, l.len(), "list")?;
            l.set_at(idx, v)
        }
        Value::Dict(d) => d.insert(i, v),
        _ => Err(EvalError::typ(format!(
            "{} value does not support item assignment",
            x.type_name()
        ))),
    }
}

/// Python-style extended slicing. `None` operands mean "absent".
pub fn slice(x: &Value, lo: &Value, hi: &Value, step: &Value) -> Result<Value, EvalError> {
    let step_n = match step {
        Value::None => 1i64,
        Value::Int(i) => i
            .to_i64()
            .ok_or_else(|| EvalError::value("slice step out of range"))?,
        _ => {
            return Err(EvalError::typ(format!(
                "slice step: got {}, want int",
                step.type_name()
            )))
        }
    };
    if step_n == 0 {
        return Err(EvalError::value("zero is not a valid slice step"));
    }

    let len = match x {
        Value::List(l) => l.len(),
        Value::Tuple(t) => t.len(),
        Value::Str(s) => s.len(),
        Value::Bytes(b) => b.len(),
        _ => {
            return Err(EvalError::typ(format!(
                "unhandled slice operation {}",
                x.type_name()
            )))
        }
    };
    let indices = slice_indices(lo, hi, step_n, len)?;

    match x {
        Value::List(l) => {
            let items = l.snapshot();
            Ok(Value::new_list(indices.map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(t) => Ok(Value::new_tuple(indices.map(|i| t[i].clone()).collect())),
        Value::Str(s) => {
            let bytes = s.as_bytes();
            Ok(Value::Str(Str::from_bytes(
                indices.map(|i| bytes[i]).collect(),
            )))
        }
        Value::Bytes(b) => {
            let bytes = b.as_bytes();
            Ok(Value::Bytes(Bytes::from_bytes(
                indices.map(|i| bytes[i]).collect(),
            )))
        }
        _ => unreachable!(),
    }
}

fn slice_bound(v: &Value, len: i64, default: i64, low_clamp: i64, high_clamp: i64) -> Result<i64, EvalError> {
    let raw = match v {
        Value::None => return Ok(default),
        Value::Int(i) => i.to_i64().unwrap_or_else(|| {
            if i.is_negative() {
                i64::MIN / 2
            } else {
                i64::MAX / 2
            }
        }),
        _ => {
            return Err(EvalError::typ(format!(
                "slice bound: got {}, want int",
                v.type_name()
            )))
        }
    };
    let adj = if raw < 0 { raw + len } else { raw };
    Ok(adj.clamp(low_clamp, high_clamp))
}

fn slice_indices(
    lo: &Value,
    hi: &Value,
    step: i64,
    len: usize,
) -> Result<impl Iterator<Item = usize>, EvalError> {
    let len = len as i64;
    let (start, end) = if step > 0 {
        (
            slice_bound(lo, len, 0, 0, len)?,
            slice_bound(hi, len, len, 0, len)?,
        )
    } else {
        (
            slice_bound(lo, len, len - 1, -1, len - 1)?,
            slice_bound(hi, len, -1, -1, len - 1)?,
        )
    };
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        out.push(i as usize);
        i += step;
    }
    Ok(out.into_iter())
}
