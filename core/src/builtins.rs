//! The standard core builtins: the universal environment plus the bound
//! methods of the built-in types.
//!
//! Every function here speaks the same call protocol as compiled code and
//! unpacks its arguments with the shared helpers, so argument errors read
//! identically whichever side raises them.

use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::error::EvalError;
use crate::eval::Thread;
use crate::unpack::{unpack_args, unpack_positional_args};
use crate::val::int::Int;
use crate::val::ops::find_sub;
use crate::val::{
    order_values, Builtin, Dict, Module, NativeFn, RangeValue, Set, Str, StringDict, StructValue,
    Value,
};

static UNIVERSE: Lazy<StringDict> = Lazy::new(|| {
    let entries: &[(&str, NativeFn)] = &[
        ("all", all_),
        ("any", any_),
        ("bool", bool_),
        ("bytes", bytes_),
        ("chr", chr_),
        ("dict", dict_),
        ("dir", dir_),
        ("enumerate", enumerate_),
        ("fail", fail_),
        ("float", float_),
        ("getattr", getattr_),
        ("hasattr", hasattr_),
        ("hash", hash_),
        ("int", int_),
        ("len", len_),
        ("list", list_),
        ("max", max_),
        ("min", min_),
        ("module", module_),
        ("ord", ord_),
        ("print", print_),
        ("range", range_),
        ("repr", repr_),
        ("reversed", reversed_),
        ("set", set_),
        ("sorted", sorted_),
        ("str", str_),
        ("struct", struct_),
        ("tuple", tuple_),
        ("type", type_),
        ("zip", zip_),
    ];
    let mut dict = StringDict::new();
    for (name, f) in entries {
        dict.insert(*name, Builtin::value(name, *f));
    }
    dict
});

/// The universal environment shared by every module.
pub fn universe() -> &'static StringDict {
    &UNIVERSE
}

pub fn is_universal(name: &str) -> bool {
    UNIVERSE.has(name)
}

// ---- method dispatch ----

static STRING_METHODS: &[(&str, NativeFn)] = &[
    ("count", string_count),
    ("elems", string_elems),
    ("endswith", string_endswith),
    ("find", string_find),
    ("format", string_format),
    ("isalpha", string_isalpha),
    ("isdigit", string_isdigit),
    ("isspace", string_isspace),
    ("join", string_join),
    ("lower", string_lower),
    ("lstrip", string_lstrip),
    ("replace", string_replace),
    ("rfind", string_rfind),
    ("rsplit", string_rsplit),
    ("rstrip", string_rstrip),
    ("split", string_split),
    ("startswith", string_startswith),
    ("strip", string_strip),
    ("upper", string_upper),
];

static LIST_METHODS: &[(&str, NativeFn)] = &[
    ("append", list_append),
    ("clear", list_clear),
    ("extend", list_extend),
    ("index", list_index),
    ("insert", list_insert),
    ("pop", list_pop),
    ("remove", list_remove),
];

static DICT_METHODS: &[(&str, NativeFn)] = &[
    ("clear", dict_clear),
    ("get", dict_get),
    ("items", dict_items),
    ("keys", dict_keys),
    ("pop", dict_pop),
    ("setdefault", dict_setdefault),
    ("update", dict_update),
    ("values", dict_values),
];

static SET_METHODS: &[(&str, NativeFn)] = &[
    ("add", set_add),
    ("remove", set_remove),
    ("union", set_union),
];

fn method_table(recv: &Value) -> Option<&'static [(&'static str, NativeFn)]> {
    match recv {
        Value::Str(_) => Some(STRING_METHODS),
        Value::List(_) => Some(LIST_METHODS),
        Value::Dict(_) => Some(DICT_METHODS),
        Value::Set(_) => Some(SET_METHODS),
        _ => None,
    }
}

/// A bound method of a built-in type, or `None` if the type has no such
/// attribute.
pub(crate) fn builtin_attr(recv: &Value, name: &str) -> Option<Value> {
    let table = method_table(recv)?;
    let (mname, f) = table.iter().find(|(n, _)| *n == name)?;
    Some(Builtin::new(mname, *f).bind(recv.clone()))
}

pub(crate) fn builtin_attr_names(recv: &Value) -> Vec<String> {
    match method_table(recv) {
        Some(table) => table.iter().map(|(n, _)| n.to_string()).collect(),
        None => Vec::new(),
    }
}

// ---- receiver helpers ----

fn recv_str(b: &Builtin) -> Result<Str, EvalError> {
    match b.receiver() {
        Some(Value::Str(s)) => Ok(s.clone()),
        _ => Err(EvalError::internal(format!("{}: no string receiver", b.name))),
    }
}

fn recv_list(b: &Builtin) -> Result<Arc<crate::val::List>, EvalError> {
    match b.receiver() {
        Some(Value::List(l)) => Ok(l.clone()),
        _ => Err(EvalError::internal(format!("{}: no list receiver", b.name))),
    }
}

fn recv_dict(b: &Builtin) -> Result<Arc<Dict>, EvalError> {
    match b.receiver() {
        Some(Value::Dict(d)) => Ok(d.clone()),
        _ => Err(EvalError::internal(format!("{}: no dict receiver", b.name))),
    }
}

fn recv_set(b: &Builtin) -> Result<Arc<Set>, EvalError> {
    match b.receiver() {
        Some(Value::Set(s)) => Ok(s.clone()),
        _ => Err(EvalError::internal(format!("{}: no set receiver", b.name))),
    }
}

fn collect_iterable(fname: &str, v: &Value) -> Result<Vec<Value>, EvalError> {
    v.iterate()
        .map(|it| it.collect())
        .map_err(|_| EvalError::typ(format!("{}: got {}, want iterable", fname, v.type_name())))
}

// ---- universe ----

fn all_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    unpack_positional_args("all", args, kwargs, 1, &mut [("x", &mut x)])?;
    for v in collect_iterable("all", &x)? {
        if !v.truth() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn any_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    unpack_positional_args("any", args, kwargs, 1, &mut [("x", &mut x)])?;
    for v in collect_iterable("any", &x)? {
        if v.truth() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn bool_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::Bool(false);
    unpack_positional_args("bool", args, kwargs, 0, &mut [("x?", &mut x)])?;
    Ok(Value::Bool(x.truth()))
}

fn bytes_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    unpack_positional_args("bytes", args, kwargs, 1, &mut [("x", &mut x)])?;
    match &x {
        Value::Bytes(_) => Ok(x.clone()),
        Value::Str(s) => Ok(Value::bytes(s.as_bytes().to_vec())),
        Value::List(_) | Value::Tuple(_) => {
            let mut out = Vec::new();
            for v in collect_iterable("bytes", &x)? {
                match &v {
                    Value::Int(i) => match i.to_u64() {
                        Some(n) if n < 256 => out.push(n as u8),
                        _ => {
                            return Err(EvalError::value(format!(
                                "bytes: element {} out of range [0, 255]",
                                v.repr()
                            )));
                        }
                    },
                    _ => {
                        return Err(EvalError::typ(format!(
                            "bytes: got {} element, want int",
                            v.type_name()
                        )));
                    }
                }
            }
            Ok(Value::bytes(out))
        }
        _ => Err(EvalError::typ(format!(
            "bytes: got {}, want string, bytes, or iterable of ints",
            x.type_name()
        ))),
    }
}

fn chr_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut i: i64 = 0;
    unpack_positional_args("chr", args, kwargs, 1, &mut [("i", &mut i)])?;
    let ch = u32::try_from(i)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| EvalError::value(format!("chr: Unicode code point {} out of range", i)))?;
    Ok(Value::string(ch.to_string()))
}

fn dict_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    if args.len() > 1 {
        return Err(EvalError::typ(format!(
            "dict: got {} arguments, want at most 1",
            args.len()
        )));
    }
    let d = Dict::new();
    if let Some(src) = args.first() {
        match src {
            Value::Dict(other) => {
                for (k, v) in other.items() {
                    d.insert(&k, v)?;
                }
            }
            _ => {
                for (i, pair) in collect_iterable("dict", src)?.into_iter().enumerate() {
                    let items = collect_iterable("dict", &pair).map_err(|_| {
                        EvalError::typ(format!(
                            "dict: dictionary update sequence element #{} is not iterable",
                            i
                        ))
                    })?;
                    if items.len() != 2 {
                        return Err(EvalError::value(format!(
                            "dict: dictionary update sequence element #{} has length {}, want 2",
                            i,
                            items.len()
                        )));
                    }
                    d.insert(&items[0], items[1].clone())?;
                }
            }
        }
    }
    for (k, v) in kwargs {
        d.insert(&Value::str_(k), v.clone())?;
    }
    Ok(Value::Dict(d))
}

fn dir_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    unpack_positional_args("dir", args, kwargs, 1, &mut [("x", &mut x)])?;
    let names = x.attr_names();
    Ok(Value::new_list(
        names.into_iter().map(Value::string).collect(),
    ))
}

fn enumerate_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    let mut start: i64 = 0;
    unpack_args("enumerate", args, kwargs, &mut [("x", &mut x), ("start?", &mut start)])?;
    let out = collect_iterable("enumerate", &x)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| Value::new_tuple(vec![Value::int(start + i as i64), v]))
        .collect();
    Ok(Value::new_list(out))
}

fn fail_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut sep = " ".to_string();
    for (k, v) in kwargs {
        if k == "sep" {
            match v {
                Value::Str(s) => sep = s.to_str_lossy().into_owned(),
                _ => {
                    return Err(EvalError::typ(format!(
                        "fail: for parameter sep: got {}, want string",
                        v.type_name()
                    )));
                }
            }
        } else {
            return Err(EvalError::typ(format!(
                "fail: unexpected keyword argument \"{}\"",
                k
            )));
        }
    }
    let parts: Vec<String> = args.iter().map(|v| v.to_str()).collect();
    Err(EvalError::other(format!("fail: {}", parts.join(&sep))))
}

fn float_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::Float(0.0);
    unpack_positional_args("float", args, kwargs, 0, &mut [("x?", &mut x)])?;
    match &x {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(i.to_f64())),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => {
            let text = s.to_str_lossy();
            let trimmed = text.trim();
            trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| EvalError::value(format!("float: invalid literal: {}", trimmed)))
        }
        _ => Err(EvalError::typ(format!(
            "float: got {}, want number, bool, or string",
            x.type_name()
        ))),
    }
}

fn getattr_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    let mut name = String::new();
    let mut default: Option<Value> = None;
    unpack_args(
        "getattr",
        args,
        kwargs,
        &mut [("x", &mut x), ("name", &mut name), ("default?", &mut default)],
    )?;
    match x.attr(&name)? {
        Some(v) => Ok(v),
        None => match default {
            Some(d) => Ok(d),
            None => Err(EvalError::attr(format!(
                "{} has no .{} field or method",
                x.type_name(),
                name
            ))),
        },
    }
}

fn hasattr_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    let mut name = String::new();
    unpack_args("hasattr", args, kwargs, &mut [("x", &mut x), ("name", &mut name)])?;
    Ok(Value::Bool(x.attr(&name)?.is_some()))
}

fn hash_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    unpack_positional_args("hash", args, kwargs, 1, &mut [("x", &mut x)])?;
    match &x {
        Value::Str(_) | Value::Bytes(_) => Ok(Value::int(x.hash32()? as i32 as i64)),
        _ => Err(EvalError::typ(format!(
            "hash: got {}, want string or bytes",
            x.type_name()
        ))),
    }
}

fn int_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::int(0);
    let mut base: Option<i64> = None;
    unpack_args("int", args, kwargs, &mut [("x?", &mut x), ("base?", &mut base)])?;
    match &x {
        Value::Int(_) => {
            if base.is_some() {
                return Err(EvalError::typ("int: can't convert non-string with explicit base"));
            }
            Ok(x.clone())
        }
        Value::Bool(b) => Ok(Value::int(if *b { 1 } else { 0 })),
        Value::Float(f) => {
            if base.is_some() {
                return Err(EvalError::typ("int: can't convert non-string with explicit base"));
            }
            Int::from_f64_exact(f.trunc())
                .map(Value::Int)
                .ok_or_else(|| EvalError::value("int: cannot convert non-finite float to int"))
        }
        Value::Str(s) => {
            let base = base.unwrap_or(10);
            if base != 0 && !(2..=36).contains(&base) {
                return Err(EvalError::value(format!("int: invalid base {}", base)));
            }
            let text = s.to_str_lossy();
            parse_int_literal(text.trim(), base as u32)
        }
        _ => Err(EvalError::typ(format!(
            "int: got {}, want number, bool, or string",
            x.type_name()
        ))),
    }
}

fn parse_int_literal(text: &str, base: u32) -> Result<Value, EvalError> {
    let fail = || EvalError::value(format!("int: invalid literal with base {}: \"{}\"", base, text));
    let (neg, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    // A radix prefix is accepted when it matches the base, or selects the
    // base when the caller passed 0.
    let prefixed = if let Some(d) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        Some((16, d))
    } else if let Some(d) = body.strip_prefix("0o").or_else(|| body.strip_prefix("0O")) {
        Some((8, d))
    } else if let Some(d) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        Some((2, d))
    } else {
        None
    };
    let (digits, base) = match prefixed {
        Some((b, d)) if base == 0 || base == b => (d, b),
        Some(_) => return Err(fail()),
        None => (body, if base == 0 { 10 } else { base }),
    };
    if digits.is_empty() {
        return Err(fail());
    }
    let value = Int::from_str_radix(digits, base).map_err(|_| fail())?;
    Ok(Value::Int(if neg { value.checked_neg() } else { value }))
}

fn len_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    unpack_positional_args("len", args, kwargs, 1, &mut [("x", &mut x)])?;
    let n = match &x {
        Value::Str(s) => s.len(),
        Value::Bytes(b) => b.len(),
        Value::List(l) => l.len(),
        Value::Tuple(t) => t.len(),
        Value::Dict(d) => d.len(),
        Value::Set(s) => s.len(),
        Value::Range(r) => r.len(),
        _ => {
            return Err(EvalError::typ(format!(
                "len: value of type {} has no len",
                x.type_name()
            )));
        }
    };
    Ok(Value::int(n))
}

fn list_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x: Option<Value> = None;
    unpack_positional_args("list", args, kwargs, 0, &mut [("x?", &mut x)])?;
    match x {
        Some(v) => Ok(Value::new_list(collect_iterable("list", &v)?)),
        None => Ok(Value::new_list(Vec::new())),
    }
}

fn min_(thread: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    extreme(thread, b, args, kwargs, Ordering::Less)
}

fn max_(thread: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    extreme(thread, b, args, kwargs, Ordering::Greater)
}

fn extreme(
    thread: &mut Thread,
    b: &Builtin,
    args: &[Value],
    kwargs: &[(String, Value)],
    want: Ordering,
) -> Result<Value, EvalError> {
    let name = b.name.as_ref();
    let mut key: Option<Value> = None;
    for (k, v) in kwargs {
        if k == "key" {
            if !matches!(v, Value::None) {
                key = Some(v.clone());
            }
        } else {
            return Err(EvalError::typ(format!(
                "{}: unexpected keyword argument \"{}\"",
                name, k
            )));
        }
    }
    let items: Vec<Value> = match args.len() {
        0 => {
            return Err(EvalError::typ(format!(
                "{}: got 0 arguments, want at least 1",
                name
            )));
        }
        1 => collect_iterable(name, &args[0])?,
        _ => args.to_vec(),
    };
    let Some(first) = items.first().cloned() else {
        return Err(EvalError::value(format!(
            "{}: argument is an empty sequence",
            name
        )));
    };
    let keyed = |thread: &mut Thread, v: &Value| -> Result<Value, EvalError> {
        match &key {
            Some(f) => crate::vm::call_value(thread, f, vec![v.clone()], Vec::new()),
            None => Ok(v.clone()),
        }
    };
    let mut best = first.clone();
    let mut best_key = keyed(thread, &first)?;
    let sym = if want == Ordering::Less { "<" } else { ">" };
    for v in &items[1..] {
        let k = keyed(thread, v)?;
        if order_values(sym, &k, &best_key)? == want {
            best = v.clone();
            best_key = k;
        }
    }
    Ok(best)
}

fn module_(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut name = String::new();
    unpack_positional_args(&b.name, args, &[], 1, &mut [("name", &mut name)])?;
    let mut members = StringDict::new();
    for (k, v) in kwargs {
        members.insert(k.clone(), v.clone());
    }
    Ok(Value::Module(Arc::new(Module { name, members })))
}

fn ord_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut s = Str::from("");
    unpack_positional_args("ord", args, kwargs, 1, &mut [("s", &mut s)])?;
    let text = s.to_str_lossy();
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(Value::int(ch as u32 as i64)),
        _ => Err(EvalError::value(format!(
            "ord: string encodes {} Unicode code points, want 1",
            text.chars().count()
        ))),
    }
}

fn print_(thread: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut sep = " ".to_string();
    for (k, v) in kwargs {
        if k == "sep" {
            match v {
                Value::Str(s) => sep = s.to_str_lossy().into_owned(),
                _ => {
                    return Err(EvalError::typ(format!(
                        "print: for parameter sep: got {}, want string",
                        v.type_name()
                    )));
                }
            }
        } else {
            return Err(EvalError::typ(format!(
                "print: unexpected keyword argument \"{}\"",
                k
            )));
        }
    }
    let parts: Vec<String> = args.iter().map(|v| v.to_str()).collect();
    let msg = parts.join(&sep);
    match thread.print_hook() {
        Some(hook) => hook(thread, &msg),
        None => eprintln!("{}", msg),
    }
    Ok(Value::None)
}

fn range_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut a: i64 = 0;
    let mut b: Option<i64> = None;
    let mut step: i64 = 1;
    unpack_positional_args(
        "range",
        args,
        kwargs,
        1,
        &mut [("start", &mut a), ("stop?", &mut b), ("step?", &mut step)],
    )?;
    let (start, stop) = match b {
        Some(stop) => (a, stop),
        None => (0, a),
    };
    if step == 0 {
        return Err(EvalError::value("range: step argument must not be zero"));
    }
    Ok(Value::Range(Arc::new(RangeValue::new(start, stop, step))))
}

fn repr_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    unpack_positional_args("repr", args, kwargs, 1, &mut [("x", &mut x)])?;
    Ok(Value::string(x.repr()))
}

fn reversed_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    unpack_positional_args("reversed", args, kwargs, 1, &mut [("x", &mut x)])?;
    let mut items = collect_iterable("reversed", &x)?;
    items.reverse();
    Ok(Value::new_list(items))
}

fn set_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x: Option<Value> = None;
    unpack_positional_args("set", args, kwargs, 0, &mut [("x?", &mut x)])?;
    let out = Set::new();
    if let Some(v) = x {
        for item in collect_iterable("set", &v)? {
            out.add(&item)?;
        }
    }
    Ok(Value::Set(out))
}

fn sorted_(thread: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    if args.len() != 1 {
        return Err(EvalError::typ(format!(
            "sorted: got {} arguments, want 1",
            args.len()
        )));
    }
    let x = args[0].clone();
    let mut key: Option<Value> = None;
    let mut reverse = false;
    for (k, v) in kwargs {
        match k.as_str() {
            "key" => {
                if !matches!(v, Value::None) {
                    key = Some(v.clone());
                }
            }
            "reverse" => reverse = v.truth(),
            _ => {
                return Err(EvalError::typ(format!(
                    "sorted: unexpected keyword argument \"{}\"",
                    k
                )));
            }
        }
    }
    let items = collect_iterable("sorted", &x)?;
    let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(items.len());
    for v in items {
        let k = match &key {
            Some(f) => crate::vm::call_value(thread, f, vec![v.clone()], Vec::new())?,
            None => v.clone(),
        };
        keyed.push((k, v));
    }
    let mut first_err: Option<EvalError> = None;
    keyed.sort_by(|a, b| {
        if first_err.is_some() {
            return Ordering::Equal;
        }
        match order_values("<", &a.0, &b.0) {
            Ok(o) => o,
            Err(e) => {
                first_err = Some(e);
                Ordering::Equal
            }
        }
    });
    if let Some(e) = first_err {
        return Err(e);
    }
    if reverse {
        keyed.reverse();
    }
    Ok(Value::new_list(keyed.into_iter().map(|(_, v)| v).collect()))
}

fn str_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::str_("");
    unpack_positional_args("str", args, kwargs, 0, &mut [("x?", &mut x)])?;
    Ok(Value::string(x.to_str()))
}

fn struct_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    if !args.is_empty() {
        return Err(EvalError::typ("struct: unexpected positional arguments"));
    }
    let mut fields = IndexMap::new();
    for (k, v) in kwargs {
        fields.insert(k.clone(), v.clone());
    }
    Ok(Value::Struct(Arc::new(StructValue { fields })))
}

fn tuple_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x: Option<Value> = None;
    unpack_positional_args("tuple", args, kwargs, 0, &mut [("x?", &mut x)])?;
    match x {
        Some(v) => Ok(Value::new_tuple(collect_iterable("tuple", &v)?)),
        None => Ok(Value::new_tuple(Vec::new())),
    }
}

fn type_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let mut x = Value::None;
    unpack_positional_args("type", args, kwargs, 1, &mut [("x", &mut x)])?;
    Ok(Value::str_(x.type_name()))
}

fn zip_(_: &mut Thread, _: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    if !kwargs.is_empty() {
        return Err(EvalError::typ("zip: unexpected keyword arguments"));
    }
    let mut iters = Vec::with_capacity(args.len());
    for v in args {
        iters.push(v.iterate().map_err(|_| {
            EvalError::typ(format!("zip: got {}, want iterable", v.type_name()))
        })?);
    }
    let mut out = Vec::new();
    if iters.is_empty() {
        return Ok(Value::new_list(out));
    }
    'outer: loop {
        let mut row = Vec::with_capacity(iters.len());
        for it in &mut iters {
            match it.next() {
                Some(v) => row.push(v),
                None => break 'outer,
            }
        }
        out.push(Value::new_tuple(row));
    }
    Ok(Value::new_list(out))
}

// ---- string methods ----

fn string_count(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut needle = Str::from("");
    unpack_positional_args("count", args, kwargs, 1, &mut [("sub", &mut needle)])?;
    if needle.is_empty() {
        return Ok(Value::int(recv.len() + 1));
    }
    let mut n = 0usize;
    let mut hay = recv.as_bytes();
    while let Some(i) = find_sub(hay, needle.as_bytes()) {
        n += 1;
        hay = &hay[i + needle.len()..];
    }
    Ok(Value::int(n))
}

fn string_elems(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    unpack_positional_args("elems", args, kwargs, 0, &mut [])?;
    let out = recv
        .as_bytes()
        .iter()
        .map(|&byte| Value::Str(Str::from_bytes(vec![byte])))
        .collect();
    Ok(Value::new_list(out))
}

fn string_endswith(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut suffix = Str::from("");
    unpack_positional_args("endswith", args, kwargs, 1, &mut [("suffix", &mut suffix)])?;
    Ok(Value::Bool(recv.as_bytes().ends_with(suffix.as_bytes())))
}

fn string_startswith(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut prefix = Str::from("");
    unpack_positional_args("startswith", args, kwargs, 1, &mut [("prefix", &mut prefix)])?;
    Ok(Value::Bool(recv.as_bytes().starts_with(prefix.as_bytes())))
}

fn string_find(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut needle = Str::from("");
    unpack_positional_args("find", args, kwargs, 1, &mut [("sub", &mut needle)])?;
    match find_sub(recv.as_bytes(), needle.as_bytes()) {
        Some(i) => Ok(Value::int(i)),
        None => Ok(Value::int(-1)),
    }
}

fn string_rfind(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut needle = Str::from("");
    unpack_positional_args("rfind", args, kwargs, 1, &mut [("sub", &mut needle)])?;
    let hay = recv.as_bytes();
    let sub = needle.as_bytes();
    if sub.is_empty() {
        return Ok(Value::int(hay.len()));
    }
    if sub.len() <= hay.len() {
        for start in (0..=hay.len() - sub.len()).rev() {
            if &hay[start..start + sub.len()] == sub {
                return Ok(Value::int(start));
            }
        }
    }
    Ok(Value::int(-1))
}

fn string_format(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let text = recv.to_str_lossy().into_owned();
    let mut out = String::with_capacity(text.len());
    let mut auto = 0usize;
    let mut manual = false;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(EvalError::value("format: single '}' in format string"));
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(':') => {
                            return Err(EvalError::value("format: format specs are not supported"));
                        }
                        Some(c) => field.push(c),
                        None => {
                            return Err(EvalError::value("format: unmatched '{' in format string"));
                        }
                    }
                }
                let value = if field.is_empty() {
                    if manual {
                        return Err(EvalError::value(
                            "format: cannot switch from manual to automatic field numbering",
                        ));
                    }
                    let v = args.get(auto).ok_or_else(|| {
                        EvalError::index(format!("format: tuple index {} out of range", auto))
                    })?;
                    auto += 1;
                    v.clone()
                } else if let Ok(i) = field.parse::<usize>() {
                    manual = true;
                    args.get(i)
                        .ok_or_else(|| {
                            EvalError::index(format!("format: tuple index {} out of range", i))
                        })?
                        .clone()
                } else {
                    kwargs
                        .iter()
                        .find(|(k, _)| *k == field)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| {
                            EvalError::key(format!("format: keyword {} not found", field))
                        })?
                };
                out.push_str(&value.to_str());
            }
            c => out.push(c),
        }
    }
    Ok(Value::string(out))
}

fn string_isalpha(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    unpack_positional_args("isalpha", args, kwargs, 0, &mut [])?;
    let text = recv.to_str_lossy();
    Ok(Value::Bool(
        !text.is_empty() && text.chars().all(|c| c.is_alphabetic()),
    ))
}

fn string_isdigit(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    unpack_positional_args("isdigit", args, kwargs, 0, &mut [])?;
    let text = recv.to_str_lossy();
    Ok(Value::Bool(
        !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()),
    ))
}

fn string_isspace(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    unpack_positional_args("isspace", args, kwargs, 0, &mut [])?;
    let text = recv.to_str_lossy();
    Ok(Value::Bool(
        !text.is_empty() && text.chars().all(|c| c.is_whitespace()),
    ))
}

fn string_join(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut iterable = Value::None;
    unpack_positional_args("join", args, kwargs, 1, &mut [("elements", &mut iterable)])?;
    let items = collect_iterable("join", &iterable)?;
    let mut out: Vec<u8> = Vec::new();
    for (i, v) in items.iter().enumerate() {
        match v {
            Value::Str(s) => {
                if i > 0 {
                    out.extend_from_slice(recv.as_bytes());
                }
                out.extend_from_slice(s.as_bytes());
            }
            _ => {
                return Err(EvalError::typ(format!(
                    "join: in list, want string, got {}",
                    v.type_name()
                )));
            }
        }
    }
    Ok(Value::Str(Str::from_bytes(out)))
}

fn string_lower(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    unpack_positional_args("lower", args, kwargs, 0, &mut [])?;
    Ok(Value::string(recv.to_str_lossy().to_lowercase()))
}

fn string_upper(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    unpack_positional_args("upper", args, kwargs, 0, &mut [])?;
    Ok(Value::string(recv.to_str_lossy().to_uppercase()))
}

fn strip_impl(recv: &Str, chars: Option<&str>, left: bool, right: bool) -> Value {
    let bytes = recv.as_bytes();
    let is_strippable = |b: u8| match chars {
        Some(set) => set.as_bytes().contains(&b),
        None => b.is_ascii_whitespace(),
    };
    let mut start = 0usize;
    let mut end = bytes.len();
    if left {
        while start < end && is_strippable(bytes[start]) {
            start += 1;
        }
    }
    if right {
        while end > start && is_strippable(bytes[end - 1]) {
            end -= 1;
        }
    }
    Value::Str(Str::from_bytes(bytes[start..end].to_vec()))
}

fn string_strip(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut chars: Option<String> = None;
    unpack_positional_args("strip", args, kwargs, 0, &mut [("chars?", &mut chars)])?;
    Ok(strip_impl(&recv, chars.as_deref(), true, true))
}

fn string_lstrip(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut chars: Option<String> = None;
    unpack_positional_args("lstrip", args, kwargs, 0, &mut [("chars?", &mut chars)])?;
    Ok(strip_impl(&recv, chars.as_deref(), true, false))
}

fn string_rstrip(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut chars: Option<String> = None;
    unpack_positional_args("rstrip", args, kwargs, 0, &mut [("chars?", &mut chars)])?;
    Ok(strip_impl(&recv, chars.as_deref(), false, true))
}

fn string_replace(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut old = Str::from("");
    let mut new = Str::from("");
    let mut count: i64 = -1;
    unpack_positional_args(
        "replace",
        args,
        kwargs,
        2,
        &mut [("old", &mut old), ("new", &mut new), ("count?", &mut count)],
    )?;
    if old.is_empty() {
        return Err(EvalError::value("replace: empty old string"));
    }
    let mut out: Vec<u8> = Vec::with_capacity(recv.len());
    let mut rest = recv.as_bytes();
    let mut done: i64 = 0;
    while count < 0 || done < count {
        match find_sub(rest, old.as_bytes()) {
            Some(i) => {
                out.extend_from_slice(&rest[..i]);
                out.extend_from_slice(new.as_bytes());
                rest = &rest[i + old.len()..];
                done += 1;
            }
            None => break,
        }
    }
    out.extend_from_slice(rest);
    Ok(Value::Str(Str::from_bytes(out)))
}

fn split_whitespace(bytes: &[u8]) -> Vec<Value> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if b.is_ascii_whitespace() {
            if let Some(s) = start.take() {
                out.push(Value::Str(Str::from_bytes(bytes[s..i].to_vec())));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push(Value::Str(Str::from_bytes(bytes[s..].to_vec())));
    }
    out
}

fn string_split(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut sep: Option<String> = None;
    let mut maxsplit: i64 = -1;
    unpack_positional_args(
        "split",
        args,
        kwargs,
        0,
        &mut [("sep?", &mut sep), ("maxsplit?", &mut maxsplit)],
    )?;
    let Some(sep) = sep else {
        return Ok(Value::new_list(split_whitespace(recv.as_bytes())));
    };
    if sep.is_empty() {
        return Err(EvalError::value("split: empty separator"));
    }
    let mut out = Vec::new();
    let mut rest = recv.as_bytes();
    let mut splits: i64 = 0;
    while maxsplit < 0 || splits < maxsplit {
        match find_sub(rest, sep.as_bytes()) {
            Some(i) => {
                out.push(Value::Str(Str::from_bytes(rest[..i].to_vec())));
                rest = &rest[i + sep.len()..];
                splits += 1;
            }
            None => break,
        }
    }
    out.push(Value::Str(Str::from_bytes(rest.to_vec())));
    Ok(Value::new_list(out))
}

fn string_rsplit(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_str(b)?;
    let mut sep: Option<String> = None;
    let mut maxsplit: i64 = -1;
    unpack_positional_args(
        "rsplit",
        args,
        kwargs,
        0,
        &mut [("sep?", &mut sep), ("maxsplit?", &mut maxsplit)],
    )?;
    let Some(sep) = sep else {
        return Ok(Value::new_list(split_whitespace(recv.as_bytes())));
    };
    if sep.is_empty() {
        return Err(EvalError::value("rsplit: empty separator"));
    }
    // Split fully, then merge the leading parts beyond the limit.
    let mut parts: Vec<Vec<u8>> = Vec::new();
    let mut rest = recv.as_bytes();
    loop {
        match find_sub(rest, sep.as_bytes()) {
            Some(i) => {
                parts.push(rest[..i].to_vec());
                rest = &rest[i + sep.len()..];
            }
            None => {
                parts.push(rest.to_vec());
                break;
            }
        }
    }
    if maxsplit >= 0 && (parts.len() as i64) > maxsplit + 1 {
        let keep = parts.len() - maxsplit as usize;
        let merged = parts[..keep].join(&sep.as_bytes().to_vec()[..]);
        let mut out = vec![merged];
        out.extend(parts[keep..].iter().cloned());
        parts = out;
    }
    Ok(Value::new_list(
        parts
            .into_iter()
            .map(|p| Value::Str(Str::from_bytes(p)))
            .collect(),
    ))
}

// ---- list methods ----

fn list_append(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_list(b)?;
    let mut x = Value::None;
    unpack_positional_args("append", args, kwargs, 1, &mut [("x", &mut x)])?;
    recv.append(x)?;
    Ok(Value::None)
}

fn list_clear(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_list(b)?;
    unpack_positional_args("clear", args, kwargs, 0, &mut [])?;
    recv.clear()?;
    Ok(Value::None)
}

fn list_extend(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_list(b)?;
    let mut x = Value::None;
    unpack_positional_args("extend", args, kwargs, 1, &mut [("x", &mut x)])?;
    let items = collect_iterable("extend", &x)?;
    recv.extend_with(items)?;
    Ok(Value::None)
}

fn list_index(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_list(b)?;
    let mut x = Value::None;
    unpack_positional_args("index", args, kwargs, 1, &mut [("x", &mut x)])?;
    for (i, v) in recv.snapshot().iter().enumerate() {
        if crate::val::equal(&x, v)? {
            return Ok(Value::int(i));
        }
    }
    Err(EvalError::value(format!("index: value {} not in list", x.repr())))
}

fn list_insert(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_list(b)?;
    let mut i: i64 = 0;
    let mut x = Value::None;
    unpack_positional_args("insert", args, kwargs, 2, &mut [("index", &mut i), ("x", &mut x)])?;
    let len = recv.len() as i64;
    let at = if i < 0 { (i + len).max(0) } else { i.min(len) };
    recv.insert_at(at as usize, x)?;
    Ok(Value::None)
}

fn list_pop(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_list(b)?;
    let mut i: i64 = -1;
    unpack_positional_args("pop", args, kwargs, 0, &mut [("index?", &mut i)])?;
    let len = recv.len() as i64;
    if len == 0 {
        return Err(EvalError::index("pop: empty list"));
    }
    let at = if i < 0 { i + len } else { i };
    if at < 0 || at >= len {
        return Err(EvalError::index(format!("pop: index {} out of range", i)));
    }
    recv.remove_at(at as usize)
}

fn list_remove(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_list(b)?;
    let mut x = Value::None;
    unpack_positional_args("remove", args, kwargs, 1, &mut [("x", &mut x)])?;
    for (i, v) in recv.snapshot().iter().enumerate() {
        if crate::val::equal(&x, v)? {
            recv.remove_at(i)?;
            return Ok(Value::None);
        }
    }
    Err(EvalError::value(format!("remove: element {} not found", x.repr())))
}

// ---- dict methods ----

fn dict_clear(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_dict(b)?;
    unpack_positional_args("clear", args, kwargs, 0, &mut [])?;
    recv.clear()?;
    Ok(Value::None)
}

fn dict_get(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_dict(b)?;
    let mut key = Value::None;
    let mut default = Value::None;
    unpack_positional_args("get", args, kwargs, 1, &mut [("key", &mut key), ("default?", &mut default)])?;
    Ok(recv.get(&key)?.unwrap_or(default))
}

fn dict_items(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_dict(b)?;
    unpack_positional_args("items", args, kwargs, 0, &mut [])?;
    let out = recv
        .items()
        .into_iter()
        .map(|(k, v)| Value::new_tuple(vec![k, v]))
        .collect();
    Ok(Value::new_list(out))
}

fn dict_keys(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_dict(b)?;
    unpack_positional_args("keys", args, kwargs, 0, &mut [])?;
    Ok(Value::new_list(recv.keys()))
}

fn dict_pop(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_dict(b)?;
    let mut key = Value::None;
    let mut default: Option<Value> = None;
    unpack_positional_args("pop", args, kwargs, 1, &mut [("key", &mut key), ("default?", &mut default)])?;
    match recv.delete(&key)? {
        Some(v) => Ok(v),
        None => match default {
            Some(d) => Ok(d),
            None => Err(EvalError::key(format!("pop: key {} not in dict", key.repr()))),
        },
    }
}

fn dict_setdefault(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_dict(b)?;
    let mut key = Value::None;
    let mut default = Value::None;
    unpack_positional_args(
        "setdefault",
        args,
        kwargs,
        1,
        &mut [("key", &mut key), ("default?", &mut default)],
    )?;
    if let Some(v) = recv.get(&key)? {
        return Ok(v);
    }
    recv.insert(&key, default.clone())?;
    Ok(default)
}

fn dict_update(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_dict(b)?;
    if args.len() > 1 {
        return Err(EvalError::typ(format!(
            "update: got {} arguments, want at most 1",
            args.len()
        )));
    }
    if let Some(src) = args.first() {
        match src {
            Value::Dict(other) => {
                for (k, v) in other.items() {
                    recv.insert(&k, v)?;
                }
            }
            _ => {
                for pair in collect_iterable("update", src)? {
                    let items = collect_iterable("update", &pair)?;
                    if items.len() != 2 {
                        return Err(EvalError::value(
                            "update: sequence element has wrong length, want 2",
                        ));
                    }
                    recv.insert(&items[0], items[1].clone())?;
                }
            }
        }
    }
    for (k, v) in kwargs {
        recv.insert(&Value::str_(k), v.clone())?;
    }
    Ok(Value::None)
}

fn dict_values(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_dict(b)?;
    unpack_positional_args("values", args, kwargs, 0, &mut [])?;
    Ok(Value::new_list(recv.values()))
}

// ---- set methods ----

fn set_add(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_set(b)?;
    let mut x = Value::None;
    unpack_positional_args("add", args, kwargs, 1, &mut [("x", &mut x)])?;
    recv.add(&x)?;
    Ok(Value::None)
}

fn set_remove(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_set(b)?;
    let mut x = Value::None;
    unpack_positional_args("remove", args, kwargs, 1, &mut [("x", &mut x)])?;
    if recv.remove(&x)? {
        Ok(Value::None)
    } else {
        Err(EvalError::value(format!("remove: element {} not found", x.repr())))
    }
}

fn set_union(_: &mut Thread, b: &Builtin, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
    let recv = recv_set(b)?;
    let mut x = Value::None;
    unpack_positional_args("union", args, kwargs, 1, &mut [("x", &mut x)])?;
    let out = Set::new();
    for v in recv.items() {
        out.add(&v)?;
    }
    for v in collect_iterable("union", &x)? {
        out.add(&v)?;
    }
    Ok(Value::Set(out))
}
