//! The virtual machine: a dispatch loop over the stack bytecode.
//!
//! Each call frame owns an operand stack, a local slot array, and a stack
//! of live iterators; unwinding a frame drops its iterators, which releases
//! the containers they pinned. Globals live on the executing module and are
//! frozen by the embedding layer once toplevel execution succeeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ast::BinOp;
use crate::compile::{call_counts, Funcode, Instr, ProgramData};
use crate::error::{EvalError, FramePos, TraceFrame};
use crate::eval::Thread;
use crate::profile;
use crate::val::{ops, CellSlot, Dict, Function, Iter, StringDict, Value};

#[cfg(test)]
mod vm_test;

/// Hard backstop against runaway recursion through host builtins.
const MAX_CALL_DEPTH: usize = 4096;

/// Module global slots: mutable during execution, frozen at completion.
pub struct Globals {
    frozen: AtomicBool,
    slots: Mutex<Vec<Option<Value>>>,
}

impl Globals {
    pub fn new(n: usize) -> Globals {
        Globals {
            frozen: AtomicBool::new(false),
            slots: Mutex::new(vec![None; n]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<Value>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, i: usize) -> Option<Value> {
        self.lock().get(i).cloned().flatten()
    }

    pub fn set(&self, i: usize, v: Value) -> Result<(), EvalError> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(EvalError::frozen("cannot assign to global of frozen module"));
        }
        if let Some(slot) = self.lock().get_mut(i) {
            *slot = Some(v);
        }
        Ok(())
    }

    /// Freeze the slots and every value reachable from them.
    pub fn freeze(&self) {
        if self.frozen.swap(true, Ordering::AcqRel) {
            return;
        }
        // Snapshot first: freezing descends into values that take their
        // own locks.
        let values: Vec<Value> = self.lock().iter().flatten().cloned().collect();
        for v in values {
            v.freeze();
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

/// The environment a compiled function executes against.
pub struct ModuleEnv {
    pub program: Arc<ProgramData>,
    pub predeclared: StringDict,
    pub globals: Globals,
}

/// One activation record.
pub struct Frame {
    pub(crate) callable: Value,
    pub(crate) pc: u32,
    pub(crate) locals: Vec<Option<Value>>,
    pub(crate) stack: Vec<Value>,
    pub(crate) iters: Vec<Iter>,
}

impl Frame {
    pub(crate) fn for_callable(callable: Value, locals: Vec<Option<Value>>) -> Frame {
        Frame {
            callable,
            pc: 0,
            locals,
            stack: Vec::new(),
            iters: Vec::new(),
        }
    }
}

/// Capture the thread's call stack, outermost frame first.
pub(crate) fn snapshot_frames(thread: &Thread) -> Vec<TraceFrame> {
    thread
        .stack
        .iter()
        .map(|fr| match &fr.callable {
            Value::Function(f) => {
                let pos = f.funcode.pos_for_pc(fr.pc);
                TraceFrame {
                    name: f.funcode.name.clone(),
                    pos: Some(FramePos {
                        filename: f.module.program.filename.clone(),
                        line: pos.line,
                        col: pos.col,
                    }),
                }
            }
            Value::Builtin(b) => TraceFrame {
                name: b.name.clone(),
                pos: None,
            },
            other => TraceFrame {
                name: Arc::<str>::from(other.type_name()),
                pos: None,
            },
        })
        .collect()
}

fn attach(thread: &Thread, mut e: EvalError) -> EvalError {
    if !e.has_stack() {
        e.frames = snapshot_frames(thread);
    }
    e
}

/// Call any callable value with already-evaluated arguments. This is the
/// single entry point used by the CALL instructions, builtins such as
/// `min(key=...)`, and the public `call` API.
pub fn call_value(
    thread: &mut Thread,
    f: &Value,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, EvalError> {
    if thread.stack.len() >= MAX_CALL_DEPTH {
        return Err(attach(
            thread,
            EvalError::recursion("maximum call stack depth exceeded"),
        ));
    }
    match f {
        Value::Function(func) => {
            if !crate::resolve::default_options().allow_recursion {
                for fr in &thread.stack {
                    if let Value::Function(active) = &fr.callable {
                        if Arc::ptr_eq(&active.funcode, &func.funcode) {
                            return Err(attach(
                                thread,
                                EvalError::recursion(format!(
                                    "function {} called recursively",
                                    func.name()
                                )),
                            ));
                        }
                    }
                }
            }
            let mut locals = bind_args(func, args, kwargs).map_err(|e| attach(thread, e))?;
            for &ci in &func.funcode.cells {
                let init = locals[ci as usize].take();
                locals[ci as usize] = Some(Value::Cell(CellSlot::new(init)));
            }
            thread.stack.push(Frame::for_callable(f.clone(), locals));
            let result = interp(thread).map_err(|e| attach(thread, e));
            thread.stack.pop();
            result
        }
        Value::Builtin(b) => {
            thread
                .stack
                .push(Frame::for_callable(f.clone(), Vec::new()));
            let result = (b.func)(thread, b, &args, &kwargs).map_err(|e| attach(thread, e));
            thread.stack.pop();
            result
        }
        Value::Foreign(fv) if fv.callable() => {
            thread
                .stack
                .push(Frame::for_callable(f.clone(), Vec::new()));
            let result = fv
                .call_value(thread, &args, &kwargs)
                .map_err(|e| attach(thread, e));
            thread.stack.pop();
            result
        }
        _ => Err(attach(
            thread,
            EvalError::typ(format!("invalid call of non-function ({})", f.type_name())),
        )),
    }
}

/// Bind call-site arguments to parameter slots, in the documented order:
/// positionals, keywords, defaults, required check, overflow sinks.
fn bind_args(
    func: &Function,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Vec<Option<Value>>, EvalError> {
    let fc = &func.funcode;
    let fname = &fc.name;
    let mut locals: Vec<Option<Value>> = vec![None; fc.locals.len()];

    let nparams = fc.params.len();
    if nparams == 0 {
        if !args.is_empty() || !kwargs.is_empty() {
            return Err(EvalError::typ(format!(
                "function {} accepts no arguments ({} given)",
                fname,
                args.len() + kwargs.len()
            )));
        }
        return Ok(locals);
    }

    let nnamed = nparams - usize::from(fc.has_varargs) - usize::from(fc.has_kwargs);
    let npositional = fc.num_positional();

    // (1) positionals, left to right.
    let mut n = args.len();
    if args.len() > npositional {
        if !fc.has_varargs {
            let optional = fc.params[..npositional].iter().any(|p| p.has_default);
            let at_most = if optional { "at most " } else { "" };
            let plural = if npositional == 1 { "" } else { "s" };
            return Err(EvalError::typ(format!(
                "function {} accepts {}{} positional argument{} ({} given)",
                fname,
                at_most,
                npositional,
                plural,
                args.len()
            )));
        }
        n = npositional;
    }
    let mut args = args;
    let rest = args.split_off(n);
    for (i, v) in args.into_iter().enumerate() {
        locals[i] = Some(v);
    }
    if fc.has_varargs {
        locals[nnamed] = Some(Value::new_tuple(rest));
    }

    // (2) keywords by name; (5) overflow into **kwargs.
    let kwdict = if fc.has_kwargs { Some(Dict::new()) } else { None };
    'kw: for (k, v) in kwargs {
        for (i, p) in fc.params[..nnamed].iter().enumerate() {
            if p.name.as_ref() == k {
                if locals[i].is_some() {
                    return Err(EvalError::typ(format!(
                        "function {} got multiple values for parameter \"{}\"",
                        fname, k
                    )));
                }
                locals[i] = Some(v);
                continue 'kw;
            }
        }
        match &kwdict {
            Some(d) => {
                let key = Value::str_(&k);
                if d.contains(&key)? {
                    return Err(EvalError::typ(format!(
                        "function {} got multiple values for keyword argument \"{}\"",
                        fname, k
                    )));
                }
                d.insert(&key, v)?;
            }
            None => {
                return Err(EvalError::typ(format!(
                    "function {} got an unexpected keyword argument \"{}\"",
                    fname, k
                )));
            }
        }
    }
    if let Some(d) = kwdict {
        locals[nparams - 1] = Some(Value::Dict(d));
    }

    // (3) defaults fill the trailing optional named parameters.
    let ndefaults = func.defaults.len();
    let first_default = nnamed - ndefaults;
    for (i, dv) in func.defaults.iter().enumerate() {
        let slot = first_default + i;
        if locals[slot].is_none() && !matches!(dv, Value::Mandatory) {
            locals[slot] = Some(dv.clone());
        }
    }

    // (4) everything required must now be bound.
    let missing: Vec<&str> = (0..nnamed)
        .filter(|&i| locals[i].is_none())
        .map(|i| fc.params[i].name.as_ref())
        .collect();
    if !missing.is_empty() {
        let plural = if missing.len() == 1 { "" } else { "s" };
        return Err(EvalError::typ(format!(
            "function {} missing {} argument{} ({})",
            fname,
            missing.len(),
            plural,
            missing.join(", ")
        )));
    }
    Ok(locals)
}

fn pop(thread: &mut Thread, fr: usize) -> Result<Value, EvalError> {
    thread.stack[fr]
        .stack
        .pop()
        .ok_or_else(|| EvalError::internal("operand stack underflow"))
}

fn push(thread: &mut Thread, fr: usize, v: Value) {
    thread.stack[fr].stack.push(v);
}

fn popn(thread: &mut Thread, fr: usize, n: usize) -> Result<Vec<Value>, EvalError> {
    let stack = &mut thread.stack[fr].stack;
    if stack.len() < n {
        return Err(EvalError::internal("operand stack underflow"));
    }
    let at = stack.len() - n;
    Ok(stack.split_off(at))
}

/// Run the topmost frame (a compiled function) to completion.
fn interp(thread: &mut Thread) -> Result<Value, EvalError> {
    let fr = thread.stack.len() - 1;
    let func = match &thread.stack[fr].callable {
        Value::Function(f) => f.clone(),
        _ => return Err(EvalError::internal("interp on a non-function frame")),
    };
    let code: Arc<Funcode> = func.funcode.clone();
    let module = func.module.clone();
    let program = module.program.clone();
    let mut pc: u32 = 0;

    loop {
        profile::maybe_sample(thread);
        let Some(&instr) = code.code.get(pc as usize) else {
            return Err(EvalError::internal("program counter out of range"));
        };
        thread.stack[fr].pc = pc;
        pc += 1;

        match instr {
            Instr::Nop => {}
            Instr::Dup => {
                let v = pop(thread, fr)?;
                push(thread, fr, v.clone());
                push(thread, fr, v);
            }
            Instr::Dup2 => {
                let b = pop(thread, fr)?;
                let a = pop(thread, fr)?;
                push(thread, fr, a.clone());
                push(thread, fr, b.clone());
                push(thread, fr, a);
                push(thread, fr, b);
            }
            Instr::Pop => {
                pop(thread, fr)?;
            }
            Instr::Exch => {
                let b = pop(thread, fr)?;
                let a = pop(thread, fr)?;
                push(thread, fr, b);
                push(thread, fr, a);
            }
            Instr::NoneVal => push(thread, fr, Value::None),
            Instr::TrueVal => push(thread, fr, Value::Bool(true)),
            Instr::FalseVal => push(thread, fr, Value::Bool(false)),
            Instr::Mandatory => push(thread, fr, Value::Mandatory),
            Instr::Not => {
                let v = pop(thread, fr)?;
                push(thread, fr, Value::Bool(!v.truth()));
            }
            Instr::Neg => {
                let v = pop(thread, fr)?;
                push(thread, fr, ops::unary(crate::ast::UnaryOp::Minus, &v)?);
            }
            Instr::Pos => {
                let v = pop(thread, fr)?;
                push(thread, fr, ops::unary(crate::ast::UnaryOp::Plus, &v)?);
            }
            Instr::Invert => {
                let v = pop(thread, fr)?;
                push(thread, fr, ops::unary(crate::ast::UnaryOp::Invert, &v)?);
            }
            Instr::Eq
            | Instr::Ne
            | Instr::Lt
            | Instr::Le
            | Instr::Gt
            | Instr::Ge
            | Instr::Add
            | Instr::Sub
            | Instr::Mul
            | Instr::Div
            | Instr::FloorDiv
            | Instr::Mod
            | Instr::Pipe
            | Instr::Amp
            | Instr::Caret
            | Instr::Shl
            | Instr::Shr
            | Instr::InOp => {
                let y = pop(thread, fr)?;
                let x = pop(thread, fr)?;
                let op = match instr {
                    Instr::Eq => BinOp::Eq,
                    Instr::Ne => BinOp::Ne,
                    Instr::Lt => BinOp::Lt,
                    Instr::Le => BinOp::Le,
                    Instr::Gt => BinOp::Gt,
                    Instr::Ge => BinOp::Ge,
                    Instr::Add => BinOp::Add,
                    Instr::Sub => BinOp::Sub,
                    Instr::Mul => BinOp::Mul,
                    Instr::Div => BinOp::Div,
                    Instr::FloorDiv => BinOp::FloorDiv,
                    Instr::Mod => BinOp::Mod,
                    Instr::Pipe => BinOp::Pipe,
                    Instr::Amp => BinOp::Amp,
                    Instr::Caret => BinOp::Caret,
                    Instr::Shl => BinOp::Shl,
                    Instr::Shr => BinOp::Shr,
                    _ => BinOp::In,
                };
                push(thread, fr, ops::binary(op, &x, &y)?);
            }
            Instr::InplaceAdd => {
                let y = pop(thread, fr)?;
                let x = pop(thread, fr)?;
                let mut done = false;
                if let Value::List(l) = &x {
                    if let Ok(it) = y.iterate() {
                        let items: Vec<Value> = it.collect();
                        l.extend_with(items)?;
                        done = true;
                    }
                }
                if done {
                    push(thread, fr, x);
                } else {
                    push(thread, fr, ops::binary(BinOp::Add, &x, &y)?);
                }
            }
            Instr::Index => {
                let i = pop(thread, fr)?;
                let x = pop(thread, fr)?;
                push(thread, fr, ops::index(&x, &i)?);
            }
            Instr::SetIndex => {
                let v = pop(thread, fr)?;
                let i = pop(thread, fr)?;
                let x = pop(thread, fr)?;
                ops::set_index(&x, &i, v)?;
            }
            Instr::Slice => {
                let step = pop(thread, fr)?;
                let hi = pop(thread, fr)?;
                let lo = pop(thread, fr)?;
                let x = pop(thread, fr)?;
                push(thread, fr, ops::slice(&x, &lo, &hi, &step)?);
            }
            Instr::Append => {
                let v = pop(thread, fr)?;
                let l = pop(thread, fr)?;
                match &l {
                    Value::List(list) => list.append(v)?,
                    _ => return Err(EvalError::internal("append target is not a list")),
                }
                push(thread, fr, l);
            }
            Instr::SetDict => {
                let v = pop(thread, fr)?;
                let k = pop(thread, fr)?;
                let d = pop(thread, fr)?;
                match &d {
                    Value::Dict(dict) => dict.insert(&k, v)?,
                    _ => return Err(EvalError::internal("dict target is not a dict")),
                }
                push(thread, fr, d);
            }
            Instr::SetDictUniq => {
                let v = pop(thread, fr)?;
                let k = pop(thread, fr)?;
                let d = pop(thread, fr)?;
                match &d {
                    Value::Dict(dict) => {
                        if dict.contains(&k)? {
                            return Err(EvalError::value(format!(
                                "duplicate key: {}",
                                k.repr()
                            )));
                        }
                        dict.insert(&k, v)?;
                    }
                    _ => return Err(EvalError::internal("dict target is not a dict")),
                }
                push(thread, fr, d);
            }
            Instr::MakeDict => push(thread, fr, Value::new_dict()),
            Instr::MakeTuple(n) => {
                let items = popn(thread, fr, n as usize)?;
                push(thread, fr, Value::new_tuple(items));
            }
            Instr::MakeList(n) => {
                let items = popn(thread, fr, n as usize)?;
                push(thread, fr, Value::new_list(items));
            }
            Instr::MakeSet(n) => {
                let items = popn(thread, fr, n as usize)?;
                let set = crate::val::Set::new();
                for v in &items {
                    set.add(v)?;
                }
                push(thread, fr, Value::Set(set));
            }
            Instr::Unpack(n) => {
                let n = n as usize;
                let v = pop(thread, fr)?;
                let it = v.iterate().map_err(|_| {
                    EvalError::typ(format!("got {} in sequence assignment", v.type_name()))
                })?;
                let items: Vec<Value> = it.collect();
                if items.len() > n {
                    return Err(EvalError::value(format!(
                        "too many values to unpack (want {})",
                        n
                    )));
                }
                if items.len() < n {
                    return Err(EvalError::value(format!(
                        "not enough values to unpack (got {}, want {})",
                        items.len(),
                        n
                    )));
                }
                for item in items.into_iter().rev() {
                    push(thread, fr, item);
                }
            }
            Instr::IterPush => {
                let v = pop(thread, fr)?;
                let it = v.iterate()?;
                thread.stack[fr].iters.push(it);
            }
            Instr::IterJmp(t) => {
                let frame = &mut thread.stack[fr];
                let Some(it) = frame.iters.last_mut() else {
                    return Err(EvalError::internal("iterator stack underflow"));
                };
                match it.next() {
                    Some(v) => frame.stack.push(v),
                    None => pc = t,
                }
            }
            Instr::IterPop => {
                thread.stack[fr].iters.pop();
            }
            Instr::Jmp(t) => pc = t,
            Instr::CJmp(t) => {
                let v = pop(thread, fr)?;
                if v.truth() {
                    pc = t;
                }
            }
            Instr::Return => {
                return pop(thread, fr);
            }
            Instr::Constant(i) => {
                let v = program
                    .constants
                    .get(i as usize)
                    .cloned()
                    .ok_or_else(|| EvalError::internal("constant index out of range"))?;
                push(thread, fr, v);
            }
            Instr::Local(i) => {
                let v = thread.stack[fr].locals.get(i as usize).cloned().flatten();
                match v {
                    Some(v) => push(thread, fr, v),
                    None => {
                        return Err(EvalError::other(format!(
                            "local variable {} referenced before assignment",
                            local_name(&code, i)
                        )));
                    }
                }
            }
            Instr::SetLocal(i) => {
                let v = pop(thread, fr)?;
                if let Some(slot) = thread.stack[fr].locals.get_mut(i as usize) {
                    *slot = Some(v);
                }
            }
            Instr::LocalCell(i) => {
                let v = thread.stack[fr].locals.get(i as usize).cloned().flatten();
                match v {
                    Some(Value::Cell(c)) => match c.get() {
                        Some(v) => push(thread, fr, v),
                        None => {
                            return Err(EvalError::other(format!(
                                "local variable {} referenced before assignment",
                                local_name(&code, i)
                            )));
                        }
                    },
                    _ => return Err(EvalError::internal("cell slot does not hold a cell")),
                }
            }
            Instr::SetLocalCell(i) => {
                let v = pop(thread, fr)?;
                let cell = thread.stack[fr].locals.get(i as usize).cloned().flatten();
                match cell {
                    Some(Value::Cell(c)) => c.set(v)?,
                    _ => return Err(EvalError::internal("cell slot does not hold a cell")),
                }
            }
            Instr::Free(i) => {
                let v = func
                    .freevars
                    .get(i as usize)
                    .cloned()
                    .ok_or_else(|| EvalError::internal("freevar index out of range"))?;
                push(thread, fr, v);
            }
            Instr::FreeCell(i) => {
                let cell = func
                    .freevars
                    .get(i as usize)
                    .cloned()
                    .ok_or_else(|| EvalError::internal("freevar index out of range"))?;
                match cell {
                    Value::Cell(c) => match c.get() {
                        Some(v) => push(thread, fr, v),
                        None => {
                            let name = code
                                .freevars
                                .get(i as usize)
                                .map(|n| n.to_string())
                                .unwrap_or_default();
                            return Err(EvalError::other(format!(
                                "local variable {} referenced before assignment",
                                name
                            )));
                        }
                    },
                    _ => return Err(EvalError::internal("freevar is not a cell")),
                }
            }
            Instr::Global(i) => match module.globals.get(i as usize) {
                Some(v) => push(thread, fr, v),
                None => {
                    let name = program
                        .globals
                        .get(i as usize)
                        .map(|n| n.to_string())
                        .unwrap_or_default();
                    return Err(EvalError::other(format!(
                        "global variable {} referenced before assignment",
                        name
                    )));
                }
            },
            Instr::SetGlobal(i) => {
                let v = pop(thread, fr)?;
                module.globals.set(i as usize, v)?;
            }
            Instr::Predeclared(i) => {
                let name = program
                    .names
                    .get(i as usize)
                    .ok_or_else(|| EvalError::internal("name index out of range"))?;
                match module.predeclared.get(name) {
                    Some(v) => push(thread, fr, v.clone()),
                    None => {
                        return Err(EvalError::internal(format!(
                            "predeclared name {} is missing",
                            name
                        )));
                    }
                }
            }
            Instr::Universal(i) => {
                let name = program
                    .names
                    .get(i as usize)
                    .ok_or_else(|| EvalError::internal("name index out of range"))?;
                match crate::builtins::universe().get(name) {
                    Some(v) => push(thread, fr, v.clone()),
                    None => {
                        return Err(EvalError::internal(format!(
                            "universal name {} is missing",
                            name
                        )));
                    }
                }
            }
            Instr::Attr(i) => {
                let x = pop(thread, fr)?;
                let name = program
                    .names
                    .get(i as usize)
                    .ok_or_else(|| EvalError::internal("name index out of range"))?;
                match x.attr(name)? {
                    Some(v) => push(thread, fr, v),
                    None => {
                        return Err(EvalError::attr(format!(
                            "{} has no .{} field or method",
                            x.type_name(),
                            name
                        )));
                    }
                }
            }
            Instr::SetField(i) => {
                let v = pop(thread, fr)?;
                let x = pop(thread, fr)?;
                let name = program
                    .names
                    .get(i as usize)
                    .ok_or_else(|| EvalError::internal("name index out of range"))?;
                x.set_attr(name, &v)?;
            }
            Instr::MakeFunc(i) => {
                let freevars = pop(thread, fr)?;
                let defaults = pop(thread, fr)?;
                let funcode = program
                    .functions
                    .get(i as usize)
                    .cloned()
                    .ok_or_else(|| EvalError::internal("function index out of range"))?;
                let defaults = match defaults {
                    Value::Tuple(t) => t.to_vec(),
                    _ => return Err(EvalError::internal("defaults must be a tuple")),
                };
                let freevars = match freevars {
                    Value::Tuple(t) => t.to_vec(),
                    _ => return Err(EvalError::internal("freevars must be a tuple")),
                };
                push(
                    thread,
                    fr,
                    Value::Function(Arc::new(Function {
                        funcode,
                        module: module.clone(),
                        defaults,
                        freevars,
                    })),
                );
            }
            Instr::Call(arg) | Instr::CallVar(arg) | Instr::CallKw(arg) | Instr::CallVarKw(arg) => {
                let has_starstar = matches!(instr, Instr::CallKw(_) | Instr::CallVarKw(_));
                let has_star = matches!(instr, Instr::CallVar(_) | Instr::CallVarKw(_));
                let (npos, nkw) = call_counts(arg);

                let starstar = if has_starstar {
                    Some(pop(thread, fr)?)
                } else {
                    None
                };
                let star = if has_star { Some(pop(thread, fr)?) } else { None };

                let mut kwargs: Vec<(String, Value)> = Vec::with_capacity(nkw);
                let pairs = popn(thread, fr, nkw * 2)?;
                let mut it = pairs.into_iter();
                while let (Some(k), Some(v)) = (it.next(), it.next()) {
                    match k {
                        Value::Str(s) => kwargs.push((s.to_str_lossy().into_owned(), v)),
                        _ => return Err(EvalError::internal("keyword name is not a string")),
                    }
                }

                let mut args = popn(thread, fr, npos)?;
                let f = pop(thread, fr)?;

                if let Some(splat) = star {
                    let it = splat.iterate().map_err(|_| {
                        EvalError::typ(format!(
                            "argument after * must be iterable, not {}",
                            splat.type_name()
                        ))
                    })?;
                    args.extend(it);
                }
                if let Some(splat) = starstar {
                    match &splat {
                        Value::Dict(d) => {
                            for (k, v) in d.items() {
                                match &k {
                                    Value::Str(s) => {
                                        kwargs.push((s.to_str_lossy().into_owned(), v))
                                    }
                                    _ => {
                                        return Err(EvalError::typ("keywords must be strings"));
                                    }
                                }
                            }
                        }
                        _ => {
                            return Err(EvalError::typ(format!(
                                "argument after ** must be a dict, not {}",
                                splat.type_name()
                            )));
                        }
                    }
                }

                let result = call_value(thread, &f, args, kwargs)?;
                push(thread, fr, result);
            }
            Instr::Load(n) => {
                let module_name = match pop(thread, fr)? {
                    Value::Str(s) => s.to_str_lossy().into_owned(),
                    _ => return Err(EvalError::internal("load module name is not a string")),
                };
                let mut names = Vec::with_capacity(n as usize);
                for v in popn(thread, fr, n as usize)? {
                    match v {
                        Value::Str(s) => names.push(s.to_str_lossy().into_owned()),
                        _ => return Err(EvalError::internal("loaded symbol is not a string")),
                    }
                }
                let Some(loader) = thread.load_hook() else {
                    return Err(EvalError::other("load not implemented by this host"));
                };
                let bindings = loader(thread, &module_name).map_err(|e| {
                    EvalError::other(format!("cannot load {}: {}", module_name, e))
                })?;
                for name in &names {
                    match bindings.get(name) {
                        Some(v) => push(thread, fr, v.clone()),
                        None => {
                            return Err(EvalError::other(format!(
                                "load: name \"{}\" not found in module \"{}\"",
                                name, module_name
                            )));
                        }
                    }
                }
            }
        }
    }
}

fn local_name(code: &Funcode, i: u32) -> String {
    code.locals
        .get(i as usize)
        .map(|(n, _)| n.to_string())
        .unwrap_or_default()
}
