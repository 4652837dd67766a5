//! The bytecode compiler.
//!
//! Lowers a resolved tree to a flat stack-machine instruction stream per
//! function, with shared constant and name tables. Each function records a
//! sorted (pc, line, col) table; lookups return the last entry at or before
//! the pc, which is what drives backtraces.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ast::{
    Arg, BinOp, CompBody, CompClause, Expr, ExprUnit, FileUnit, FuncDef, Param, Stmt, UnaryOp,
};
use crate::resolve::{Binding, FuncInfo, ModuleInfo, ParamInfo, Scope};
use crate::token::Position;
use crate::val::{Str, Value};

mod serial;
#[cfg(test)]
mod compile_test;

pub use serial::{
    decode_program, encode_program, read_program, write_program, FORMAT_VERSION, MAGIC,
};

/// When set, every compiled function is disassembled to stderr.
static DISASSEMBLE: AtomicBool = AtomicBool::new(false);

pub fn set_disassemble(on: bool) {
    DISASSEMBLE.store(on, Ordering::Relaxed);
}

fn disassemble_enabled() -> bool {
    DISASSEMBLE.load(Ordering::Relaxed)
}

/// One instruction of the stack machine. Jump targets are absolute pcs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Nop,
    // Stack manipulation
    Dup,
    Dup2,
    Pop,
    Exch,
    // Immediates
    NoneVal,
    TrueVal,
    FalseVal,
    /// Missing-default sentinel for required keyword-only parameters.
    Mandatory,
    // Unary
    Not,
    Neg,
    Pos,
    Invert,
    // Binary
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pipe,
    Amp,
    Caret,
    Shl,
    Shr,
    InOp,
    /// `x += y`: extends lists in place, otherwise behaves like Add.
    InplaceAdd,
    // Containers
    Index,
    SetIndex,
    Slice,
    Append,
    SetDict,
    SetDictUniq,
    MakeDict,
    MakeTuple(u32),
    MakeList(u32),
    MakeSet(u32),
    Unpack(u32),
    // Iteration
    IterPush,
    IterJmp(u32),
    IterPop,
    // Control flow
    Jmp(u32),
    /// Jump if popped value is truthy.
    CJmp(u32),
    Return,
    // Constants and names
    Constant(u32),
    Local(u32),
    SetLocal(u32),
    LocalCell(u32),
    SetLocalCell(u32),
    /// Push the cell itself (for closure capture), not its content.
    Free(u32),
    /// Push the content of a free-variable cell.
    FreeCell(u32),
    Global(u32),
    SetGlobal(u32),
    Predeclared(u32),
    Universal(u32),
    Attr(u32),
    SetField(u32),
    // Functions and calls
    MakeFunc(u32),
    /// npos in the high 16 bits, nkw pairs in the low 16.
    Call(u32),
    CallVar(u32),
    CallKw(u32),
    CallVarKw(u32),
    /// Load n symbols from a module; stack holds names then module name.
    Load(u32),
}

impl Instr {
    pub fn arg(self) -> Option<u32> {
        match self {
            Instr::MakeTuple(n)
            | Instr::MakeList(n)
            | Instr::MakeSet(n)
            | Instr::Unpack(n)
            | Instr::IterJmp(n)
            | Instr::Jmp(n)
            | Instr::CJmp(n)
            | Instr::Constant(n)
            | Instr::Local(n)
            | Instr::SetLocal(n)
            | Instr::LocalCell(n)
            | Instr::SetLocalCell(n)
            | Instr::Free(n)
            | Instr::FreeCell(n)
            | Instr::Global(n)
            | Instr::SetGlobal(n)
            | Instr::Predeclared(n)
            | Instr::Universal(n)
            | Instr::Attr(n)
            | Instr::SetField(n)
            | Instr::MakeFunc(n)
            | Instr::Call(n)
            | Instr::CallVar(n)
            | Instr::CallKw(n)
            | Instr::CallVarKw(n)
            | Instr::Load(n) => Some(n),
            _ => None,
        }
    }
}

pub fn call_arg(npos: usize, nkw: usize) -> u32 {
    ((npos as u32) << 16) | (nkw as u32 & 0xffff)
}

pub fn call_counts(arg: u32) -> (usize, usize) {
    ((arg >> 16) as usize, (arg & 0xffff) as usize)
}

/// Compiled code for one function.
#[derive(Debug)]
pub struct Funcode {
    pub name: Arc<str>,
    pub doc: String,
    pub pos: Position,
    /// Named parameters in declaration order: positional, then
    /// keyword-only, then the `*args`/`**kwargs` sinks.
    pub params: Vec<ParamInfo>,
    pub num_kwonly: u32,
    pub has_varargs: bool,
    pub has_kwargs: bool,
    pub locals: Vec<(Arc<str>, Position)>,
    /// Local slots materialized as shared cells.
    pub cells: Vec<u32>,
    pub freevars: Vec<Arc<str>>,
    pub code: Vec<Instr>,
    /// Sorted (pc, line, col) triples.
    pub pclinetab: Vec<(u32, u32, u32)>,
}

impl Funcode {
    /// Number of parameters bindable by position.
    pub fn num_positional(&self) -> usize {
        self.params.len()
            - self.num_kwonly as usize
            - usize::from(self.has_varargs)
            - usize::from(self.has_kwargs)
    }

    /// Source position of the instruction at `pc`: the last table entry at
    /// or before it.
    pub fn pos_for_pc(&self, pc: u32) -> Position {
        let mut best = self.pos;
        for &(entry_pc, line, col) in &self.pclinetab {
            if entry_pc > pc {
                break;
            }
            best = Position::new(line, col);
        }
        best
    }

    pub fn disassemble(&self) -> String {
        let mut out = format!("{} (locals={}):\n", self.name, self.locals.len());
        for (pc, instr) in self.code.iter().enumerate() {
            let pos = self.pos_for_pc(pc as u32);
            out.push_str(&format!("  {:4}  {:16?}  ; {}\n", pc, instr, pos));
        }
        out
    }
}

/// The compiled form of one file: shared tables plus per-function code.
#[derive(Debug)]
pub struct ProgramData {
    pub filename: Arc<str>,
    pub names: Vec<Arc<str>>,
    pub constants: Vec<Value>,
    pub functions: Vec<Arc<Funcode>>,
    pub globals: Vec<Arc<str>>,
    pub toplevel: Arc<Funcode>,
}

/// A compiled program; cheap to clone and safe to share once built.
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) data: Arc<ProgramData>,
}

impl Program {
    pub fn filename(&self) -> &str {
        &self.data.filename
    }

    pub fn globals(&self) -> &[Arc<str>] {
        &self.data.globals
    }
}

/// Compile a resolved file.
pub fn compile_file(unit: &FileUnit, module: &ModuleInfo) -> Program {
    let mut comp = Compiler::new(module.globals.iter().map(|(n, _)| n.clone()).collect());
    let toplevel = {
        let mut f = FnCompiler::new(&mut comp, &module.toplevel);
        f.compile_stmts(&unit.stmts);
        f.emit(None, Instr::NoneVal);
        f.emit(None, Instr::Return);
        f.finish(String::new())
    };
    comp.into_program(unit.filename.clone(), toplevel)
}

/// Compile a resolved expression chunk into a program whose toplevel
/// returns the expression's value.
pub fn compile_expr_unit(unit: &ExprUnit, info: &Arc<FuncInfo>) -> Program {
    let mut comp = Compiler::new(Vec::new());
    let toplevel = {
        let mut f = FnCompiler::new(&mut comp, info);
        f.compile_expr(&unit.expr);
        f.emit(None, Instr::Return);
        f.finish(String::new())
    };
    comp.into_program(unit.filename.clone(), toplevel)
}

#[derive(PartialEq, Eq, Hash)]
enum ConstKey {
    None,
    True,
    False,
    Int(String),
    Float(u64),
    Str(Vec<u8>),
    Bytes(Vec<u8>),
}

struct Compiler {
    names: Vec<Arc<str>>,
    name_map: FxHashMap<String, u32>,
    constants: Vec<Value>,
    const_map: FxHashMap<ConstKey, u32>,
    functions: Vec<Arc<Funcode>>,
    globals: Vec<Arc<str>>,
}

impl Compiler {
    fn new(globals: Vec<Arc<str>>) -> Compiler {
        Compiler {
            names: Vec::new(),
            name_map: FxHashMap::default(),
            constants: Vec::new(),
            const_map: FxHashMap::default(),
            functions: Vec::new(),
            globals,
        }
    }

    fn name_index(&mut self, name: &str) -> u32 {
        if let Some(&i) = self.name_map.get(name) {
            return i;
        }
        let i = self.names.len() as u32;
        self.names.push(Arc::<str>::from(name));
        self.name_map.insert(name.to_string(), i);
        i
    }

    fn constant_index(&mut self, v: Value) -> u32 {
        let key = match &v {
            Value::None => ConstKey::None,
            Value::Bool(true) => ConstKey::True,
            Value::Bool(false) => ConstKey::False,
            Value::Int(i) => ConstKey::Int(i.to_string()),
            Value::Float(f) => ConstKey::Float(f.to_bits()),
            Value::Str(s) => ConstKey::Str(s.as_bytes().to_vec()),
            Value::Bytes(b) => ConstKey::Bytes(b.as_bytes().to_vec()),
            _ => {
                // Non-literal constants are never interned.
                let i = self.constants.len() as u32;
                self.constants.push(v);
                return i;
            }
        };
        if let Some(&i) = self.const_map.get(&key) {
            return i;
        }
        let i = self.constants.len() as u32;
        self.constants.push(v);
        self.const_map.insert(key, i);
        i
    }

    fn into_program(self, filename: Arc<str>, toplevel: Funcode) -> Program {
        let toplevel = Arc::new(toplevel);
        if disassemble_enabled() {
            for f in self.functions.iter().chain(std::iter::once(&toplevel)) {
                eprintln!("{}", f.disassemble());
            }
        }
        Program {
            data: Arc::new(ProgramData {
                filename,
                names: self.names,
                constants: self.constants,
                functions: self.functions,
                globals: self.globals,
                toplevel,
            }),
        }
    }
}

struct LoopFrame {
    /// Continue target.
    start: u32,
    /// Break jump sites awaiting a patch.
    breaks: Vec<usize>,
    /// For loops own an active iterator that Return must pop.
    is_for: bool,
}

struct FnCompiler<'a> {
    comp: &'a mut Compiler,
    info: &'a Arc<FuncInfo>,
    code: Vec<Instr>,
    pcline: Vec<(u32, u32, u32)>,
    loops: Vec<LoopFrame>,
}

impl<'a> FnCompiler<'a> {
    fn new(comp: &'a mut Compiler, info: &'a Arc<FuncInfo>) -> FnCompiler<'a> {
        FnCompiler {
            comp,
            info,
            code: Vec::new(),
            pcline: Vec::new(),
            loops: Vec::new(),
        }
    }

    fn pc(&self) -> u32 {
        self.code.len() as u32
    }

    fn emit(&mut self, pos: Option<Position>, instr: Instr) {
        if let Some(p) = pos {
            let record = match self.pcline.last() {
                Some(&(_, line, col)) => line != p.line || col != p.col,
                None => true,
            };
            if record {
                self.pcline.push((self.pc(), p.line, p.col));
            }
        }
        self.code.push(instr);
    }

    /// Emit a forward jump to be patched later; returns the patch site.
    fn emit_patch(&mut self, pos: Option<Position>, make: fn(u32) -> Instr) -> usize {
        let at = self.code.len();
        self.emit(pos, make(u32::MAX));
        at
    }

    fn patch(&mut self, at: usize) {
        let target = self.pc();
        self.code[at] = match self.code[at] {
            Instr::Jmp(_) => Instr::Jmp(target),
            Instr::CJmp(_) => Instr::CJmp(target),
            Instr::IterJmp(_) => Instr::IterJmp(target),
            other => other,
        };
    }

    fn finish(self, doc: String) -> Funcode {
        let info = self.info;
        Funcode {
            name: Arc::<str>::from(info.name.as_str()),
            doc,
            pos: info.pos,
            params: info.params.clone(),
            num_kwonly: info.num_kwonly as u32,
            has_varargs: info.has_varargs,
            has_kwargs: info.has_kwargs,
            locals: info.locals.clone(),
            cells: info.cells.clone(),
            freevars: info.freevars.iter().map(|f| f.name.clone()).collect(),
            code: self.code,
            pclinetab: self.pcline,
        }
    }

    // ---- statements ----

    fn compile_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.compile_stmt(stmt);
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => {
                self.compile_expr(e);
                self.emit(None, Instr::Pop);
            }
            Stmt::Assign {
                pos,
                op: None,
                lhs,
                rhs,
            } => {
                self.compile_expr(rhs);
                self.compile_assign(*pos, lhs);
            }
            Stmt::Assign {
                pos,
                op: Some(op),
                lhs,
                rhs,
            } => self.compile_aug_assign(*pos, *op, lhs, rhs),
            Stmt::Def(def) => {
                self.compile_funcdef(def);
                self.store_binding(def.name_pos, def.name_binding.get());
            }
            Stmt::Return { pos, value } => {
                match value {
                    Some(v) => self.compile_expr(v),
                    None => self.emit(Some(*pos), Instr::NoneVal),
                }
                // Active for-loop iterators are released before leaving.
                let pops = self.loops.iter().filter(|l| l.is_for).count();
                for _ in 0..pops {
                    self.emit(None, Instr::IterPop);
                }
                self.emit(Some(*pos), Instr::Return);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                self.compile_expr(cond);
                let jthen = self.emit_patch(None, Instr::CJmp);
                self.compile_stmts(else_body);
                let jend = self.emit_patch(None, Instr::Jmp);
                self.patch(jthen);
                self.compile_stmts(then_body);
                self.patch(jend);
            }
            Stmt::For {
                pos,
                target,
                iter,
                body,
            } => {
                self.compile_expr(iter);
                self.emit(Some(*pos), Instr::IterPush);
                let start = self.pc();
                let jdone = self.emit_patch(Some(*pos), Instr::IterJmp);
                self.compile_assign(*pos, target);
                self.loops.push(LoopFrame {
                    start,
                    breaks: Vec::new(),
                    is_for: true,
                });
                self.compile_stmts(body);
                self.emit(None, Instr::Jmp(start));
                let frame = self.loops.pop().expect("loop frame");
                self.patch(jdone);
                for b in frame.breaks {
                    self.patch(b);
                }
                self.emit(None, Instr::IterPop);
            }
            Stmt::While { pos, cond, body } => {
                let start = self.pc();
                self.compile_expr(cond);
                let jbody = self.emit_patch(Some(*pos), Instr::CJmp);
                let jend = self.emit_patch(None, Instr::Jmp);
                self.patch(jbody);
                self.loops.push(LoopFrame {
                    start,
                    breaks: Vec::new(),
                    is_for: false,
                });
                self.compile_stmts(body);
                self.emit(None, Instr::Jmp(start));
                let frame = self.loops.pop().expect("loop frame");
                self.patch(jend);
                for b in frame.breaks {
                    self.patch(b);
                }
            }
            Stmt::Break(pos) => {
                // Break out of a for loop lands on its IterPop.
                let at = self.emit_patch(Some(*pos), Instr::Jmp);
                if let Some(frame) = self.loops.last_mut() {
                    frame.breaks.push(at);
                }
            }
            Stmt::Continue(pos) => {
                let start = self.loops.last().map(|l| l.start).unwrap_or(0);
                self.emit(Some(*pos), Instr::Jmp(start));
            }
            Stmt::Pass(_) => {}
            Stmt::Load(load) => {
                for pair in &load.pairs {
                    let idx = self
                        .comp
                        .constant_index(Value::Str(Str::from(pair.orig.as_str())));
                    self.emit(Some(pair.orig_pos), Instr::Constant(idx));
                }
                let midx = self
                    .comp
                    .constant_index(Value::Str(Str::from(load.module.as_str())));
                self.emit(Some(load.module_pos), Instr::Constant(midx));
                self.emit(Some(load.pos), Instr::Load(load.pairs.len() as u32));
                for pair in load.pairs.iter().rev() {
                    self.store_binding(pair.local.pos, pair.local.binding.get());
                }
            }
        }
    }

    /// Store the value on top of the stack into an assignment target.
    fn compile_assign(&mut self, pos: Position, target: &Expr) {
        match target {
            Expr::Ident(id) => self.store_binding(id.pos, id.binding.get()),
            Expr::TupleExpr { items, .. } | Expr::ListExpr { items, .. } => {
                self.emit(Some(pos), Instr::Unpack(items.len() as u32));
                for item in items {
                    self.compile_assign(pos, item);
                }
            }
            Expr::Index {
                pos: ipos,
                x,
                index,
            } => {
                // stack: v -> x v -> x i v -> SetIndex
                self.compile_expr(x);
                self.emit(None, Instr::Exch);
                self.compile_expr(index);
                self.emit(None, Instr::Exch);
                self.emit(Some(*ipos), Instr::SetIndex);
            }
            Expr::Attr { pos: apos, x, name } => {
                // stack: v -> v x -> x v -> SetField
                self.compile_expr(x);
                self.emit(None, Instr::Exch);
                let idx = self.comp.name_index(name);
                self.emit(Some(*apos), Instr::SetField(idx));
            }
            other => {
                // The resolver already rejected this; keep the stack sane.
                let _ = other;
                self.emit(Some(pos), Instr::Pop);
            }
        }
    }

    fn compile_aug_assign(&mut self, pos: Position, op: BinOp, lhs: &Expr, rhs: &Expr) {
        let op_instr = match op {
            BinOp::Add => Instr::InplaceAdd,
            _ => binop_instr(op),
        };
        match lhs {
            Expr::Ident(id) => {
                self.load_binding(id.pos, id.binding.get(), &id.name);
                self.compile_expr(rhs);
                self.emit(Some(pos), op_instr);
                self.store_binding(id.pos, id.binding.get());
            }
            Expr::Index {
                pos: ipos,
                x,
                index,
            } => {
                self.compile_expr(x);
                self.compile_expr(index);
                self.emit(None, Instr::Dup2);
                self.emit(Some(*ipos), Instr::Index);
                self.compile_expr(rhs);
                self.emit(Some(pos), op_instr);
                self.emit(Some(*ipos), Instr::SetIndex);
            }
            Expr::Attr { pos: apos, x, name } => {
                self.compile_expr(x);
                self.emit(None, Instr::Dup);
                let idx = self.comp.name_index(name);
                self.emit(Some(*apos), Instr::Attr(idx));
                self.compile_expr(rhs);
                self.emit(Some(pos), op_instr);
                self.emit(Some(*apos), Instr::SetField(idx));
            }
            _ => {
                // Rejected by the resolver.
                self.compile_expr(rhs);
                self.emit(Some(pos), Instr::Pop);
            }
        }
    }

    fn load_binding(&mut self, pos: Position, binding: Option<Binding>, name: &str) {
        let Some(b) = binding else {
            self.emit(Some(pos), Instr::NoneVal);
            return;
        };
        let instr = match b.scope {
            Scope::Local => Instr::Local(b.index),
            Scope::Cell => Instr::LocalCell(b.index),
            Scope::Free => Instr::FreeCell(b.index),
            Scope::Global => Instr::Global(b.index),
            Scope::Predeclared => Instr::Predeclared(self.comp.name_index(name)),
            Scope::Universal => Instr::Universal(self.comp.name_index(name)),
        };
        self.emit(Some(pos), instr);
    }

    fn store_binding(&mut self, pos: Position, binding: Option<Binding>) {
        let Some(b) = binding else {
            self.emit(Some(pos), Instr::Pop);
            return;
        };
        let instr = match b.scope {
            Scope::Local => Instr::SetLocal(b.index),
            Scope::Cell => Instr::SetLocalCell(b.index),
            Scope::Global => Instr::SetGlobal(b.index),
            // Free/predeclared/universal stores were rejected at resolve.
            _ => Instr::Pop,
        };
        self.emit(Some(pos), instr);
    }

    fn compile_funcdef(&mut self, def: &FuncDef) {
        let info = def
            .info
            .get()
            .cloned()
            .expect("function was not resolved before compilation");

        // Defaults tuple: values for optional positionals and keyword-only
        // parameters in declaration order; a required keyword-only
        // parameter contributes the Mandatory sentinel.
        let mut ndefaults = 0usize;
        let mut seen_star = false;
        for p in &def.params {
            match p {
                Param::Star { .. } => seen_star = true,
                Param::Normal { default, .. } => match default {
                    Some(d) => {
                        self.compile_expr(d);
                        ndefaults += 1;
                    }
                    None if seen_star => {
                        self.emit(None, Instr::Mandatory);
                        ndefaults += 1;
                    }
                    None => {}
                },
                Param::StarStar { .. } => {}
            }
        }
        self.emit(None, Instr::MakeTuple(ndefaults as u32));

        // Freevar cells tuple.
        for fv in &info.freevars {
            match fv.parent.scope {
                Scope::Cell => self.emit(None, Instr::Local(fv.parent.index)),
                Scope::Free => self.emit(None, Instr::Free(fv.parent.index)),
                _ => self.emit(None, Instr::NoneVal),
            }
        }
        self.emit(None, Instr::MakeTuple(info.freevars.len() as u32));

        // Compile the body into the function table.
        let mut doc = String::new();
        let mut body: &[Stmt] = &def.body;
        if let Some(Stmt::Expr(Expr::StrLit { value, .. })) = body.first() {
            doc = String::from_utf8_lossy(value).into_owned();
            body = &body[1..];
        }
        let funcode = {
            let mut f = FnCompiler::new(self.comp, &info);
            f.compile_stmts(body);
            f.emit(None, Instr::NoneVal);
            f.emit(None, Instr::Return);
            f.finish(doc)
        };
        let idx = self.comp.functions.len() as u32;
        self.comp.functions.push(Arc::new(funcode));
        self.emit(Some(def.pos), Instr::MakeFunc(idx));
    }

    // ---- expressions ----

    fn compile_expr(&mut self, e: &Expr) {
        match e {
            Expr::NoneLit(pos) => self.emit(Some(*pos), Instr::NoneVal),
            Expr::TrueLit(pos) => self.emit(Some(*pos), Instr::TrueVal),
            Expr::FalseLit(pos) => self.emit(Some(*pos), Instr::FalseVal),
            Expr::IntLit { pos, value } => {
                let idx = self.comp.constant_index(Value::Int(value.clone()));
                self.emit(Some(*pos), Instr::Constant(idx));
            }
            Expr::FloatLit { pos, value } => {
                let idx = self.comp.constant_index(Value::Float(*value));
                self.emit(Some(*pos), Instr::Constant(idx));
            }
            Expr::StrLit { pos, value } => {
                let idx = self
                    .comp
                    .constant_index(Value::Str(Str::from_bytes(value.clone())));
                self.emit(Some(*pos), Instr::Constant(idx));
            }
            Expr::BytesLit { pos, value } => {
                let idx = self.comp.constant_index(Value::bytes(value.clone()));
                self.emit(Some(*pos), Instr::Constant(idx));
            }
            Expr::Ident(id) => self.load_binding(id.pos, id.binding.get(), &id.name),
            Expr::Unary { pos, op, x } => {
                self.compile_expr(x);
                let instr = match op {
                    UnaryOp::Not => Instr::Not,
                    UnaryOp::Minus => Instr::Neg,
                    UnaryOp::Plus => Instr::Pos,
                    UnaryOp::Invert => Instr::Invert,
                };
                self.emit(Some(*pos), instr);
            }
            Expr::Binary { pos, op, x, y } => match op {
                BinOp::Or => {
                    self.compile_expr(x);
                    self.emit(None, Instr::Dup);
                    let jend = self.emit_patch(Some(*pos), Instr::CJmp);
                    self.emit(None, Instr::Pop);
                    self.compile_expr(y);
                    self.patch(jend);
                }
                BinOp::And => {
                    self.compile_expr(x);
                    self.emit(None, Instr::Dup);
                    let jy = self.emit_patch(Some(*pos), Instr::CJmp);
                    let jend = self.emit_patch(None, Instr::Jmp);
                    self.patch(jy);
                    self.emit(None, Instr::Pop);
                    self.compile_expr(y);
                    self.patch(jend);
                }
                BinOp::NotIn => {
                    self.compile_expr(x);
                    self.compile_expr(y);
                    self.emit(Some(*pos), Instr::InOp);
                    self.emit(Some(*pos), Instr::Not);
                }
                _ => {
                    self.compile_expr(x);
                    self.compile_expr(y);
                    self.emit(Some(*pos), binop_instr(*op));
                }
            },
            Expr::Cond {
                pos,
                cond,
                then,
                els,
            } => {
                self.compile_expr(cond);
                let jthen = self.emit_patch(Some(*pos), Instr::CJmp);
                self.compile_expr(els);
                let jend = self.emit_patch(None, Instr::Jmp);
                self.patch(jthen);
                self.compile_expr(then);
                self.patch(jend);
            }
            Expr::TupleExpr { pos, items } => {
                for item in items {
                    self.compile_expr(item);
                }
                self.emit(Some(*pos), Instr::MakeTuple(items.len() as u32));
            }
            Expr::ListExpr { pos, items } => {
                for item in items {
                    self.compile_expr(item);
                }
                self.emit(Some(*pos), Instr::MakeList(items.len() as u32));
            }
            Expr::SetExpr { pos, items } => {
                for item in items {
                    self.compile_expr(item);
                }
                self.emit(Some(*pos), Instr::MakeSet(items.len() as u32));
            }
            Expr::DictExpr { pos, items } => {
                self.emit(Some(*pos), Instr::MakeDict);
                for (k, v) in items {
                    self.compile_expr(k);
                    self.compile_expr(v);
                    self.emit(Some(k.pos()), Instr::SetDictUniq);
                }
            }
            Expr::Index { pos, x, index } => {
                self.compile_expr(x);
                self.compile_expr(index);
                self.emit(Some(*pos), Instr::Index);
            }
            Expr::SliceExpr {
                pos,
                x,
                lo,
                hi,
                step,
            } => {
                self.compile_expr(x);
                for part in [lo, hi, step] {
                    match part {
                        Some(p) => self.compile_expr(p),
                        None => self.emit(None, Instr::NoneVal),
                    }
                }
                self.emit(Some(*pos), Instr::Slice);
            }
            Expr::Attr { pos, x, name } => {
                self.compile_expr(x);
                let idx = self.comp.name_index(name);
                self.emit(Some(*pos), Instr::Attr(idx));
            }
            Expr::Call { pos, f, args } => self.compile_call(*pos, f, args),
            Expr::Lambda(def) => self.compile_funcdef(def),
            Expr::Comp(comp) => self.compile_comprehension(comp),
        }
    }

    fn compile_call(&mut self, pos: Position, f: &Expr, args: &[Arg]) {
        self.compile_expr(f);
        let mut npos = 0usize;
        let mut nkw = 0usize;
        let mut star: Option<&Expr> = None;
        let mut starstar: Option<&Expr> = None;
        for arg in args {
            if let Arg::Pos(v) = arg {
                self.compile_expr(v);
                npos += 1;
            }
        }
        for arg in args {
            if let Arg::Named { name, pos, value } = arg {
                let idx = self
                    .comp
                    .constant_index(Value::Str(Str::from(name.as_str())));
                self.emit(Some(*pos), Instr::Constant(idx));
                self.compile_expr(value);
                nkw += 1;
            }
        }
        for arg in args {
            match arg {
                Arg::Star { value, .. } => star = Some(value),
                Arg::StarStar { value, .. } => starstar = Some(value),
                _ => {}
            }
        }
        if let Some(v) = star {
            self.compile_expr(v);
        }
        if let Some(v) = starstar {
            self.compile_expr(v);
        }
        let arg = call_arg(npos, nkw);
        let instr = match (star.is_some(), starstar.is_some()) {
            (false, false) => Instr::Call(arg),
            (true, false) => Instr::CallVar(arg),
            (false, true) => Instr::CallKw(arg),
            (true, true) => Instr::CallVarKw(arg),
        };
        self.emit(Some(pos), instr);
    }

    fn compile_comprehension(&mut self, comp: &crate::ast::Comprehension) {
        match &comp.body {
            CompBody::Value(_) => self.emit(Some(comp.pos), Instr::MakeList(0)),
            CompBody::KeyValue(_, _) => self.emit(Some(comp.pos), Instr::MakeDict),
        }
        self.compile_comp_clause(comp, 0, None);
    }

    fn compile_comp_clause(
        &mut self,
        comp: &crate::ast::Comprehension,
        i: usize,
        innermost_loop: Option<u32>,
    ) {
        if i == comp.clauses.len() {
            match &comp.body {
                CompBody::Value(v) => {
                    self.compile_expr(v);
                    self.emit(Some(v.pos()), Instr::Append);
                }
                CompBody::KeyValue(k, v) => {
                    self.compile_expr(k);
                    self.compile_expr(v);
                    self.emit(Some(k.pos()), Instr::SetDict);
                }
            }
            return;
        }
        match &comp.clauses[i] {
            CompClause::For { pos, target, iter } => {
                self.compile_expr(iter);
                self.emit(Some(*pos), Instr::IterPush);
                let start = self.pc();
                let jdone = self.emit_patch(Some(*pos), Instr::IterJmp);
                self.compile_assign(*pos, target);
                self.compile_comp_clause(comp, i + 1, Some(start));
                self.emit(None, Instr::Jmp(start));
                self.patch(jdone);
                self.emit(None, Instr::IterPop);
            }
            CompClause::If { pos, cond } => {
                self.compile_expr(cond);
                let jok = self.emit_patch(Some(*pos), Instr::CJmp);
                let target = innermost_loop.unwrap_or(0);
                self.emit(None, Instr::Jmp(target));
                self.patch(jok);
                self.compile_comp_clause(comp, i + 1, innermost_loop);
            }
        }
    }
}

fn binop_instr(op: BinOp) -> Instr {
    match op {
        BinOp::Eq => Instr::Eq,
        BinOp::Ne => Instr::Ne,
        BinOp::Lt => Instr::Lt,
        BinOp::Le => Instr::Le,
        BinOp::Gt => Instr::Gt,
        BinOp::Ge => Instr::Ge,
        BinOp::Add => Instr::Add,
        BinOp::Sub => Instr::Sub,
        BinOp::Mul => Instr::Mul,
        BinOp::Div => Instr::Div,
        BinOp::FloorDiv => Instr::FloorDiv,
        BinOp::Mod => Instr::Mod,
        BinOp::Pipe => Instr::Pipe,
        BinOp::Amp => Instr::Amp,
        BinOp::Caret => Instr::Caret,
        BinOp::Shl => Instr::Shl,
        BinOp::Shr => Instr::Shr,
        BinOp::In => Instr::InOp,
        BinOp::NotIn | BinOp::And | BinOp::Or => Instr::Nop,
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
