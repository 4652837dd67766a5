//! Name resolution.
//!
//! Walks the syntax tree once per function: bindings are collected first
//! (assignments bind, wherever they appear in the block), then each
//! identifier use is classified into exactly one scope: function-local,
//! cell, free variable, module-global, predeclared, or universal. Dialect
//! gates are enforced here, before anything executes.

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{
    Arg, BinOp, CompBody, CompClause, Expr, ExprUnit, FileUnit, FuncDef, Param, Stmt,
};
use crate::error::{ResolveError, ResolveErrorItem};
use crate::token::Position;

#[cfg(test)]
mod resolve_test;

/// Dialect options consulted at resolve time. Copied at the start of each
/// resolve, so concurrent mutation of the process default cannot tear one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub allow_float: bool,
    pub allow_set: bool,
    pub allow_lambda: bool,
    pub allow_nested_def: bool,
    pub allow_recursion: bool,
    pub allow_global_reassign: bool,
    pub load_binds_globally: bool,
}

static DEFAULT_OPTIONS: Lazy<RwLock<Options>> = Lazy::new(|| RwLock::new(Options::default()));

/// The process-wide default options.
pub fn default_options() -> Options {
    *DEFAULT_OPTIONS.read().unwrap_or_else(|e| e.into_inner())
}

/// Replace the process-wide default. Must not race an in-flight resolve
/// that relies on the defaults; configure before resolution begins.
pub fn set_default_options(opts: Options) {
    *DEFAULT_OPTIONS.write().unwrap_or_else(|e| e.into_inner()) = opts;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Function-local slot.
    Local,
    /// Function-local slot holding a shared cell.
    Cell,
    /// Captured from an enclosing function; index into the freevar list.
    Free,
    /// Module global slot.
    Global,
    /// Host-predeclared name.
    Predeclared,
    /// Language universal.
    Universal,
}

#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub scope: Scope,
    pub index: u32,
}

/// A free variable of a function, with the binding that locates its cell in
/// the immediately enclosing function.
#[derive(Debug, Clone)]
pub struct FreeVar {
    pub name: Arc<str>,
    pub parent: Binding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Normal,
    KwOnly,
    VarArgs,
    KwArgs,
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: Arc<str>,
    pub pos: Position,
    pub kind: ParamKind,
    pub has_default: bool,
}

/// Resolver output for one function: its parameter shape, local slots,
/// which of those are cells, and its free-variable capture plan.
#[derive(Debug)]
pub struct FuncInfo {
    pub name: String,
    pub pos: Position,
    pub params: Vec<ParamInfo>,
    pub num_kwonly: usize,
    pub has_varargs: bool,
    pub has_kwargs: bool,
    pub locals: Vec<(Arc<str>, Position)>,
    pub cells: Vec<u32>,
    pub freevars: Vec<FreeVar>,
}

/// Resolver output for a file: global slot order plus the toplevel
/// pseudo-function.
#[derive(Debug)]
pub struct ModuleInfo {
    pub globals: Vec<(Arc<str>, Position)>,
    pub toplevel: Arc<FuncInfo>,
}

/// Resolve a parsed file. Idempotent: a resolved tree is returned as-is.
pub fn resolve_file(
    unit: &FileUnit,
    options: &Options,
    is_predeclared: &dyn Fn(&str) -> bool,
) -> Result<Arc<ModuleInfo>, ResolveError> {
    if unit.resolved.get() {
        if let Some(info) = unit.module.get() {
            return Ok(info.clone());
        }
    }
    let mut r = Resolver::new(*options, is_predeclared);
    let info = r.resolve_module(&unit.stmts);
    if !r.errors.is_empty() {
        return Err(ResolveError {
            filename: unit.filename.clone(),
            errors: r.errors,
        });
    }
    let info = Arc::new(info);
    let _ = unit.module.set(info.clone());
    unit.resolved.set(true);
    Ok(info)
}

/// Resolve an expression chunk for `eval`; the environment acts as the
/// predeclared set and there are no globals.
pub fn resolve_expr_unit(
    unit: &ExprUnit,
    options: &Options,
    is_predeclared: &dyn Fn(&str) -> bool,
) -> Result<Arc<FuncInfo>, ResolveError> {
    if unit.resolved.get() {
        if let Some(info) = unit.toplevel.get() {
            return Ok(info.clone());
        }
    }
    let mut r = Resolver::new(*options, is_predeclared);
    r.push_scope(FuncScope::module());
    // Comprehension variables may still bind locals in the chunk.
    r.collect_expr(&unit.expr);
    r.resolve_expr(&unit.expr);
    let scope = r.pop_scope();
    let info = Arc::new(scope.into_funcinfo(
        "<expr>".to_string(),
        unit.expr.pos(),
        Vec::new(),
        0,
        false,
        false,
    ));
    if !r.errors.is_empty() {
        return Err(ResolveError {
            filename: unit.filename.clone(),
            errors: r.errors,
        });
    }
    let _ = unit.toplevel.set(info.clone());
    unit.resolved.set(true);
    Ok(info)
}

struct FuncScope {
    is_module: bool,
    locals: FxHashMap<String, u32>,
    local_list: Vec<(Arc<str>, Position)>,
    /// Local indices that must be materialized as cells.
    cell_names: FxHashSet<String>,
    cells: Vec<u32>,
    freevars: Vec<FreeVar>,
    freevar_map: FxHashMap<String, u32>,
    /// Module-level bindings (globals) when `is_module`.
    globals: FxHashMap<String, u32>,
    global_list: Vec<(Arc<str>, Position)>,
    global_pos: FxHashMap<String, Position>,
    in_loop: u32,
}

impl FuncScope {
    fn function() -> FuncScope {
        FuncScope {
            is_module: false,
            locals: FxHashMap::default(),
            local_list: Vec::new(),
            cell_names: FxHashSet::default(),
            cells: Vec::new(),
            freevars: Vec::new(),
            freevar_map: FxHashMap::default(),
            globals: FxHashMap::default(),
            global_list: Vec::new(),
            global_pos: FxHashMap::default(),
            in_loop: 0,
        }
    }

    fn module() -> FuncScope {
        let mut s = FuncScope::function();
        s.is_module = true;
        s
    }

    fn define_local(&mut self, name: &str, pos: Position) -> u32 {
        if let Some(i) = self.locals.get(name) {
            return *i;
        }
        let i = self.local_list.len() as u32;
        self.locals.insert(name.to_string(), i);
        self.local_list.push((Arc::<str>::from(name), pos));
        i
    }

    fn define_global(&mut self, name: &str, pos: Position) -> u32 {
        if let Some(i) = self.globals.get(name) {
            return *i;
        }
        let i = self.global_list.len() as u32;
        self.globals.insert(name.to_string(), i);
        self.global_list.push((Arc::<str>::from(name), pos));
        self.global_pos.insert(name.to_string(), pos);
        i
    }

    fn local_binding(&self, index: u32, name: &str) -> Binding {
        if self.cell_names.contains(name) {
            Binding {
                scope: Scope::Cell,
                index,
            }
        } else {
            Binding {
                scope: Scope::Local,
                index,
            }
        }
    }

    fn into_funcinfo(
        mut self,
        name: String,
        pos: Position,
        params: Vec<ParamInfo>,
        num_kwonly: usize,
        has_varargs: bool,
        has_kwargs: bool,
    ) -> FuncInfo {
        // Cell indices, in slot order.
        let mut cells: Vec<u32> = self
            .local_list
            .iter()
            .enumerate()
            .filter(|(_, (n, _))| self.cell_names.contains(n.as_ref()))
            .map(|(i, _)| i as u32)
            .collect();
        cells.sort_unstable();
        self.cells = cells;
        FuncInfo {
            name,
            pos,
            params,
            num_kwonly,
            has_varargs,
            has_kwargs,
            locals: self.local_list,
            cells: self.cells,
            freevars: self.freevars,
        }
    }
}

struct Resolver<'a> {
    options: Options,
    is_predeclared: &'a dyn Fn(&str) -> bool,
    stack: Vec<FuncScope>,
    errors: Vec<ResolveErrorItem>,
}

impl<'a> Resolver<'a> {
    fn new(options: Options, is_predeclared: &'a dyn Fn(&str) -> bool) -> Self {
        Resolver {
            options,
            is_predeclared,
            stack: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn push_scope(&mut self, s: FuncScope) {
        self.stack.push(s);
    }

    fn pop_scope(&mut self) -> FuncScope {
        self.stack.pop().expect("scope stack underflow")
    }

    fn top(&mut self) -> &mut FuncScope {
        self.stack.last_mut().expect("scope stack is empty")
    }

    fn err(&mut self, pos: Position, msg: impl Into<String>) {
        self.errors.push(ResolveErrorItem {
            pos,
            msg: msg.into(),
        });
    }

    fn in_function(&self) -> bool {
        self.stack.len() > 1 || !self.stack[0].is_module
    }

    // ---- module entry ----

    fn resolve_module(&mut self, stmts: &[Stmt]) -> ModuleInfo {
        self.push_scope(FuncScope::module());
        for stmt in stmts {
            self.collect_stmt(stmt, true);
        }
        let mut captured: FxHashSet<String> = FxHashSet::default();
        for stmt in stmts {
            free_names_stmt(stmt, &mut captured);
        }
        {
            let top = self.top();
            for name in &captured {
                if top.locals.contains_key(name) {
                    top.cell_names.insert(name.clone());
                }
            }
        }
        for stmt in stmts {
            self.resolve_stmt(stmt, true);
        }
        let scope = self.pop_scope();
        let globals = scope.global_list.clone();
        let toplevel = Arc::new(scope.into_funcinfo(
            "<toplevel>".to_string(),
            Position::new(1, 1),
            Vec::new(),
            0,
            false,
            false,
        ));
        ModuleInfo { globals, toplevel }
    }

    // ---- binding collection ----

    /// Register every name a statement binds, without resolving uses.
    fn collect_stmt(&mut self, stmt: &Stmt, at_top: bool) {
        match stmt {
            Stmt::Assign { lhs, rhs, .. } => {
                // Augmented assignment binds the name too; at top level it
                // counts as a reassignment of the global.
                self.collect_target(lhs, at_top);
                self.collect_expr(lhs);
                self.collect_expr(rhs);
            }
            Stmt::Def(def) => {
                self.bind_name(&def.name, def.name_pos, at_top);
            }
            Stmt::Expr(e) => self.collect_expr(e),
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                self.collect_expr(cond);
                for s in then_body {
                    self.collect_stmt(s, at_top);
                }
                for s in else_body {
                    self.collect_stmt(s, at_top);
                }
            }
            Stmt::For {
                target, iter, body, ..
            } => {
                self.collect_target(target, at_top);
                self.collect_expr(iter);
                for s in body {
                    self.collect_stmt(s, at_top);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.collect_expr(cond);
                for s in body {
                    self.collect_stmt(s, at_top);
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(v) = value {
                    self.collect_expr(v);
                }
            }
            Stmt::Load(load) => {
                let globally = self.options.load_binds_globally;
                for pair in &load.pairs {
                    if globally && at_top {
                        self.check_global_rebind(&pair.local.name, pair.local.pos);
                        self.top().define_global(&pair.local.name, pair.local.pos);
                    } else {
                        if at_top && self.top().globals.contains_key(&pair.local.name) {
                            self.err(
                                pair.local.pos,
                                format!("cannot reassign global {}", pair.local.name),
                            );
                        }
                        self.top().define_local(&pair.local.name, pair.local.pos);
                    }
                }
            }
            Stmt::Break(_) | Stmt::Continue(_) | Stmt::Pass(_) => {}
        }
    }

    /// Names bound by an assignment or loop target.
    fn collect_target(&mut self, target: &Expr, at_top: bool) {
        match target {
            Expr::Ident(id) => self.bind_name(&id.name, id.pos, at_top),
            Expr::TupleExpr { items, .. } | Expr::ListExpr { items, .. } => {
                for item in items {
                    self.collect_target(item, at_top);
                }
            }
            // Index/attribute targets mutate existing values.
            _ => {}
        }
    }

    fn bind_name(&mut self, name: &str, pos: Position, at_top: bool) {
        if at_top && self.top().is_module {
            if self.top().locals.contains_key(name) {
                self.err(pos, format!("cannot reassign local {}", name));
                return;
            }
            self.check_global_rebind(name, pos);
            self.top().define_global(name, pos);
        } else {
            self.top().define_local(name, pos);
        }
    }

    fn check_global_rebind(&mut self, name: &str, pos: Position) {
        if self.options.allow_global_reassign {
            return;
        }
        let prev = self.top().global_pos.get(name).copied();
        if let Some(prev) = prev {
            self.err(
                pos,
                format!(
                    "cannot reassign global {} declared at {} (requires the allow_global_reassign dialect option)",
                    name, prev
                ),
            );
        }
    }

    /// Comprehension targets bind local slots even at the top level.
    fn collect_expr(&mut self, e: &Expr) {
        match e {
            Expr::Comp(comp) => {
                for clause in &comp.clauses {
                    if let CompClause::For { target, iter, .. } = clause {
                        self.collect_comp_target(target);
                        self.collect_expr(iter);
                    }
                }
                match &comp.body {
                    CompBody::Value(v) => self.collect_expr(v),
                    CompBody::KeyValue(k, v) => {
                        self.collect_expr(k);
                        self.collect_expr(v);
                    }
                }
            }
            Expr::Unary { x, .. } => self.collect_expr(x),
            Expr::Binary { x, y, .. } => {
                self.collect_expr(x);
                self.collect_expr(y);
            }
            Expr::Cond {
                cond, then, els, ..
            } => {
                self.collect_expr(cond);
                self.collect_expr(then);
                self.collect_expr(els);
            }
            Expr::TupleExpr { items, .. }
            | Expr::ListExpr { items, .. }
            | Expr::SetExpr { items, .. } => {
                for item in items {
                    self.collect_expr(item);
                }
            }
            Expr::DictExpr { items, .. } => {
                for (k, v) in items {
                    self.collect_expr(k);
                    self.collect_expr(v);
                }
            }
            Expr::Index { x, index, .. } => {
                self.collect_expr(x);
                self.collect_expr(index);
            }
            Expr::SliceExpr {
                x, lo, hi, step, ..
            } => {
                self.collect_expr(x);
                for part in [lo, hi, step].into_iter().flatten() {
                    self.collect_expr(part);
                }
            }
            Expr::Attr { x, .. } => self.collect_expr(x),
            Expr::Call { f, args, .. } => {
                self.collect_expr(f);
                for arg in args {
                    match arg {
                        Arg::Pos(v)
                        | Arg::Named { value: v, .. }
                        | Arg::Star { value: v, .. }
                        | Arg::StarStar { value: v, .. } => self.collect_expr(v),
                    }
                }
            }
            // Nested function bodies collect their own bindings later.
            Expr::Lambda(_) => {}
            _ => {}
        }
    }

    fn collect_comp_target(&mut self, target: &Expr) {
        match target {
            Expr::Ident(id) => {
                let name = id.name.clone();
                let pos = id.pos;
                self.top().define_local(&name, pos);
            }
            Expr::TupleExpr { items, .. } | Expr::ListExpr { items, .. } => {
                for item in items {
                    self.collect_comp_target(item);
                }
            }
            _ => {}
        }
    }

    // ---- resolution ----

    fn resolve_stmt(&mut self, stmt: &Stmt, at_top: bool) {
        match stmt {
            Stmt::Assign { pos, op, lhs, rhs } => {
                self.resolve_expr(rhs);
                if op.is_some() {
                    self.check_aug_target(lhs);
                    if let Expr::Ident(id) = lhs {
                        self.resolve_ident_write(&id.name, id.pos);
                    }
                    self.resolve_expr(lhs);
                } else {
                    self.resolve_target(lhs);
                }
                if *op == Some(BinOp::Div) && !self.options.allow_float {
                    self.err(*pos, "the / operator requires the allow_float dialect option");
                }
            }
            Stmt::Def(def) => {
                if self.in_function() && !self.options.allow_nested_def {
                    self.err(
                        def.pos,
                        "nested def statements require the allow_nested_def dialect option",
                    );
                }
                self.resolve_ident_write(&def.name, def.name_pos);
                def.name_binding.set(self.lookup(&def.name).ok());
                self.resolve_funcdef(def);
            }
            Stmt::Expr(e) => self.resolve_expr(e),
            Stmt::If {
                pos,
                cond,
                then_body,
                else_body,
            } => {
                if at_top && !self.options.allow_global_reassign {
                    self.err(
                        *pos,
                        "if statements at top level require the allow_global_reassign dialect option",
                    );
                }
                self.resolve_expr(cond);
                for s in then_body {
                    self.resolve_stmt(s, at_top);
                }
                for s in else_body {
                    self.resolve_stmt(s, at_top);
                }
            }
            Stmt::For {
                pos,
                target,
                iter,
                body,
            } => {
                if at_top && !self.options.allow_global_reassign {
                    self.err(
                        *pos,
                        "for loops at top level require the allow_global_reassign dialect option",
                    );
                }
                self.resolve_expr(iter);
                self.resolve_target(target);
                self.top().in_loop += 1;
                for s in body {
                    self.resolve_stmt(s, at_top);
                }
                self.top().in_loop -= 1;
            }
            Stmt::While { pos, cond, body } => {
                if !self.options.allow_recursion {
                    self.err(*pos, "while loops require the allow_recursion dialect option");
                } else if at_top && !self.options.allow_global_reassign {
                    self.err(
                        *pos,
                        "while loops at top level require the allow_global_reassign dialect option",
                    );
                }
                self.resolve_expr(cond);
                self.top().in_loop += 1;
                for s in body {
                    self.resolve_stmt(s, at_top);
                }
                self.top().in_loop -= 1;
            }
            Stmt::Return { pos, value } => {
                if !self.in_function() {
                    self.err(*pos, "return statement not within a function");
                }
                if let Some(v) = value {
                    self.resolve_expr(v);
                }
            }
            Stmt::Break(pos) => {
                if self.top().in_loop == 0 {
                    self.err(*pos, "break not in a loop");
                }
            }
            Stmt::Continue(pos) => {
                if self.top().in_loop == 0 {
                    self.err(*pos, "continue not in a loop");
                }
            }
            Stmt::Pass(_) => {}
            Stmt::Load(load) => {
                if !at_top {
                    self.err(load.pos, "load statement must appear at the top level");
                    return;
                }
                let mut seen: FxHashSet<&str> = FxHashSet::default();
                for pair in &load.pairs {
                    if !seen.insert(pair.local.name.as_str()) {
                        self.err(
                            pair.local.pos,
                            format!("load: symbol {} bound twice", pair.local.name),
                        );
                    }
                    self.resolve_ident_write(&pair.local.name, pair.local.pos);
                    pair.local.binding.set(self.lookup(&pair.local.name).ok());
                }
            }
        }
    }

    fn check_aug_target(&mut self, lhs: &Expr) {
        if matches!(lhs, Expr::TupleExpr { .. } | Expr::ListExpr { .. }) {
            self.err(lhs.pos(), "cannot use augmented assignment on a tuple or list");
        }
    }

    /// Resolve an assignment target, annotating bound identifiers.
    fn resolve_target(&mut self, target: &Expr) {
        match target {
            Expr::Ident(id) => {
                self.resolve_ident_write(&id.name, id.pos);
                id.binding.set(self.lookup(&id.name).ok());
            }
            Expr::TupleExpr { items, .. } | Expr::ListExpr { items, .. } => {
                for item in items {
                    self.resolve_target(item);
                }
            }
            Expr::Index { x, index, .. } => {
                self.resolve_expr(x);
                self.resolve_expr(index);
            }
            Expr::Attr { x, .. } => self.resolve_expr(x),
            Expr::Call { pos, .. } => self.err(*pos, "cannot assign to function call"),
            other => self.err(other.pos(), "cannot assign to this expression"),
        }
    }

    /// Writes must land on a binding the current scope can store to.
    fn resolve_ident_write(&mut self, name: &str, pos: Position) {
        match self.lookup(name) {
            Ok(b) => match b.scope {
                Scope::Local | Scope::Cell | Scope::Global => {}
                Scope::Free => {
                    self.err(
                        pos,
                        format!("cannot assign to {}, a variable of an enclosing function", name),
                    );
                }
                Scope::Predeclared | Scope::Universal => {
                    self.err(pos, format!("cannot assign to predeclared name {}", name));
                }
            },
            Err(msg) => self.err(pos, msg),
        }
    }

    fn resolve_funcdef(&mut self, def: &FuncDef) {
        if def.is_lambda && !self.options.allow_lambda {
            self.err(
                def.pos,
                "lambda expressions require the allow_lambda dialect option",
            );
        }

        // Defaults evaluate in the enclosing scope.
        let mut params: Vec<ParamInfo> = Vec::new();
        let mut num_kwonly = 0usize;
        let mut has_varargs = false;
        let mut has_kwargs = false;
        let mut seen_star = false;
        let mut seen_default = false;
        let mut seen_names: FxHashSet<&str> = FxHashSet::default();
        for p in &def.params {
            match p {
                Param::Normal { ident, default } => {
                    if has_kwargs {
                        self.err(ident.pos, "parameter may not follow **kwargs");
                    }
                    if !seen_names.insert(ident.name.as_str()) {
                        self.err(ident.pos, format!("duplicate parameter: {}", ident.name));
                    }
                    if let Some(d) = default {
                        seen_default = true;
                        self.resolve_expr(d);
                    } else if seen_default && !seen_star {
                        self.err(
                            ident.pos,
                            "required parameter may not follow optional",
                        );
                    }
                    params.push(ParamInfo {
                        name: Arc::<str>::from(ident.name.as_str()),
                        pos: ident.pos,
                        kind: if seen_star {
                            num_kwonly += 1;
                            ParamKind::KwOnly
                        } else {
                            ParamKind::Normal
                        },
                        has_default: default.is_some(),
                    });
                }
                Param::Star { pos, ident } => {
                    if seen_star {
                        self.err(*pos, "multiple * parameters not allowed");
                    }
                    seen_star = true;
                    if let Some(id) = ident {
                        if !seen_names.insert(id.name.as_str()) {
                            self.err(id.pos, format!("duplicate parameter: {}", id.name));
                        }
                        has_varargs = true;
                    }
                }
                Param::StarStar { pos, ident } => {
                    if has_kwargs {
                        self.err(*pos, "multiple ** parameters not allowed");
                    }
                    if !seen_names.insert(ident.name.as_str()) {
                        self.err(ident.pos, format!("duplicate parameter: {}", ident.name));
                    }
                    has_kwargs = true;
                }
            }
        }
        // The sinks are named parameters too; they come last.
        for p in &def.params {
            if let Param::Star {
                ident: Some(id), ..
            } = p
            {
                params.push(ParamInfo {
                    name: Arc::<str>::from(id.name.as_str()),
                    pos: id.pos,
                    kind: ParamKind::VarArgs,
                    has_default: false,
                });
            }
        }
        for p in &def.params {
            if let Param::StarStar { ident, .. } = p {
                params.push(ParamInfo {
                    name: Arc::<str>::from(ident.name.as_str()),
                    pos: ident.pos,
                    kind: ParamKind::KwArgs,
                    has_default: false,
                });
            }
        }

        // New function scope: parameters bind the first local slots.
        let mut scope = FuncScope::function();
        for pi in &params {
            scope.define_local(&pi.name, pi.pos);
        }
        self.push_scope(scope);
        for stmt in &def.body {
            self.collect_stmt(stmt, false);
        }
        // Cells: locals captured by any nested function.
        let mut captured: FxHashSet<String> = FxHashSet::default();
        for stmt in &def.body {
            free_names_stmt(stmt, &mut captured);
        }
        {
            let top = self.top();
            for name in &captured {
                if top.locals.contains_key(name) {
                    top.cell_names.insert(name.clone());
                }
            }
        }
        for stmt in &def.body {
            self.resolve_stmt(stmt, false);
        }
        for p in &def.params {
            if let Param::Normal { ident, .. } = p {
                ident.binding.set(self.lookup(&ident.name).ok());
            }
        }
        let scope = self.pop_scope();
        let info = Arc::new(scope.into_funcinfo(
            def.name.clone(),
            def.pos,
            params,
            num_kwonly,
            has_varargs,
            has_kwargs,
        ));
        let _ = def.info.set(info);
    }

    fn resolve_expr(&mut self, e: &Expr) {
        match e {
            Expr::NoneLit(_) | Expr::TrueLit(_) | Expr::FalseLit(_) => {}
            Expr::IntLit { .. } | Expr::StrLit { .. } | Expr::BytesLit { .. } => {}
            Expr::FloatLit { pos, .. } => {
                if !self.options.allow_float {
                    self.err(
                        *pos,
                        "floating-point literals require the allow_float dialect option",
                    );
                }
            }
            Expr::Ident(id) => {
                match self.lookup(&id.name) {
                    Ok(b) => {
                        id.binding.set(Some(b));
                        if b.scope == Scope::Universal {
                            self.check_gated_universal(&id.name, id.pos);
                        }
                    }
                    Err(msg) => self.err(id.pos, msg),
                }
            }
            Expr::Unary { x, .. } => self.resolve_expr(x),
            Expr::Binary { pos, op, x, y } => {
                if *op == BinOp::Div && !self.options.allow_float {
                    self.err(*pos, "the / operator requires the allow_float dialect option");
                }
                self.resolve_expr(x);
                self.resolve_expr(y);
            }
            Expr::Cond {
                cond, then, els, ..
            } => {
                self.resolve_expr(cond);
                self.resolve_expr(then);
                self.resolve_expr(els);
            }
            Expr::TupleExpr { items, .. } | Expr::ListExpr { items, .. } => {
                for item in items {
                    self.resolve_expr(item);
                }
            }
            Expr::SetExpr { pos, items } => {
                if !self.options.allow_set {
                    self.err(*pos, "set literals require the allow_set dialect option");
                }
                for item in items {
                    self.resolve_expr(item);
                }
            }
            Expr::DictExpr { items, .. } => {
                for (k, v) in items {
                    self.resolve_expr(k);
                    self.resolve_expr(v);
                }
            }
            Expr::Index { x, index, .. } => {
                self.resolve_expr(x);
                self.resolve_expr(index);
            }
            Expr::SliceExpr {
                x, lo, hi, step, ..
            } => {
                self.resolve_expr(x);
                for part in [lo, hi, step].into_iter().flatten() {
                    self.resolve_expr(part);
                }
            }
            Expr::Attr { x, .. } => self.resolve_expr(x),
            Expr::Call { f, args, .. } => {
                self.resolve_expr(f);
                let mut seen_kw: FxHashSet<&str> = FxHashSet::default();
                for arg in args {
                    match arg {
                        Arg::Pos(v) | Arg::Star { value: v, .. } | Arg::StarStar { value: v, .. } => {
                            self.resolve_expr(v)
                        }
                        Arg::Named { name, pos, value } => {
                            if !seen_kw.insert(name.as_str()) {
                                self.err(*pos, format!("duplicate keyword argument: {}", name));
                            }
                            self.resolve_expr(value);
                        }
                    }
                }
            }
            Expr::Lambda(def) => self.resolve_funcdef(def),
            Expr::Comp(comp) => {
                for clause in &comp.clauses {
                    match clause {
                        CompClause::For { target, iter, .. } => {
                            self.resolve_expr(iter);
                            self.resolve_target(target);
                        }
                        CompClause::If { cond, .. } => self.resolve_expr(cond),
                    }
                }
                match &comp.body {
                    CompBody::Value(v) => self.resolve_expr(v),
                    CompBody::KeyValue(k, v) => {
                        self.resolve_expr(k);
                        self.resolve_expr(v);
                    }
                }
            }
        }
    }

    fn check_gated_universal(&mut self, name: &str, pos: Position) {
        // Gated universals resolve but their gate must be on.
        match name {
            "set" if !self.options.allow_set => {
                self.err(pos, "the set type requires the allow_set dialect option");
            }
            "float" if !self.options.allow_float => {
                self.err(pos, "the float type requires the allow_float dialect option");
            }
            _ => {}
        }
    }

    /// Classify a name, creating freevar chain entries as needed.
    fn lookup(&mut self, name: &str) -> Result<Binding, String> {
        let depth = self.stack.len() - 1;

        // Current function's locals.
        if let Some(&i) = self.stack[depth].locals.get(name) {
            return Ok(self.stack[depth].local_binding(i, name));
        }

        // Enclosing functions, innermost out; module scope is not a
        // function and cannot supply cells.
        let mut found: Option<usize> = None;
        for d in (0..depth).rev() {
            if self.stack[d].is_module {
                break;
            }
            if self.stack[d].locals.contains_key(name) {
                found = Some(d);
                break;
            }
        }
        if let Some(src) = found {
            // The source local must already be a cell; the pre-pass marked
            // every captured name.
            debug_assert!(self.stack[src].cell_names.contains(name));
            let mut parent = {
                let i = self.stack[src].locals[name];
                Binding {
                    scope: Scope::Cell,
                    index: i,
                }
            };
            for d in src + 1..=depth {
                let scope = &mut self.stack[d];
                let idx = match scope.freevar_map.get(name) {
                    Some(&i) => i,
                    None => {
                        let i = scope.freevars.len() as u32;
                        scope.freevars.push(FreeVar {
                            name: Arc::<str>::from(name),
                            parent,
                        });
                        scope.freevar_map.insert(name.to_string(), i);
                        i
                    }
                };
                parent = Binding {
                    scope: Scope::Free,
                    index: idx,
                };
            }
            return Ok(parent);
        }

        // Module globals.
        let module = &self.stack[0];
        if module.is_module {
            if let Some(&i) = module.globals.get(name) {
                return Ok(Binding {
                    scope: Scope::Global,
                    index: i,
                });
            }
            // File-local bindings of the toplevel (loads, comprehensions).
            if self.stack.len() > 1 {
                if let Some(&i) = module.locals.get(name) {
                    // Reached from inside a function: the toplevel local
                    // must be a cell.
                    if module.cell_names.contains(name) {
                        let mut parent = Binding {
                            scope: Scope::Cell,
                            index: i,
                        };
                        for d in 1..self.stack.len() {
                            let scope = &mut self.stack[d];
                            let idx = match scope.freevar_map.get(name) {
                                Some(&i) => i,
                                None => {
                                    let i = scope.freevars.len() as u32;
                                    scope.freevars.push(FreeVar {
                                        name: Arc::<str>::from(name),
                                        parent,
                                    });
                                    scope.freevar_map.insert(name.to_string(), i);
                                    i
                                }
                            };
                            parent = Binding {
                                scope: Scope::Free,
                                index: idx,
                            };
                        }
                        return Ok(parent);
                    }
                }
            }
        }

        if (self.is_predeclared)(name) {
            return Ok(Binding {
                scope: Scope::Predeclared,
                index: 0,
            });
        }
        if crate::builtins::is_universal(name) {
            return Ok(Binding {
                scope: Scope::Universal,
                index: 0,
            });
        }
        Err(format!("undefined: {}", name))
    }
}

// ---- free-name pre-analysis ----
//
// Computes, for each nested function, the names it (or its own nested
// functions) need from enclosing scopes. Pure name sets; no annotations.

fn free_names_stmt(stmt: &Stmt, out: &mut FxHashSet<String>) {
    match stmt {
        Stmt::Def(def) => {
            out.extend(func_free_names(def));
        }
        Stmt::Assign { lhs, rhs, .. } => {
            free_names_expr(lhs, out);
            free_names_expr(rhs, out);
        }
        Stmt::Expr(e) | Stmt::Return { value: Some(e), .. } => free_names_expr(e, out),
        Stmt::Return { value: None, .. } => {}
        Stmt::If {
            cond,
            then_body,
            else_body,
            ..
        } => {
            free_names_expr(cond, out);
            for s in then_body.iter().chain(else_body) {
                free_names_stmt(s, out);
            }
        }
        Stmt::For {
            target, iter, body, ..
        } => {
            free_names_expr(target, out);
            free_names_expr(iter, out);
            for s in body {
                free_names_stmt(s, out);
            }
        }
        Stmt::While { cond, body, .. } => {
            free_names_expr(cond, out);
            for s in body {
                free_names_stmt(s, out);
            }
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Pass(_) | Stmt::Load(_) => {}
    }
}

/// Only nested function subtrees contribute free names here; plain
/// identifier uses of the current body resolve against its own scope.
fn free_names_expr(e: &Expr, out: &mut FxHashSet<String>) {
    match e {
        Expr::Lambda(def) => {
            out.extend(func_free_names(def));
        }
        Expr::Unary { x, .. } | Expr::Attr { x, .. } => free_names_expr(x, out),
        Expr::Binary { x, y, .. } => {
            free_names_expr(x, out);
            free_names_expr(y, out);
        }
        Expr::Cond {
            cond, then, els, ..
        } => {
            free_names_expr(cond, out);
            free_names_expr(then, out);
            free_names_expr(els, out);
        }
        Expr::TupleExpr { items, .. }
        | Expr::ListExpr { items, .. }
        | Expr::SetExpr { items, .. } => {
            for item in items {
                free_names_expr(item, out);
            }
        }
        Expr::DictExpr { items, .. } => {
            for (k, v) in items {
                free_names_expr(k, out);
                free_names_expr(v, out);
            }
        }
        Expr::Index { x, index, .. } => {
            free_names_expr(x, out);
            free_names_expr(index, out);
        }
        Expr::SliceExpr {
            x, lo, hi, step, ..
        } => {
            free_names_expr(x, out);
            for part in [lo, hi, step].into_iter().flatten() {
                free_names_expr(part, out);
            }
        }
        Expr::Call { f, args, .. } => {
            free_names_expr(f, out);
            for arg in args {
                match arg {
                    Arg::Pos(v)
                    | Arg::Named { value: v, .. }
                    | Arg::Star { value: v, .. }
                    | Arg::StarStar { value: v, .. } => free_names_expr(v, out),
                }
            }
        }
        Expr::Comp(comp) => {
            for clause in &comp.clauses {
                match clause {
                    CompClause::For { target, iter, .. } => {
                        free_names_expr(target, out);
                        free_names_expr(iter, out);
                    }
                    CompClause::If { cond, .. } => free_names_expr(cond, out),
                }
            }
            match &comp.body {
                CompBody::Value(v) => free_names_expr(v, out),
                CompBody::KeyValue(k, v) => {
                    free_names_expr(k, out);
                    free_names_expr(v, out);
                }
            }
        }
        _ => {}
    }
}

/// The names a function needs from enclosing function scopes.
fn func_free_names(def: &FuncDef) -> FxHashSet<String> {
    let mut assigned: FxHashSet<String> = FxHashSet::default();
    for p in &def.params {
        match p {
            Param::Normal { ident, .. } => {
                assigned.insert(ident.name.clone());
            }
            Param::Star {
                ident: Some(id), ..
            } => {
                assigned.insert(id.name.clone());
            }
            Param::StarStar { ident, .. } => {
                assigned.insert(ident.name.clone());
            }
            Param::Star { ident: None, .. } => {}
        }
    }
    let mut used: FxHashSet<String> = FxHashSet::default();
    for stmt in &def.body {
        assigned_names_stmt(stmt, &mut assigned);
        used_names_stmt(stmt, &mut used);
    }
    used.retain(|n| !assigned.contains(n));
    used
}

fn assigned_names_stmt(stmt: &Stmt, out: &mut FxHashSet<String>) {
    match stmt {
        Stmt::Assign { op: None, lhs, .. } => assigned_names_target(lhs, out),
        Stmt::Def(def) => {
            out.insert(def.name.clone());
        }
        Stmt::For {
            target, body, ..
        } => {
            assigned_names_target(target, out);
            for s in body {
                assigned_names_stmt(s, out);
            }
        }
        Stmt::If {
            then_body,
            else_body,
            ..
        } => {
            for s in then_body.iter().chain(else_body) {
                assigned_names_stmt(s, out);
            }
        }
        Stmt::While { body, .. } => {
            for s in body {
                assigned_names_stmt(s, out);
            }
        }
        Stmt::Expr(e) | Stmt::Return { value: Some(e), .. } => assigned_comp_targets(e, out),
        _ => {}
    }
    if let Stmt::Assign { rhs, .. } = stmt {
        assigned_comp_targets(rhs, out);
    }
}

fn assigned_names_target(target: &Expr, out: &mut FxHashSet<String>) {
    match target {
        Expr::Ident(id) => {
            out.insert(id.name.clone());
        }
        Expr::TupleExpr { items, .. } | Expr::ListExpr { items, .. } => {
            for item in items {
                assigned_names_target(item, out);
            }
        }
        _ => {}
    }
}

/// Comprehension targets are local bindings of the enclosing function.
fn assigned_comp_targets(e: &Expr, out: &mut FxHashSet<String>) {
    if let Expr::Comp(comp) = e {
        for clause in &comp.clauses {
            if let CompClause::For { target, .. } = clause {
                assigned_names_target(target, out);
            }
        }
    }
}

fn used_names_stmt(stmt: &Stmt, out: &mut FxHashSet<String>) {
    match stmt {
        Stmt::Assign { lhs, rhs, .. } => {
            used_names_expr(lhs, out);
            used_names_expr(rhs, out);
        }
        Stmt::Def(def) => {
            // Everything the nested function cannot satisfy itself.
            out.extend(func_free_names(def));
        }
        Stmt::Expr(e) | Stmt::Return { value: Some(e), .. } => used_names_expr(e, out),
        Stmt::Return { value: None, .. } => {}
        Stmt::If {
            cond,
            then_body,
            else_body,
            ..
        } => {
            used_names_expr(cond, out);
            for s in then_body.iter().chain(else_body) {
                used_names_stmt(s, out);
            }
        }
        Stmt::For {
            target, iter, body, ..
        } => {
            used_names_expr(target, out);
            used_names_expr(iter, out);
            for s in body {
                used_names_stmt(s, out);
            }
        }
        Stmt::While { cond, body, .. } => {
            used_names_expr(cond, out);
            for s in body {
                used_names_stmt(s, out);
            }
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Pass(_) | Stmt::Load(_) => {}
    }
}

fn used_names_expr(e: &Expr, out: &mut FxHashSet<String>) {
    match e {
        Expr::Ident(id) => {
            out.insert(id.name.clone());
        }
        Expr::Lambda(def) => {
            out.extend(func_free_names(def));
        }
        Expr::Unary { x, .. } | Expr::Attr { x, .. } => used_names_expr(x, out),
        Expr::Binary { x, y, .. } => {
            used_names_expr(x, out);
            used_names_expr(y, out);
        }
        Expr::Cond {
            cond, then, els, ..
        } => {
            used_names_expr(cond, out);
            used_names_expr(then, out);
            used_names_expr(els, out);
        }
        Expr::TupleExpr { items, .. }
        | Expr::ListExpr { items, .. }
        | Expr::SetExpr { items, .. } => {
            for item in items {
                used_names_expr(item, out);
            }
        }
        Expr::DictExpr { items, .. } => {
            for (k, v) in items {
                used_names_expr(k, out);
                used_names_expr(v, out);
            }
        }
        Expr::Index { x, index, .. } => {
            used_names_expr(x, out);
            used_names_expr(index, out);
        }
        Expr::SliceExpr {
            x, lo, hi, step, ..
        } => {
            used_names_expr(x, out);
            for part in [lo, hi, step].into_iter().flatten() {
                used_names_expr(part, out);
            }
        }
        Expr::Call { f, args, .. } => {
            used_names_expr(f, out);
            for arg in args {
                match arg {
                    Arg::Pos(v)
                    | Arg::Named { value: v, .. }
                    | Arg::Star { value: v, .. }
                    | Arg::StarStar { value: v, .. } => used_names_expr(v, out),
                }
            }
        }
        Expr::Comp(comp) => {
            for clause in &comp.clauses {
                match clause {
                    CompClause::For { target, iter, .. } => {
                        used_names_expr(target, out);
                        used_names_expr(iter, out);
                    }
                    CompClause::If { cond, .. } => used_names_expr(cond, out),
                }
            }
            match &comp.body {
                CompBody::Value(v) => used_names_expr(v, out),
                CompBody::KeyValue(k, v) => {
                    used_names_expr(k, out);
                    used_names_expr(v, out);
                }
            }
        }
        _ => {}
    }
}
