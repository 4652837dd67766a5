//! Syntax tree for the surface grammar.
//!
//! Nodes carry byte-accurate positions and a single resolver annotation slot:
//! identifier use-sites get a `Binding` (scope + slot index), function nodes
//! get their resolved `FuncInfo`. Both are set exactly once, which is what
//! makes re-resolving a tree a no-op.

use std::cell::{Cell, OnceCell};
use std::fmt;
use std::sync::Arc;

use crate::resolve::{Binding, FuncInfo, ModuleInfo};
use crate::token::Position;
use crate::val::int::Int;

mod parse;
#[cfg(test)]
mod parse_test;

pub use parse::{parse_expr, parse_file};

/// An identifier occurrence, annotated by the resolver.
#[derive(Debug, Clone)]
pub struct Ident {
    pub name: String,
    pub pos: Position,
    pub binding: Cell<Option<Binding>>,
}

impl Ident {
    pub fn new(name: String, pos: Position) -> Self {
        Ident {
            name,
            pos,
            binding: Cell::new(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,   // +x
    Minus,  // -x
    Invert, // ~x
    Not,    // not x
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Plus => write!(f, "+"),
            UnaryOp::Minus => write!(f, "-"),
            UnaryOp::Invert => write!(f, "~"),
            UnaryOp::Not => write!(f, "not"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Pipe,
    Caret,
    Amp,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
            BinOp::Pipe => "|",
            BinOp::Caret => "^",
            BinOp::Amp => "&",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum Expr {
    NoneLit(Position),
    TrueLit(Position),
    FalseLit(Position),
    IntLit {
        pos: Position,
        value: Int,
    },
    FloatLit {
        pos: Position,
        value: f64,
    },
    StrLit {
        pos: Position,
        value: Vec<u8>,
    },
    BytesLit {
        pos: Position,
        value: Vec<u8>,
    },
    Ident(Ident),
    Unary {
        pos: Position,
        op: UnaryOp,
        x: Box<Expr>,
    },
    Binary {
        pos: Position, // operator position
        op: BinOp,
        x: Box<Expr>,
        y: Box<Expr>,
    },
    Cond {
        pos: Position, // position of `if`
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    TupleExpr {
        pos: Position,
        items: Vec<Expr>,
    },
    ListExpr {
        pos: Position,
        items: Vec<Expr>,
    },
    DictExpr {
        pos: Position,
        items: Vec<(Expr, Expr)>,
    },
    SetExpr {
        pos: Position,
        items: Vec<Expr>,
    },
    Index {
        pos: Position, // position of `[`
        x: Box<Expr>,
        index: Box<Expr>,
    },
    SliceExpr {
        pos: Position, // position of `[`
        x: Box<Expr>,
        lo: Option<Box<Expr>>,
        hi: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Attr {
        pos: Position, // position of `.`
        x: Box<Expr>,
        name: String,
    },
    Call {
        pos: Position, // position of `(`
        f: Box<Expr>,
        args: Vec<Arg>,
    },
    Lambda(Box<FuncDef>),
    Comp(Box<Comprehension>),
}

impl Expr {
    /// The anchoring position of this expression, used in diagnostics.
    pub fn pos(&self) -> Position {
        match self {
            Expr::NoneLit(p) | Expr::TrueLit(p) | Expr::FalseLit(p) => *p,
            Expr::IntLit { pos, .. }
            | Expr::FloatLit { pos, .. }
            | Expr::StrLit { pos, .. }
            | Expr::BytesLit { pos, .. } => *pos,
            Expr::Ident(id) => id.pos,
            Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Cond { pos, .. }
            | Expr::TupleExpr { pos, .. }
            | Expr::ListExpr { pos, .. }
            | Expr::DictExpr { pos, .. }
            | Expr::SetExpr { pos, .. }
            | Expr::Index { pos, .. }
            | Expr::SliceExpr { pos, .. }
            | Expr::Attr { pos, .. }
            | Expr::Call { pos, .. } => *pos,
            Expr::Lambda(def) => def.pos,
            Expr::Comp(comp) => comp.pos,
        }
    }
}

#[derive(Debug)]
pub enum Arg {
    Pos(Expr),
    Named {
        name: String,
        pos: Position,
        value: Expr,
    },
    Star {
        pos: Position,
        value: Expr,
    },
    StarStar {
        pos: Position,
        value: Expr,
    },
}

#[derive(Debug)]
pub struct Comprehension {
    pub pos: Position,
    pub body: CompBody,
    pub clauses: Vec<CompClause>,
}

#[derive(Debug)]
pub enum CompBody {
    Value(Expr),            // [x for ...]
    KeyValue(Expr, Expr),   // {k: v for ...}
}

#[derive(Debug)]
pub enum CompClause {
    For {
        pos: Position,
        target: Expr,
        iter: Expr,
    },
    If {
        pos: Position,
        cond: Expr,
    },
}

#[derive(Debug)]
pub enum Param {
    Normal {
        ident: Ident,
        default: Option<Expr>,
    },
    /// `*args`, or a bare `*` separating keyword-only parameters.
    Star {
        pos: Position,
        ident: Option<Ident>,
    },
    StarStar {
        pos: Position,
        ident: Ident,
    },
}

/// A function literal: `def` statement or `lambda` expression.
#[derive(Debug)]
pub struct FuncDef {
    pub pos: Position, // position of `def` / `lambda`
    pub name: String,  // "lambda" for lambdas
    pub name_pos: Position,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub is_lambda: bool,
    pub info: OnceCell<Arc<FuncInfo>>,
    /// Binding of the `def` name in the enclosing scope.
    pub name_binding: Cell<Option<Binding>>,
}

#[derive(Debug)]
pub enum Stmt {
    Assign {
        pos: Position, // position of the assignment operator
        op: Option<BinOp>,
        lhs: Expr,
        rhs: Expr,
    },
    Def(Box<FuncDef>),
    Expr(Expr),
    If {
        pos: Position,
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    For {
        pos: Position,
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        pos: Position,
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return {
        pos: Position,
        value: Option<Expr>,
    },
    Break(Position),
    Continue(Position),
    Pass(Position),
    Load(LoadStmt),
}

#[derive(Debug)]
pub struct LoadStmt {
    pub pos: Position,
    pub module: String,
    pub module_pos: Position,
    pub pairs: Vec<LoadPair>,
}

#[derive(Debug)]
pub struct LoadPair {
    pub local: Ident,
    pub orig: String,
    pub orig_pos: Position,
}

/// A parsed source file, plus its resolver annotations once resolved.
#[derive(Debug)]
pub struct FileUnit {
    pub filename: Arc<str>,
    pub stmts: Vec<Stmt>,
    pub resolved: Cell<bool>,
    pub module: OnceCell<Arc<ModuleInfo>>,
}

/// A parsed expression chunk used by `eval`.
#[derive(Debug)]
pub struct ExprUnit {
    pub filename: Arc<str>,
    pub expr: Expr,
    pub resolved: Cell<bool>,
    pub toplevel: OnceCell<Arc<FuncInfo>>,
}
