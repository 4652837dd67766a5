//! Recursive-descent parser. Reports the first error and does not recover.

use std::cell::{Cell, OnceCell};
use std::sync::Arc;

use crate::token::{tokenize, Position, SyntaxError, TokSpan, Token};

use super::{
    Arg, BinOp, CompBody, CompClause, Comprehension, Expr, ExprUnit, FileUnit, FuncDef, Ident,
    LoadPair, LoadStmt, Param, Stmt, UnaryOp,
};

/// Parse a whole source file into a `FileUnit`.
pub fn parse_file(filename: &str, src: &str) -> Result<FileUnit, SyntaxError> {
    let toks = tokenize(src)?;
    let mut p = Parser::new(&toks);
    let stmts = p.parse_program()?;
    Ok(FileUnit {
        filename: Arc::<str>::from(filename),
        stmts,
        resolved: Cell::new(false),
        module: OnceCell::new(),
    })
}

/// Parse a single expression chunk (a bare tuple is permitted) for `eval`.
pub fn parse_expr(filename: &str, src: &str) -> Result<ExprUnit, SyntaxError> {
    let toks = tokenize(src)?;
    let mut p = Parser::new(&toks);
    let expr = p.parse_exprlist()?;
    while p.at(&Token::Newline) || p.at(&Token::Semicolon) {
        p.next();
    }
    if !p.at(&Token::Eof) {
        return Err(p.unexpected("end of expression"));
    }
    Ok(ExprUnit {
        filename: Arc::<str>::from(filename),
        expr,
        resolved: Cell::new(false),
        toplevel: OnceCell::new(),
    })
}

struct Parser<'a> {
    toks: &'a [TokSpan],
    i: usize,
}

impl<'a> Parser<'a> {
    fn new(toks: &'a [TokSpan]) -> Self {
        Parser { toks, i: 0 }
    }

    fn tok(&self) -> &Token {
        &self.toks[self.i.min(self.toks.len() - 1)].tok
    }

    fn tok_at(&self, n: usize) -> &Token {
        &self.toks[(self.i + n).min(self.toks.len() - 1)].tok
    }

    fn pos(&self) -> Position {
        self.toks[self.i.min(self.toks.len() - 1)].pos
    }

    fn next(&mut self) -> TokSpan {
        let t = self.toks[self.i.min(self.toks.len() - 1)].clone();
        if self.i < self.toks.len() - 1 {
            self.i += 1;
        }
        t
    }

    fn at(&self, t: &Token) -> bool {
        self.tok() == t
    }

    fn eat(&mut self, t: &Token) -> bool {
        if self.at(t) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: &Token) -> Result<TokSpan, SyntaxError> {
        if self.at(t) {
            Ok(self.next())
        } else {
            Err(SyntaxError::new(
                self.pos(),
                format!("got {}, want {}", self.tok().describe(), t.describe()),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, SyntaxError> {
        match self.tok() {
            Token::Ident(_) => {
                let span = self.next();
                match span.tok {
                    Token::Ident(name) => Ok(Ident::new(name, span.pos)),
                    _ => unreachable!(),
                }
            }
            other => Err(SyntaxError::new(
                self.pos(),
                format!("got {}, want identifier", other.describe()),
            )),
        }
    }

    fn unexpected(&self, want: &str) -> SyntaxError {
        SyntaxError::new(
            self.pos(),
            format!("got {}, want {}", self.tok().describe(), want),
        )
    }

    // ---- statements ----

    fn parse_program(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        loop {
            match self.tok() {
                Token::Eof => break,
                Token::Newline | Token::Semicolon => {
                    self.next();
                }
                Token::Indent => {
                    return Err(SyntaxError::new(self.pos(), "unexpected indent"));
                }
                _ => self.parse_statement(&mut stmts)?,
            }
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), SyntaxError> {
        match self.tok() {
            Token::Def => {
                out.push(self.parse_def()?);
                Ok(())
            }
            Token::If => {
                let stmt = self.parse_if()?;
                out.push(stmt);
                Ok(())
            }
            Token::For => {
                let stmt = self.parse_for()?;
                out.push(stmt);
                Ok(())
            }
            Token::While => {
                let stmt = self.parse_while()?;
                out.push(stmt);
                Ok(())
            }
            _ => self.parse_simple_line(out),
        }
    }

    /// One or more small statements separated by `;`, ending at a newline.
    fn parse_simple_line(&mut self, out: &mut Vec<Stmt>) -> Result<(), SyntaxError> {
        loop {
            out.push(self.parse_small_stmt()?);
            if self.eat(&Token::Semicolon) {
                if self.at(&Token::Newline) || self.at(&Token::Eof) {
                    break;
                }
                continue;
            }
            break;
        }
        if !self.at(&Token::Eof) {
            self.expect(&Token::Newline)?;
        }
        Ok(())
    }

    fn parse_small_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        match self.tok() {
            Token::Return => {
                let pos = self.next().pos;
                let value = if self.at(&Token::Newline)
                    || self.at(&Token::Semicolon)
                    || self.at(&Token::Eof)
                {
                    None
                } else {
                    Some(self.parse_exprlist()?)
                };
                Ok(Stmt::Return { pos, value })
            }
            Token::Break => Ok(Stmt::Break(self.next().pos)),
            Token::Continue => Ok(Stmt::Continue(self.next().pos)),
            Token::Pass => Ok(Stmt::Pass(self.next().pos)),
            Token::Load => self.parse_load(),
            _ => self.parse_assign_or_expr(),
        }
    }

    fn parse_assign_or_expr(&mut self) -> Result<Stmt, SyntaxError> {
        let lhs = self.parse_exprlist()?;
        let aug = match self.tok() {
            Token::Assign => None,
            Token::PlusEq => Some(BinOp::Add),
            Token::MinusEq => Some(BinOp::Sub),
            Token::StarEq => Some(BinOp::Mul),
            Token::SlashEq => Some(BinOp::Div),
            Token::SlashSlashEq => Some(BinOp::FloorDiv),
            Token::PercentEq => Some(BinOp::Mod),
            Token::AmpEq => Some(BinOp::Amp),
            Token::PipeEq => Some(BinOp::Pipe),
            Token::CaretEq => Some(BinOp::Caret),
            Token::ShlEq => Some(BinOp::Shl),
            Token::ShrEq => Some(BinOp::Shr),
            _ => return Ok(Stmt::Expr(lhs)),
        };
        let pos = self.next().pos;
        if aug.is_none() && matches!(self.tok(), Token::Assign) {
            // `a = b = c` is not supported.
            return Err(SyntaxError::new(self.pos(), "multiple assignment is not supported"));
        }
        let rhs = self.parse_exprlist()?;
        Ok(Stmt::Assign {
            pos,
            op: aug,
            lhs,
            rhs,
        })
    }

    fn parse_load(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.next().pos; // `load`
        self.expect(&Token::LParen)?;
        let (module, module_pos) = match self.tok() {
            Token::Str(_) => {
                let span = self.next();
                let bytes = match span.tok {
                    Token::Str(b) => b,
                    _ => unreachable!(),
                };
                let s = String::from_utf8(bytes).map_err(|_| {
                    SyntaxError::new(span.pos, "load: module name must be valid UTF-8")
                })?;
                (s, span.pos)
            }
            _ => return Err(self.unexpected("module name string")),
        };
        let mut pairs = Vec::new();
        while self.eat(&Token::Comma) {
            if self.at(&Token::RParen) {
                break;
            }
            match self.tok() {
                Token::Str(_) => {
                    let span = self.next();
                    let bytes = match span.tok {
                        Token::Str(b) => b,
                        _ => unreachable!(),
                    };
                    let name = String::from_utf8(bytes).map_err(|_| {
                        SyntaxError::new(span.pos, "load: symbol name must be valid UTF-8")
                    })?;
                    pairs.push(LoadPair {
                        local: Ident::new(name.clone(), span.pos),
                        orig: name,
                        orig_pos: span.pos,
                    });
                }
                Token::Ident(_) => {
                    let local = self.expect_ident()?;
                    self.expect(&Token::Assign)?;
                    let span = match self.tok() {
                        Token::Str(_) => self.next(),
                        _ => return Err(self.unexpected("original name string")),
                    };
                    let bytes = match span.tok {
                        Token::Str(b) => b,
                        _ => unreachable!(),
                    };
                    let orig = String::from_utf8(bytes).map_err(|_| {
                        SyntaxError::new(span.pos, "load: symbol name must be valid UTF-8")
                    })?;
                    pairs.push(LoadPair {
                        local,
                        orig,
                        orig_pos: span.pos,
                    });
                }
                _ => return Err(self.unexpected("loaded symbol")),
            }
        }
        self.expect(&Token::RParen)?;
        if pairs.is_empty() {
            return Err(SyntaxError::new(pos, "load statement must import at least 1 symbol"));
        }
        Ok(Stmt::Load(LoadStmt {
            pos,
            module,
            module_pos,
            pairs,
        }))
    }

    fn parse_def(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.next().pos; // `def`
        let name = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let params = self.parse_params(&Token::RParen)?;
        self.expect(&Token::RParen)?;
        self.expect(&Token::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt::Def(Box::new(FuncDef {
            pos,
            name: name.name,
            name_pos: name.pos,
            params,
            body,
            is_lambda: false,
            info: OnceCell::new(),
            name_binding: Cell::new(None),
        })))
    }

    fn parse_params(&mut self, terminator: &Token) -> Result<Vec<Param>, SyntaxError> {
        let mut params = Vec::new();
        loop {
            if self.at(terminator) {
                break;
            }
            match self.tok() {
                Token::Star => {
                    let pos = self.next().pos;
                    let ident = if matches!(self.tok(), Token::Ident(_)) {
                        Some(self.expect_ident()?)
                    } else {
                        None
                    };
                    params.push(Param::Star { pos, ident });
                }
                Token::StarStar => {
                    let pos = self.next().pos;
                    let ident = self.expect_ident()?;
                    params.push(Param::StarStar { pos, ident });
                }
                Token::Ident(_) => {
                    let ident = self.expect_ident()?;
                    let default = if self.eat(&Token::Assign) {
                        Some(self.parse_test()?)
                    } else {
                        None
                    };
                    params.push(Param::Normal { ident, default });
                }
                _ => return Err(self.unexpected("parameter")),
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_suite(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        if self.eat(&Token::Newline) {
            self.expect(&Token::Indent)?;
            let mut stmts = Vec::new();
            loop {
                match self.tok() {
                    Token::Outdent => {
                        self.next();
                        break;
                    }
                    Token::Eof => break,
                    Token::Newline => {
                        self.next();
                    }
                    _ => self.parse_statement(&mut stmts)?,
                }
            }
            Ok(stmts)
        } else {
            let mut stmts = Vec::new();
            self.parse_simple_line(&mut stmts)?;
            Ok(stmts)
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.next().pos; // `if` / `elif`
        let cond = self.parse_test()?;
        self.expect(&Token::Colon)?;
        let then_body = self.parse_suite()?;
        let else_body = if self.at(&Token::Elif) {
            vec![self.parse_if()?]
        } else if self.eat(&Token::Else) {
            self.expect(&Token::Colon)?;
            self.parse_suite()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            pos,
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.next().pos; // `for`
        let target = self.parse_loop_vars()?;
        self.expect(&Token::In)?;
        let iter = self.parse_exprlist()?;
        self.expect(&Token::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt::For {
            pos,
            target,
            iter,
            body,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.next().pos; // `while`
        let cond = self.parse_test()?;
        self.expect(&Token::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt::While { pos, cond, body })
    }

    /// Loop variables: one or more primaries, comma-separated.
    fn parse_loop_vars(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        let first = self.parse_primary()?;
        if !self.at(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.at(&Token::In) {
                break;
            }
            items.push(self.parse_primary()?);
        }
        Ok(Expr::TupleExpr { pos, items })
    }

    // ---- expressions ----

    /// An expression, possibly a bare comma-separated tuple.
    fn parse_exprlist(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        let first = self.parse_test()?;
        if !self.at(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if !self.starts_expr() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::TupleExpr { pos, items })
    }

    fn starts_expr(&self) -> bool {
        matches!(
            self.tok(),
            Token::Ident(_)
                | Token::Int(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::Bytes(_)
                | Token::NoneKw
                | Token::TrueKw
                | Token::FalseKw
                | Token::LParen
                | Token::LBracket
                | Token::LBrace
                | Token::Minus
                | Token::Plus
                | Token::Tilde
                | Token::Not
                | Token::Lambda
        )
    }

    fn parse_test(&mut self) -> Result<Expr, SyntaxError> {
        if self.at(&Token::Lambda) {
            return self.parse_lambda();
        }
        let x = self.parse_or()?;
        if self.at(&Token::If) {
            let pos = self.next().pos;
            let cond = self.parse_or()?;
            self.expect(&Token::Else)?;
            let els = self.parse_test()?;
            return Ok(Expr::Cond {
                pos,
                cond: Box::new(cond),
                then: Box::new(x),
                els: Box::new(els),
            });
        }
        Ok(x)
    }

    fn parse_lambda(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.next().pos; // `lambda`
        let params = self.parse_params(&Token::Colon)?;
        self.expect(&Token::Colon)?;
        let body_pos = self.pos();
        let body = self.parse_test()?;
        Ok(Expr::Lambda(Box::new(FuncDef {
            pos,
            name: "lambda".to_string(),
            name_pos: pos,
            params,
            body: vec![Stmt::Return {
                pos: body_pos,
                value: Some(body),
            }],
            is_lambda: true,
            info: OnceCell::new(),
            name_binding: Cell::new(None),
        })))
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut x = self.parse_and()?;
        while self.at(&Token::Or) {
            let pos = self.next().pos;
            let y = self.parse_and()?;
            x = Expr::Binary {
                pos,
                op: BinOp::Or,
                x: Box::new(x),
                y: Box::new(y),
            };
        }
        Ok(x)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut x = self.parse_not()?;
        while self.at(&Token::And) {
            let pos = self.next().pos;
            let y = self.parse_not()?;
            x = Expr::Binary {
                pos,
                op: BinOp::And,
                x: Box::new(x),
                y: Box::new(y),
            };
        }
        Ok(x)
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.at(&Token::Not) && !matches!(self.tok_at(1), Token::In) {
            let pos = self.next().pos;
            let x = self.parse_not()?;
            return Ok(Expr::Unary {
                pos,
                op: UnaryOp::Not,
                x: Box::new(x),
            });
        }
        self.parse_cmp()
    }

    fn cmp_op(&self) -> Option<BinOp> {
        match self.tok() {
            Token::EqEq => Some(BinOp::Eq),
            Token::Ne => Some(BinOp::Ne),
            Token::Lt => Some(BinOp::Lt),
            Token::Gt => Some(BinOp::Gt),
            Token::Le => Some(BinOp::Le),
            Token::Ge => Some(BinOp::Ge),
            Token::In => Some(BinOp::In),
            Token::Not if matches!(self.tok_at(1), Token::In) => Some(BinOp::NotIn),
            _ => None,
        }
    }

    fn parse_cmp(&mut self) -> Result<Expr, SyntaxError> {
        let x = self.parse_bitor()?;
        let Some(op) = self.cmp_op() else {
            return Ok(x);
        };
        let pos = self.next().pos;
        if op == BinOp::NotIn {
            self.next(); // the `in` of `not in`
        }
        let y = self.parse_bitor()?;
        if self.cmp_op().is_some() {
            return Err(SyntaxError::new(
                self.pos(),
                "comparison operators are not associative; use parentheses",
            ));
        }
        Ok(Expr::Binary {
            pos,
            op,
            x: Box::new(x),
            y: Box::new(y),
        })
    }

    fn parse_bitor(&mut self) -> Result<Expr, SyntaxError> {
        let mut x = self.parse_bitxor()?;
        while self.at(&Token::Pipe) {
            let pos = self.next().pos;
            let y = self.parse_bitxor()?;
            x = Expr::Binary {
                pos,
                op: BinOp::Pipe,
                x: Box::new(x),
                y: Box::new(y),
            };
        }
        Ok(x)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, SyntaxError> {
        let mut x = self.parse_bitand()?;
        while self.at(&Token::Caret) {
            let pos = self.next().pos;
            let y = self.parse_bitand()?;
            x = Expr::Binary {
                pos,
                op: BinOp::Caret,
                x: Box::new(x),
                y: Box::new(y),
            };
        }
        Ok(x)
    }

    fn parse_bitand(&mut self) -> Result<Expr, SyntaxError> {
        let mut x = self.parse_shift()?;
        while self.at(&Token::Amp) {
            let pos = self.next().pos;
            let y = self.parse_shift()?;
            x = Expr::Binary {
                pos,
                op: BinOp::Amp,
                x: Box::new(x),
                y: Box::new(y),
            };
        }
        Ok(x)
    }

    fn parse_shift(&mut self) -> Result<Expr, SyntaxError> {
        let mut x = self.parse_arith()?;
        loop {
            let op = match self.tok() {
                Token::Shl => BinOp::Shl,
                Token::Shr => BinOp::Shr,
                _ => break,
            };
            let pos = self.next().pos;
            let y = self.parse_arith()?;
            x = Expr::Binary {
                pos,
                op,
                x: Box::new(x),
                y: Box::new(y),
            };
        }
        Ok(x)
    }

    fn parse_arith(&mut self) -> Result<Expr, SyntaxError> {
        let mut x = self.parse_term()?;
        loop {
            let op = match self.tok() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.next().pos;
            let y = self.parse_term()?;
            x = Expr::Binary {
                pos,
                op,
                x: Box::new(x),
                y: Box::new(y),
            };
        }
        Ok(x)
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let mut x = self.parse_factor()?;
        loop {
            let op = match self.tok() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            let pos = self.next().pos;
            let y = self.parse_factor()?;
            x = Expr::Binary {
                pos,
                op,
                x: Box::new(x),
                y: Box::new(y),
            };
        }
        Ok(x)
    }

    fn parse_factor(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.tok() {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Minus,
            Token::Tilde => UnaryOp::Invert,
            _ => return self.parse_primary(),
        };
        let pos = self.next().pos;
        let x = self.parse_factor()?;
        Ok(Expr::Unary {
            pos,
            op,
            x: Box::new(x),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let mut x = self.parse_operand()?;
        loop {
            match self.tok() {
                Token::Dot => {
                    let pos = self.next().pos;
                    let name = self.expect_ident()?;
                    x = Expr::Attr {
                        pos,
                        x: Box::new(x),
                        name: name.name,
                    };
                }
                Token::LParen => {
                    let pos = self.next().pos;
                    let args = self.parse_args()?;
                    self.expect(&Token::RParen)?;
                    x = Expr::Call {
                        pos,
                        f: Box::new(x),
                        args,
                    };
                }
                Token::LBracket => {
                    let pos = self.next().pos;
                    x = self.parse_index_suffix(pos, x)?;
                }
                _ => break,
            }
        }
        Ok(x)
    }

    fn parse_index_suffix(&mut self, pos: Position, x: Expr) -> Result<Expr, SyntaxError> {
        let mut lo = None;
        if !self.at(&Token::Colon) {
            let e = self.parse_test()?;
            if self.eat(&Token::RBracket) {
                return Ok(Expr::Index {
                    pos,
                    x: Box::new(x),
                    index: Box::new(e),
                });
            }
            lo = Some(Box::new(e));
        }
        self.expect(&Token::Colon)?;
        let mut hi = None;
        if !self.at(&Token::Colon) && !self.at(&Token::RBracket) {
            hi = Some(Box::new(self.parse_test()?));
        }
        let mut step = None;
        if self.eat(&Token::Colon) {
            if !self.at(&Token::RBracket) {
                step = Some(Box::new(self.parse_test()?));
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(Expr::SliceExpr {
            pos,
            x: Box::new(x),
            lo,
            hi,
            step,
        })
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, SyntaxError> {
        let mut args = Vec::new();
        loop {
            if self.at(&Token::RParen) {
                break;
            }
            match self.tok() {
                Token::Star => {
                    let pos = self.next().pos;
                    let value = self.parse_test()?;
                    args.push(Arg::Star { pos, value });
                }
                Token::StarStar => {
                    let pos = self.next().pos;
                    let value = self.parse_test()?;
                    args.push(Arg::StarStar { pos, value });
                }
                Token::Ident(_) if matches!(self.tok_at(1), Token::Assign) => {
                    let ident = self.expect_ident()?;
                    self.next(); // `=`
                    let value = self.parse_test()?;
                    args.push(Arg::Named {
                        name: ident.name,
                        pos: ident.pos,
                        value,
                    });
                }
                _ => args.push(Arg::Pos(self.parse_test()?)),
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_operand(&mut self) -> Result<Expr, SyntaxError> {
        match self.tok().clone() {
            Token::Ident(_) => {
                let id = self.expect_ident()?;
                Ok(Expr::Ident(id))
            }
            Token::Int(v) => {
                let pos = self.next().pos;
                Ok(Expr::IntLit { pos, value: v })
            }
            Token::Float(v) => {
                let pos = self.next().pos;
                Ok(Expr::FloatLit { pos, value: v })
            }
            Token::Str(v) => {
                let pos = self.next().pos;
                Ok(Expr::StrLit { pos, value: v })
            }
            Token::Bytes(v) => {
                let pos = self.next().pos;
                Ok(Expr::BytesLit { pos, value: v })
            }
            Token::NoneKw => Ok(Expr::NoneLit(self.next().pos)),
            Token::TrueKw => Ok(Expr::TrueLit(self.next().pos)),
            Token::FalseKw => Ok(Expr::FalseLit(self.next().pos)),
            Token::LParen => self.parse_paren(),
            Token::LBracket => self.parse_list(),
            Token::LBrace => self.parse_dict_or_set(),
            other => Err(SyntaxError::new(
                self.pos(),
                format!("got {}, want expression", other.describe()),
            )),
        }
    }

    fn parse_paren(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.next().pos; // `(`
        if self.eat(&Token::RParen) {
            return Ok(Expr::TupleExpr {
                pos,
                items: Vec::new(),
            });
        }
        let first = self.parse_test()?;
        if self.at(&Token::Comma) {
            let mut items = vec![first];
            while self.eat(&Token::Comma) {
                if self.at(&Token::RParen) {
                    break;
                }
                items.push(self.parse_test()?);
            }
            self.expect(&Token::RParen)?;
            return Ok(Expr::TupleExpr { pos, items });
        }
        self.expect(&Token::RParen)?;
        Ok(first)
    }

    fn parse_list(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.next().pos; // `[`
        if self.eat(&Token::RBracket) {
            return Ok(Expr::ListExpr {
                pos,
                items: Vec::new(),
            });
        }
        let first = self.parse_test()?;
        if self.at(&Token::For) {
            let clauses = self.parse_comp_clauses()?;
            self.expect(&Token::RBracket)?;
            return Ok(Expr::Comp(Box::new(Comprehension {
                pos,
                body: CompBody::Value(first),
                clauses,
            })));
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.at(&Token::RBracket) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(&Token::RBracket)?;
        Ok(Expr::ListExpr { pos, items })
    }

    fn parse_dict_or_set(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.next().pos; // `{`
        if self.eat(&Token::RBrace) {
            return Ok(Expr::DictExpr {
                pos,
                items: Vec::new(),
            });
        }
        let first = self.parse_test()?;
        if self.eat(&Token::Colon) {
            let value = self.parse_test()?;
            if self.at(&Token::For) {
                let clauses = self.parse_comp_clauses()?;
                self.expect(&Token::RBrace)?;
                return Ok(Expr::Comp(Box::new(Comprehension {
                    pos,
                    body: CompBody::KeyValue(first, value),
                    clauses,
                })));
            }
            let mut items = vec![(first, value)];
            while self.eat(&Token::Comma) {
                if self.at(&Token::RBrace) {
                    break;
                }
                let k = self.parse_test()?;
                self.expect(&Token::Colon)?;
                let v = self.parse_test()?;
                items.push((k, v));
            }
            self.expect(&Token::RBrace)?;
            return Ok(Expr::DictExpr { pos, items });
        }
        if self.at(&Token::For) {
            return Err(SyntaxError::new(self.pos(), "set comprehensions are not supported"));
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.at(&Token::RBrace) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::SetExpr { pos, items })
    }

    fn parse_comp_clauses(&mut self) -> Result<Vec<CompClause>, SyntaxError> {
        let mut clauses = Vec::new();
        loop {
            match self.tok() {
                Token::For => {
                    let pos = self.next().pos;
                    let target = self.parse_loop_vars()?;
                    self.expect(&Token::In)?;
                    // The iterable is an or-test: a conditional here would
                    // swallow the `if` of a following clause.
                    let iter = self.parse_or()?;
                    clauses.push(CompClause::For { pos, target, iter });
                }
                Token::If => {
                    let pos = self.next().pos;
                    let cond = self.parse_or()?;
                    clauses.push(CompClause::If { pos, cond });
                }
                _ => break,
            }
        }
        Ok(clauses)
    }
}
